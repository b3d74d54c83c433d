//! Cryptographic collaborator ports

use async_trait::async_trait;

use crate::domain::result::Result;

/// Passphrase-keyed symmetric encryption
///
/// The ciphertext format is owned by the implementation and opaque to
/// callers. A wrong passphrase and a corrupted ciphertext both fail with
/// `Error::Decryption` and the same message shape.
#[async_trait]
pub trait Cipher: Send + Sync {
    async fn encrypt(&self, plaintext: &str, passphrase: &str) -> Result<Vec<u8>>;

    async fn decrypt(&self, ciphertext: &[u8], passphrase: &str) -> Result<String>;
}

/// One-way salted slow hashing for short secrets (CVVs)
#[async_trait]
pub trait SecretHasher: Send + Sync {
    async fn hash(&self, secret: &str) -> Result<String>;

    /// `Ok(false)` on mismatch; `Err` only when the digest is unusable
    async fn verify(&self, secret: &str, digest: &str) -> Result<bool>;
}
