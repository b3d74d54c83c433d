//! Card vault - encryption, CVV hashing and payment-message signing
//!
//! Wraps the cipher and hasher collaborators and owns the integrity key.
//! Nothing passing through here is logged.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::domain::result::{Error, Result};
use crate::domain::{CardId, IntegrityKey};
use crate::ports::{Cipher, SecretHasher};

type HmacSha256 = Hmac<Sha256>;

/// Message signed at issuance and re-derived at payment verification
pub fn payment_message(card_id: CardId, pan: &str, expiry: &str, cvv: &str) -> String {
    format!("{}:{}:{}:{}", card_id, pan, expiry, cvv)
}

#[derive(Clone)]
pub struct CardVault {
    cipher: Arc<dyn Cipher>,
    hasher: Arc<dyn SecretHasher>,
    integrity_key: IntegrityKey,
}

impl CardVault {
    pub fn new(
        cipher: Arc<dyn Cipher>,
        hasher: Arc<dyn SecretHasher>,
        integrity_key: IntegrityKey,
    ) -> Self {
        Self {
            cipher,
            hasher,
            integrity_key,
        }
    }

    pub async fn encrypt(&self, plaintext: &str, passphrase: &str) -> Result<Vec<u8>> {
        self.cipher.encrypt(plaintext, passphrase).await
    }

    pub async fn decrypt(&self, ciphertext: &[u8], passphrase: &str) -> Result<String> {
        self.cipher.decrypt(ciphertext, passphrase).await
    }

    pub async fn hash_secret(&self, secret: &str) -> Result<String> {
        self.hasher.hash(secret).await
    }

    pub async fn verify_secret(&self, secret: &str, digest: &str) -> Result<bool> {
        self.hasher.verify(secret, digest).await
    }

    fn mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.integrity_key.as_bytes())
            .map_err(|_| Error::Config("integrity key rejected by HMAC".to_string()))
    }

    /// Hex-encoded HMAC-SHA256 of `message`
    pub fn sign(&self, message: &str) -> Result<String> {
        let mut mac = self.mac()?;
        mac.update(message.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time check of a hex signature; malformed hex is a mismatch
    pub fn verify_signature(&self, message: &str, signature: &str) -> Result<bool> {
        let Ok(expected) = hex::decode(signature.trim()) else {
            return Ok(false);
        };
        let mut mac = self.mac()?;
        mac.update(message.as_bytes());
        Ok(mac.verify_slice(&expected).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cipher::AesGcmCipher;
    use crate::adapters::hasher::Argon2SecretHasher;
    use crate::domain::Argon2Params;

    fn vault(key: &str) -> CardVault {
        CardVault::new(
            Arc::new(AesGcmCipher::new(Argon2Params::insecure_fast())),
            Arc::new(Argon2SecretHasher::new(Argon2Params::insecure_fast())),
            IntegrityKey::new(key).unwrap(),
        )
    }

    #[test]
    fn test_sign_known_vector() {
        // RFC 4231 test case 2
        let vault = vault("Jefe");
        let signature = vault.sign("what do ya want for nothing?").unwrap();
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_verify_signature() {
        let vault = vault("integrity");
        let message = payment_message(1, "4000001234567899", "10/29", "123");
        let signature = vault.sign(&message).unwrap();

        assert!(vault.verify_signature(&message, &signature).unwrap());
        assert!(!vault
            .verify_signature(&payment_message(1, "4000001234567899", "10/29", "124"), &signature)
            .unwrap());
        assert!(!vault.verify_signature(&message, "zz-not-hex").unwrap());
        assert!(!vault.verify_signature(&message, &signature[..10]).unwrap());
    }

    #[test]
    fn test_signature_depends_on_key() {
        let message = payment_message(9, "4000000000000002", "01/30", "555");
        let a = vault("key-a").sign(&message).unwrap();
        let b = vault("key-b").sign(&message).unwrap();
        assert_ne!(a, b);
        assert!(!vault("key-b").verify_signature(&message, &a).unwrap());
    }

    #[tokio::test]
    async fn test_encrypt_and_hash_round_trip() {
        let vault = vault("integrity");

        let sealed = vault.encrypt("10/29", "pass").await.unwrap();
        assert_eq!(vault.decrypt(&sealed, "pass").await.unwrap(), "10/29");

        let digest = vault.hash_secret("321").await.unwrap();
        assert!(vault.verify_secret("321", &digest).await.unwrap());
        assert!(!vault.verify_secret("322", &digest).await.unwrap());
    }
}
