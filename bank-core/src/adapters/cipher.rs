//! AES-256-GCM cipher keyed by an Argon2id-derived passphrase key
//!
//! Output layout: `salt (16) || nonce (12) || ciphertext+tag`. A fresh salt
//! and nonce are drawn for every call, so encrypting the same value twice
//! never yields the same bytes.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::domain::result::{Error, Result};
use crate::domain::Argon2Params;
use crate::ports::Cipher;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Uniform failure text for every decryption problem; tells a wrong
/// passphrase and a damaged ciphertext apart for nobody
const DECRYPT_FAILED: &str = "ciphertext could not be authenticated";

pub struct AesGcmCipher {
    kdf: Argon2Params,
}

impl AesGcmCipher {
    pub fn new(kdf: Argon2Params) -> Self {
        Self { kdf }
    }

    /// Derive the 256-bit AES key from a passphrase with Argon2id
    fn derive_key(kdf: &Argon2Params, passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_LEN]> {
        let params = argon2::Params::new(
            kdf.memory_cost,
            kdf.time_cost,
            kdf.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| Error::Config(format!("invalid argon2 parameters: {}", e)))?;

        let argon2 =
            argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

        let mut key = [0u8; KEY_LEN];
        argon2
            .hash_password_into(passphrase.as_bytes(), salt, &mut key)
            .map_err(|e| Error::encryption(format!("key derivation failed: {}", e)))?;
        Ok(key)
    }

    fn seal(kdf: &Argon2Params, plaintext: &str, passphrase: &str) -> Result<Vec<u8>> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut salt)
            .and_then(|_| OsRng.try_fill_bytes(&mut nonce_bytes))
            .map_err(|e| Error::RandomSource(e.to_string()))?;

        let key = Self::derive_key(kdf, passphrase, &salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| Error::encryption(e.to_string()))?;
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| Error::encryption("AES-GCM seal failed"))?;

        let mut out = Vec::with_capacity(SALT_LEN + NONCE_LEN + sealed.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn open(kdf: &Argon2Params, data: &[u8], passphrase: &str) -> Result<String> {
        if data.len() < SALT_LEN + NONCE_LEN {
            return Err(Error::decryption(DECRYPT_FAILED));
        }
        let (salt, rest) = data.split_at(SALT_LEN);
        let (nonce_bytes, sealed) = rest.split_at(NONCE_LEN);

        let key = Self::derive_key(kdf, passphrase, salt)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| Error::decryption(DECRYPT_FAILED))?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), sealed)
            .map_err(|_| Error::decryption(DECRYPT_FAILED))?;

        String::from_utf8(plaintext).map_err(|_| Error::decryption(DECRYPT_FAILED))
    }
}

#[async_trait]
impl Cipher for AesGcmCipher {
    async fn encrypt(&self, plaintext: &str, passphrase: &str) -> Result<Vec<u8>> {
        let kdf = self.kdf.clone();
        let plaintext = plaintext.to_owned();
        let passphrase = passphrase.to_owned();
        // Argon2 is deliberately slow; keep it off the async workers
        tokio::task::spawn_blocking(move || Self::seal(&kdf, &plaintext, &passphrase))
            .await
            .map_err(|e| Error::encryption(e.to_string()))?
    }

    async fn decrypt(&self, ciphertext: &[u8], passphrase: &str) -> Result<String> {
        let kdf = self.kdf.clone();
        let data = ciphertext.to_vec();
        let passphrase = passphrase.to_owned();
        tokio::task::spawn_blocking(move || Self::open(&kdf, &data, &passphrase))
            .await
            .map_err(|_| Error::decryption(DECRYPT_FAILED))?
    }
}
