//! Argon2id secret hasher producing PHC-format digests

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Version};
use async_trait::async_trait;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::domain::result::{Error, Result};
use crate::domain::Argon2Params;
use crate::ports::SecretHasher;

pub struct Argon2SecretHasher {
    params: Argon2Params,
}

impl Argon2SecretHasher {
    pub fn new(params: Argon2Params) -> Self {
        Self { params }
    }

    fn argon2(params: &Argon2Params) -> Result<Argon2<'static>> {
        let params = argon2::Params::new(
            params.memory_cost,
            params.time_cost,
            params.parallelism,
            Some(params.hash_len as usize),
        )
        .map_err(|e| Error::Config(format!("invalid argon2 parameters: {}", e)))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    fn hash_blocking(params: &Argon2Params, secret: &str) -> Result<String> {
        let mut salt_bytes = [0u8; 16];
        OsRng
            .try_fill_bytes(&mut salt_bytes)
            .map_err(|e| Error::RandomSource(e.to_string()))?;
        let salt = SaltString::encode_b64(&salt_bytes)
            .map_err(|e| Error::encryption(format!("salt encoding failed: {}", e)))?;
        let digest = Self::argon2(params)?
            .hash_password(secret.as_bytes(), &salt)
            .map_err(|e| Error::encryption(format!("secret hashing failed: {}", e)))?;
        Ok(digest.to_string())
    }

    /// Verification reads the cost parameters from the digest itself, so
    /// digests made under older settings keep verifying
    fn verify_blocking(secret: &str, digest: &str) -> Result<bool> {
        let parsed = PasswordHash::new(digest)
            .map_err(|e| Error::storage("verify secret", format!("malformed digest: {}", e)))?;
        match Argon2::default().verify_password(secret.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::storage("verify secret", e)),
        }
    }
}

#[async_trait]
impl SecretHasher for Argon2SecretHasher {
    async fn hash(&self, secret: &str) -> Result<String> {
        let params = self.params.clone();
        let secret = secret.to_owned();
        tokio::task::spawn_blocking(move || Self::hash_blocking(&params, &secret))
            .await
            .map_err(|e| Error::encryption(e.to_string()))?
    }

    async fn verify(&self, secret: &str, digest: &str) -> Result<bool> {
        let secret = secret.to_owned();
        let digest = digest.to_owned();
        tokio::task::spawn_blocking(move || Self::verify_blocking(&secret, &digest))
            .await
            .map_err(|e| Error::storage("verify secret", e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify() {
        let hasher = Argon2SecretHasher::new(Argon2Params::insecure_fast());
        let digest = hasher.hash("123").await.unwrap();

        assert!(digest.starts_with("$argon2id$"));
        assert!(!digest.contains("123$"));
        assert!(hasher.verify("123", &digest).await.unwrap());
        assert!(!hasher.verify("124", &digest).await.unwrap());
    }

    #[tokio::test]
    async fn test_same_secret_different_digests() {
        let hasher = Argon2SecretHasher::new(Argon2Params::insecure_fast());
        let a = hasher.hash("999").await.unwrap();
        let b = hasher.hash("999").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_malformed_digest_is_an_error() {
        let hasher = Argon2SecretHasher::new(Argon2Params::insecure_fast());
        assert!(hasher.verify("123", "not-a-digest").await.is_err());
    }
}
