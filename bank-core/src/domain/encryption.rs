//! Key material and key-derivation parameters

use std::fmt;

use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Default Argon2id parameters for passphrase key derivation
pub const DEFAULT_TIME_COST: u32 = 3;
pub const DEFAULT_MEMORY_COST: u32 = 65536; // 64 MiB
pub const DEFAULT_PARALLELISM: u32 = 4;
pub const DEFAULT_HASH_LEN: u32 = 32;

/// Argon2id parameters
///
/// Used twice: deriving the per-card AES key from the holder's passphrase,
/// and hashing CVVs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Argon2Params {
    pub time_cost: u32,
    /// Memory in KiB
    pub memory_cost: u32,
    pub parallelism: u32,
    pub hash_len: u32,
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self {
            time_cost: DEFAULT_TIME_COST,
            memory_cost: DEFAULT_MEMORY_COST,
            parallelism: DEFAULT_PARALLELISM,
            hash_len: DEFAULT_HASH_LEN,
        }
    }
}

impl Argon2Params {
    /// OWASP baseline for password-style hashing (19 MiB, t=2, p=1)
    pub fn secret_hash_default() -> Self {
        Self {
            time_cost: 2,
            memory_cost: 19456,
            parallelism: 1,
            hash_len: DEFAULT_HASH_LEN,
        }
    }

    /// Smallest parameters argon2 accepts; test use only
    pub fn insecure_fast() -> Self {
        Self {
            time_cost: 1,
            memory_cost: 8,
            parallelism: 1,
            hash_len: DEFAULT_HASH_LEN,
        }
    }
}

/// Server-held HMAC key for payment-message signing
///
/// Loaded once from configuration and handed to the card vault. Never
/// printed: `Debug` shows only the length.
#[derive(Clone, PartialEq, Eq)]
pub struct IntegrityKey(Vec<u8>);

impl IntegrityKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Error::Config("integrity key must not be empty".to_string()));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for IntegrityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntegrityKey(<{} bytes redacted>)", self.0.len())
    }
}
