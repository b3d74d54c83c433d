//! Configuration management
//!
//! Settings come from `<data_dir>/settings.json`, with environment variables
//! taking precedence:
//! ```json
//! {
//!   "integrityKey": "...",
//!   "operationTimeoutMs": 5000,
//!   "cardValidityYears": 3,
//!   "issuerPrefix": "400000",
//!   "kdf": { "timeCost": 3, "memoryCost": 65536, "parallelism": 4, "hashLen": 32 },
//!   "secretHash": { "timeCost": 2, "memoryCost": 19456, "parallelism": 1, "hashLen": 32 }
//! }
//! ```
//! Keeping the integrity key in `BANK_HMAC_KEY` rather than the file is
//! preferred.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{Argon2Params, IntegrityKey};
use crate::services::card_generator::{
    DEFAULT_ISSUER_PREFIX, DEFAULT_VALIDITY_YEARS, MAX_VALIDITY_YEARS,
};
use crate::services::DEFAULT_OPERATION_TIMEOUT;

pub const ENV_DATA_DIR: &str = "BANK_DIR";
pub const ENV_INTEGRITY_KEY: &str = "BANK_HMAC_KEY";
pub const ENV_OPERATION_TIMEOUT_MS: &str = "BANK_OPERATION_TIMEOUT_MS";

pub const DB_FILENAME: &str = "bank.duckdb";
const SETTINGS_FILENAME: &str = "settings.json";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    integrity_key: Option<String>,
    #[serde(default)]
    operation_timeout_ms: Option<u64>,
    #[serde(default)]
    card_validity_years: Option<u32>,
    #[serde(default)]
    issuer_prefix: Option<String>,
    #[serde(default)]
    kdf: Option<Argon2Params>,
    #[serde(default)]
    secret_hash: Option<Argon2Params>,
}

/// Resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub integrity_key: IntegrityKey,
    pub operation_timeout: Duration,
    pub card_validity_years: u32,
    pub issuer_prefix: String,
    /// Argon2id parameters for deriving card encryption keys
    pub kdf: Argon2Params,
    /// Argon2id parameters for CVV digests
    pub secret_hash: Argon2Params,
}

impl Config {
    /// Load from the data directory and the process environment
    pub fn load(data_dir: &Path) -> Result<Self> {
        Self::load_with_env(data_dir, |name| std::env::var(name).ok())
    }

    /// Load with an explicit environment lookup
    pub fn load_with_env(data_dir: &Path, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let settings_path = data_dir.join(SETTINGS_FILENAME);
        let raw: SettingsFile = if settings_path.exists() {
            let content = std::fs::read_to_string(&settings_path)
                .with_context(|| format!("Failed to read {}", settings_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Invalid settings in {}", settings_path.display()))?
        } else {
            SettingsFile::default()
        };

        let key = env(ENV_INTEGRITY_KEY)
            .or(raw.integrity_key)
            .ok_or_else(|| {
                anyhow!(
                    "No integrity key configured; set {} or integrityKey in {}",
                    ENV_INTEGRITY_KEY,
                    settings_path.display()
                )
            })?;
        let integrity_key = IntegrityKey::new(key)?;

        let operation_timeout = match env(ENV_OPERATION_TIMEOUT_MS) {
            Some(ms) => Duration::from_millis(
                ms.trim()
                    .parse()
                    .with_context(|| format!("{} must be milliseconds", ENV_OPERATION_TIMEOUT_MS))?,
            ),
            None => raw
                .operation_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_OPERATION_TIMEOUT),
        };
        if operation_timeout.is_zero() {
            bail!("Operation timeout must be greater than zero");
        }

        let issuer_prefix = raw
            .issuer_prefix
            .unwrap_or_else(|| DEFAULT_ISSUER_PREFIX.to_string());
        if issuer_prefix.len() != 6 || !issuer_prefix.bytes().all(|b| b.is_ascii_digit()) {
            bail!("issuerPrefix must be exactly 6 digits");
        }

        let card_validity_years = raw.card_validity_years.unwrap_or(DEFAULT_VALIDITY_YEARS);
        if !(1..=MAX_VALIDITY_YEARS).contains(&card_validity_years) {
            bail!("cardValidityYears must be between 1 and {}", MAX_VALIDITY_YEARS);
        }

        Ok(Self {
            integrity_key,
            operation_timeout,
            card_validity_years,
            issuer_prefix,
            kdf: raw.kdf.unwrap_or_default(),
            secret_hash: raw.secret_hash.unwrap_or_else(Argon2Params::secret_hash_default),
        })
    }

    /// Data directory from `BANK_DIR`, else `~/.bank`
    pub fn data_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            return Ok(PathBuf::from(dir));
        }
        dirs::home_dir()
            .map(|home| home.join(".bank"))
            .ok_or_else(|| anyhow!("Could not find home directory; set {}", ENV_DATA_DIR))
    }
}
