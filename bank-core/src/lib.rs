//! Bank Core - ledger and card issuance
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (Account, Transaction, Card) and the error taxonomy
//! - **ports**: Trait definitions for external dependencies (repositories, cipher, hasher, clock)
//! - **services**: Business logic orchestration (ledger, card issuance and verification)
//! - **adapters**: Concrete implementations (DuckDB, AES-GCM, Argon2, in-memory)
//!
//! Callers are pre-authenticated: every operation takes the caller's user id
//! and trusts it.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use adapters::cipher::AesGcmCipher;
use adapters::clock::SystemClock;
use adapters::duckdb::DuckDbRepository;
use adapters::hasher::Argon2SecretHasher;
use config::{Config, DB_FILENAME};
use ports::{CardRepository, LedgerRepository};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult, Result as BankResult};
pub use domain::{
    Account, Card, CardDetails, CardSummary, Currency, IssuedCard, Transaction, TransactionStatus,
    TransactionType,
};
pub use services::{EntryPoint, LogEntry, LogEvent, LoggingService};

/// Main context for bank operations
///
/// Holds the configuration and the wired-up services. Both services share
/// one storage backend.
pub struct BankContext {
    pub config: Config,
    pub ledger_service: LedgerService,
    pub card_service: CardService,
}

impl BankContext {
    /// Open `bank.duckdb` in `data_dir` and wire every service from `settings.json`
    pub fn new(data_dir: &Path) -> Result<Self> {
        let config = Config::load(data_dir)?;
        let db_path = data_dir.join(DB_FILENAME);
        let repository = Arc::new(
            DuckDbRepository::open(&db_path)
                .with_context(|| format!("Failed to open database {}", db_path.display()))?,
        );
        Self::with_repository(config, repository)
    }

    /// Wire the services over any storage backend implementing both repositories
    pub fn with_repository<R>(config: Config, repository: Arc<R>) -> Result<Self>
    where
        R: LedgerRepository + CardRepository + 'static,
    {
        let deadline = Deadline::new(config.operation_timeout);

        let vault = CardVault::new(
            Arc::new(AesGcmCipher::new(config.kdf.clone())),
            Arc::new(Argon2SecretHasher::new(config.secret_hash.clone())),
            config.integrity_key.clone(),
        );
        let generator =
            CardNumberGenerator::new(config.issuer_prefix.clone(), config.card_validity_years)?;

        let ledger_repository: Arc<dyn LedgerRepository> = repository.clone();
        let card_repository: Arc<dyn CardRepository> = repository;

        Ok(Self {
            ledger_service: LedgerService::new(ledger_repository, deadline),
            card_service: CardService::new(
                card_repository,
                vault,
                generator,
                Arc::new(SystemClock),
                deadline,
            ),
            config,
        })
    }
}
