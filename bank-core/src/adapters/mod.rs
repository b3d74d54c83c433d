//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the ledger and card repositories
//! - In-memory repositories for tests
//! - AES-256-GCM with Argon2id key derivation for the Cipher port
//! - Argon2id PHC digests for the SecretHasher port
//! - System clock for the Clock port

pub mod cipher;
pub mod clock;
pub mod duckdb;
pub mod hasher;
pub mod memory;
