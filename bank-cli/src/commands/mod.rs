//! CLI command implementations

pub mod account;
pub mod card;
pub mod logs;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use bank_core::config::Config;
use bank_core::domain::UserId;
use bank_core::{BankContext, EntryPoint, LogEvent, LoggingService};

/// Get the logging service for CLI operations
///
/// Returns None if logging fails to initialize (shouldn't block operations)
pub fn get_logger() -> Option<LoggingService> {
    let data_dir = get_data_dir().ok()?;
    std::fs::create_dir_all(&data_dir).ok()?;
    LoggingService::new(&data_dir, EntryPoint::Cli, env!("CARGO_PKG_VERSION")).ok()
}

/// Log an event, ignoring any errors (logging should never break the app)
pub fn log_event(logger: &Option<LoggingService>, event: LogEvent) {
    if let Some(l) = logger {
        if let Err(e) = l.log(event) {
            tracing::debug!(error = %e, "failed to write event log");
        }
    }
}

/// Data directory from `BANK_DIR` or `~/.bank`
pub fn get_data_dir() -> Result<PathBuf> {
    Config::data_dir()
}

/// Open the bank context, creating the data directory on first use
pub fn get_context() -> Result<BankContext> {
    let data_dir = get_data_dir()?;

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    BankContext::new(&data_dir).context("Failed to initialize bank context")
}

/// The acting user; every ledger and card command needs one
pub fn require_user(user: Option<UserId>) -> Result<UserId> {
    user.ok_or_else(|| anyhow!("No user given; pass --user or set BANK_USER_ID"))
}
