//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod crypto;
mod repository;

use chrono::{DateTime, Utc};

pub use crypto::{Cipher, SecretHasher};
pub use repository::{CardRepository, LedgerRepository};

/// Source of the current time, injectable so expiry checks can be tested
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
