//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

mod account;
mod card;
mod encryption;
pub mod result;
mod transaction;

pub use account::{validate_precision, Account, AccountId, Currency, UserId, AMOUNT_SCALE};
pub use card::{
    is_luhn_valid, luhn_check_digit, mask_pan, Card, CardDetails, CardId, CardSummary, Expiry,
    IssuedCard, NewCard,
};
pub use encryption::{Argon2Params, IntegrityKey};
pub use transaction::{
    NewTransaction, Transaction, TransactionId, TransactionStatus, TransactionType,
};
