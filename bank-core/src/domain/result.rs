//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message handed to external callers for every card failure that must not
/// reveal which check rejected the request.
pub const CARD_AUTHORIZATION_FAILED: &str = "card authorization failed";

/// Core library error type
///
/// Messages carry the operation and entity id only. Plaintext card data,
/// passphrases and key material never reach an error message.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{entity} {id} does not belong to the caller")]
    Forbidden { entity: &'static str, id: i64 },

    #[error("amount must be non-zero")]
    ZeroAmount,

    #[error("amount must be positive")]
    NonPositiveAmount,

    #[error("cannot transfer to the same account")]
    SameAccount,

    #[error("insufficient funds on account {account_id}")]
    InsufficientFunds { account_id: i64 },

    #[error("currency mismatch: account {from} and account {to} hold different currencies")]
    CurrencyMismatch { from: i64, to: i64 },

    #[error("invalid CVV for card {card_id}")]
    InvalidCvv { card_id: i64 },

    #[error("card {card_id} has expired")]
    CardExpired { card_id: i64 },

    #[error("payment signature mismatch for card {card_id}")]
    SignatureMismatch { card_id: i64 },

    #[error("encryption failed: {context}")]
    Encryption { context: String },

    #[error("decryption failed: {context}")]
    Decryption { context: String },

    #[error("secure random source unavailable: {0}")]
    RandomSource(String),

    #[error("storage error during {operation}: {message}")]
    Storage { operation: String, message: String },

    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a not found error
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Create an ownership violation error
    pub fn forbidden(entity: &'static str, id: i64) -> Self {
        Self::Forbidden { entity, id }
    }

    /// Create a storage error, tagging it with the operation that failed
    pub fn storage(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn encryption(context: impl Into<String>) -> Self {
        Self::Encryption {
            context: context.into(),
        }
    }

    pub fn decryption(context: impl Into<String>) -> Self {
        Self::Decryption {
            context: context.into(),
        }
    }

    /// Message safe to hand to an external caller.
    ///
    /// Card lookups, ownership, decryption, CVV and signature failures all
    /// collapse into one string so a caller cannot tell which check failed.
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFound { entity: "card", .. }
            | Self::Forbidden { entity: "card", .. }
            | Self::Decryption { .. }
            | Self::InvalidCvv { .. }
            | Self::SignatureMismatch { .. } => CARD_AUTHORIZATION_FAILED.to_string(),
            Self::Storage { operation, .. } => format!("storage error during {}", operation),
            other => other.to_string(),
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a successful result with context
    pub fn ok_with_context(data: T, context: HashMap<String, serde_json::Value>) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: Some(context),
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::fail(e.public_message()),
        }
    }
}
