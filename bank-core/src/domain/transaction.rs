//! Transaction domain model - append-only ledger entries

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::result::{Error, Result};

pub type TransactionId = i64;

/// Direction of a balance mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
}

impl TransactionType {
    /// Direction implied by the sign of a balance delta
    pub fn for_delta(delta: Decimal) -> Self {
        if delta.is_sign_negative() {
            TransactionType::Withdrawal
        } else {
            TransactionType::Deposit
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "DEPOSIT" => Ok(TransactionType::Deposit),
            "WITHDRAWAL" => Ok(TransactionType::Withdrawal),
            other => Err(Error::validation(format!("unknown transaction type: {}", other))),
        }
    }
}

/// Settlement state of a ledger entry
///
/// The ledger only writes `Completed`; the other states exist for rows
/// written by other systems sharing the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(Error::validation(format!("unknown transaction status: {}", other))),
        }
    }
}

/// A single immutable ledger entry belonging to one account
///
/// `amount` is always non-negative; the direction lives in `tx_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// A ledger entry about to be appended (storage assigns id and timestamp)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewTransaction {
    pub account_id: AccountId,
    pub amount: Decimal,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
}

impl NewTransaction {
    /// Completed entry recording `delta` against `account_id`
    pub fn completed(account_id: AccountId, delta: Decimal) -> Self {
        Self {
            account_id,
            amount: delta.abs(),
            tx_type: TransactionType::for_delta(delta),
            status: TransactionStatus::Completed,
        }
    }
}
