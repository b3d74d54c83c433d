//! Account domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

pub type UserId = i64;
pub type AccountId = i64;

/// Fractional digits kept by the ledger (currency minor units)
pub const AMOUNT_SCALE: u32 = 2;

/// Currencies an account can be opened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Rub,
    Usd,
    Eur,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Rub => "RUB",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = Error;

    /// Parse an ISO 4217 code, case-insensitive
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "RUB" => Ok(Currency::Rub),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            other => Err(Error::validation(format!("unsupported currency: {:?}", other))),
        }
    }
}

/// A monetary account owned by exactly one user
///
/// `balance` is never negative in any committed state. It only changes
/// through the ledger's balance-update and transfer operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner_user_id: UserId,
    pub balance: Decimal,
    pub currency: Currency,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_user_id == user_id
    }
}

/// Reject amounts finer than the ledger's minor unit
pub fn validate_precision(amount: Decimal) -> Result<()> {
    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(Error::validation(format!(
            "amount {} has more than {} fractional digits",
            amount, AMOUNT_SCALE
        )));
    }
    Ok(())
}
