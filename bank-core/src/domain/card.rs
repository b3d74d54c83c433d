//! Card domain model
//!
//! Plaintext PAN, expiry and CVV never live in a persisted `Card`; only the
//! encrypted forms and the CVV digest do. The plaintext exists once, in the
//! `IssuedCard` bundle returned at issuance.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::account::UserId;
use super::result::{Error, Result};

pub type CardId = i64;

/// A stored card: encrypted PAN and expiry plus the CVV digest
#[derive(Clone, PartialEq, Eq)]
pub struct Card {
    pub id: CardId,
    pub owner_user_id: UserId,
    pub encrypted_pan: Vec<u8>,
    pub encrypted_expiry: Vec<u8>,
    pub cvv_digest: String,
    pub created_at: DateTime<Utc>,
}

impl Card {
    pub fn summary(&self) -> CardSummary {
        CardSummary {
            id: self.id,
            owner_user_id: self.owner_user_id,
            created_at: self.created_at,
        }
    }
}

impl fmt::Debug for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Card")
            .field("id", &self.id)
            .field("owner_user_id", &self.owner_user_id)
            .field("encrypted_pan", &format_args!("<{} bytes>", self.encrypted_pan.len()))
            .field("encrypted_expiry", &format_args!("<{} bytes>", self.encrypted_expiry.len()))
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Card metadata, safe to list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSummary {
    pub id: CardId,
    pub owner_user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Card columns written at issuance (storage assigns id and created_at)
#[derive(Clone)]
pub struct NewCard {
    pub owner_user_id: UserId,
    pub encrypted_pan: Vec<u8>,
    pub encrypted_expiry: Vec<u8>,
    pub cvv_digest: String,
}

/// One-time plaintext bundle handed to the card holder at issuance
#[derive(Clone, Serialize)]
pub struct IssuedCard {
    pub pan: String,
    pub expiry: String,
    pub cvv: String,
    /// Hex HMAC-SHA256 over `"{id}:{pan}:{expiry}:{cvv}"`
    pub signature: String,
}

impl fmt::Debug for IssuedCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedCard")
            .field("pan", &mask_pan(&self.pan))
            .field("expiry", &self.expiry)
            .field("cvv", &"***")
            .field("signature", &"<redacted>")
            .finish()
    }
}

/// Masked view returned by card detail disclosure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardDetails {
    pub id: CardId,
    pub masked_pan: String,
    pub expiry: String,
}

/// Mask everything but the last four digits
pub fn mask_pan(pan: &str) -> String {
    let digits: Vec<char> = pan.chars().collect();
    let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("**** **** **** {}", tail)
}

/// Luhn check digit for a string of decimal digits
///
/// Walks right to left doubling every second digit, starting with the
/// rightmost digit of `payload` (it sits next to the check digit).
pub fn luhn_check_digit(payload: &str) -> Option<u32> {
    let mut sum = 0;
    for (i, c) in payload.chars().rev().enumerate() {
        let mut digit = c.to_digit(10)?;
        if i % 2 == 0 {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
    }
    Some((10 - sum % 10) % 10)
}

/// Validate a full number including its trailing check digit
pub fn is_luhn_valid(number: &str) -> bool {
    let Some((last, check)) = number.char_indices().last() else {
        return false;
    };
    let payload = &number[..last];
    if payload.is_empty() {
        return false;
    }
    match (luhn_check_digit(payload), check.to_digit(10)) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => false,
    }
}

/// Years an `MM/YY` expiry can name
const EXPIRY_YEARS: std::ops::RangeInclusive<i32> = 2000..=2099;

/// Card expiry as printed on the card (`MM/YY`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    month: u32,
    year: i32,
}

impl Expiry {
    pub fn new(month: u32, year: i32) -> Result<Self> {
        if !(1..=12).contains(&month) {
            return Err(Error::validation(format!("invalid expiry month {}", month)));
        }
        if !EXPIRY_YEARS.contains(&year) {
            return Err(Error::validation(format!("expiry year {} does not fit MM/YY", year)));
        }
        Ok(Self { month, year })
    }

    /// Expiry `years` after `issued_on`, same month
    pub fn years_after(issued_on: NaiveDate, years: u32) -> Result<Self> {
        let year = i32::try_from(years)
            .ok()
            .and_then(|years| issued_on.year().checked_add(years))
            .ok_or_else(|| Error::validation(format!("{} years from issue overflows", years)))?;
        Self::new(issued_on.month(), year)
    }

    /// Parse `MM/YY`; two-digit years are in the 2000s
    pub fn parse(s: &str) -> Result<Self> {
        let (mm, yy) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::validation("expiry must be MM/YY"))?;
        let month: u32 = mm
            .parse()
            .map_err(|_| Error::validation("expiry month is not a number"))?;
        let year: i32 = yy
            .parse()
            .map_err(|_| Error::validation("expiry year is not a number"))?;
        Self::new(month, 2000 + year)
    }

    /// The instant after which the card is expired: midnight UTC on the
    /// last day of the expiry month.
    pub fn expires_at(&self) -> DateTime<Utc> {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        let last_day = NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|first| first.pred_opt())
            .unwrap_or(NaiveDate::MAX);
        Utc.from_utc_datetime(&last_day.and_time(NaiveTime::MIN))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:02}", self.month, self.year.rem_euclid(100))
    }
}
