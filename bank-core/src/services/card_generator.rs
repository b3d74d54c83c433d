//! Card number generator
//!
//! Produces a Luhn-valid 16-digit PAN under a fixed 6-digit issuer prefix,
//! an expiry `validity_years` ahead of the issue date, and a 3-digit CVV.
//! Digits come from `byte % 10` over OS randomness, so 0-5 are very slightly
//! more likely than 6-9.

use std::fmt;

use chrono::NaiveDate;
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};

use crate::domain::result::{Error, Result};
use crate::domain::{luhn_check_digit, Expiry};

pub const DEFAULT_ISSUER_PREFIX: &str = "400000";
pub const DEFAULT_VALIDITY_YEARS: u32 = 3;
pub const MAX_VALIDITY_YEARS: u32 = 50;

const ACCOUNT_DIGITS: usize = 9;

/// Freshly generated plaintext card data
#[derive(Clone, PartialEq, Eq)]
pub struct GeneratedCard {
    pub pan: String,
    pub expiry: Expiry,
    pub cvv: String,
}

impl fmt::Debug for GeneratedCard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedCard")
            .field("pan", &"<redacted>")
            .field("expiry", &self.expiry)
            .field("cvv", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CardNumberGenerator {
    issuer_prefix: String,
    validity_years: u32,
}

impl Default for CardNumberGenerator {
    fn default() -> Self {
        Self {
            issuer_prefix: DEFAULT_ISSUER_PREFIX.to_string(),
            validity_years: DEFAULT_VALIDITY_YEARS,
        }
    }
}

impl CardNumberGenerator {
    /// Fails `Validation` unless the prefix is exactly six ASCII digits and
    /// `validity_years` is between 1 and `MAX_VALIDITY_YEARS`
    pub fn new(issuer_prefix: impl Into<String>, validity_years: u32) -> Result<Self> {
        let issuer_prefix = issuer_prefix.into();
        if issuer_prefix.len() != 6 || !issuer_prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::validation(format!(
                "issuer prefix must be 6 digits, got {:?}",
                issuer_prefix
            )));
        }
        if !(1..=MAX_VALIDITY_YEARS).contains(&validity_years) {
            return Err(Error::validation(format!(
                "card validity must be 1 to {} years, got {}",
                MAX_VALIDITY_YEARS, validity_years
            )));
        }
        Ok(Self {
            issuer_prefix,
            validity_years,
        })
    }

    /// Generate from the operating system's CSPRNG
    pub fn generate(&self, issued_on: NaiveDate) -> Result<GeneratedCard> {
        self.generate_with(&mut OsRng, issued_on)
    }

    pub fn generate_with<R>(&self, rng: &mut R, issued_on: NaiveDate) -> Result<GeneratedCard>
    where
        R: RngCore + CryptoRng,
    {
        let mut digit_bytes = [0u8; ACCOUNT_DIGITS];
        let mut cvv_bytes = [0u8; 2];
        rng.try_fill_bytes(&mut digit_bytes)
            .and_then(|_| rng.try_fill_bytes(&mut cvv_bytes))
            .map_err(|e| Error::RandomSource(e.to_string()))?;

        let mut pan = String::with_capacity(16);
        pan.push_str(&self.issuer_prefix);
        pan.extend(digit_bytes.iter().map(|b| char::from(b'0' + b % 10)));

        let check = luhn_check_digit(&pan)
            .ok_or_else(|| Error::validation("card number payload is not numeric"))?;
        pan.push(char::from(b'0' + check as u8));

        let cvv_value = u16::from_be_bytes(cvv_bytes);
        let cvv = format!("{:03}", 100 + cvv_value % 900);

        Ok(GeneratedCard {
            pan,
            expiry: Expiry::years_after(issued_on, self.validity_years)?,
            cvv,
        })
    }
}
