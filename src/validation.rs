//! Order number validation
//!
//! Order numbers are opaque strings. The only structural rules are that
//! they are non-empty after trimming and, when Luhn checking is enabled,
//! consist of ASCII digits with a valid Luhn check digit.

use std::fmt;

/// Validation errors for order numbers
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Order number must not be empty")]
    Empty,

    #[error("Order number must contain only digits: got '{0}'")]
    NotNumeric(String),

    #[error("Order number fails the Luhn check: '{0}'")]
    BadChecksum(String),
}

/// Trimmed, non-empty order number
///
/// The field is private to force validation through `new()` or
/// `with_luhn()`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OrderNumber(String);

impl OrderNumber {
    /// # Examples
    /// ```
    /// use loyalty_ledger::validation::OrderNumber;
    ///
    /// assert_eq!(OrderNumber::new(" 12345 ").unwrap().as_str(), "12345");
    /// assert!(OrderNumber::new("   ").is_err());
    /// ```
    pub fn new(raw: &str) -> Result<Self, ValidationError> {
        let number = raw.trim();
        if number.is_empty() {
            return Err(ValidationError::Empty);
        }
        Ok(Self(number.to_string()))
    }

    /// Like `new`, but additionally requires digits only and a valid Luhn
    /// check digit
    pub fn with_luhn(raw: &str) -> Result<Self, ValidationError> {
        let number = Self::new(raw)?;
        if !number.0.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::NotNumeric(number.0));
        }
        if !luhn_valid(&number.0) {
            return Err(ValidationError::BadChecksum(number.0));
        }
        Ok(number)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for OrderNumber {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Luhn mod-10 check. Non-digit input is never valid.
pub fn luhn_valid(digits: &str) -> bool {
    if digits.is_empty() {
        return false;
    }

    let mut sum = 0u32;
    for (i, b) in digits.bytes().rev().enumerate() {
        if !b.is_ascii_digit() {
            return false;
        }
        let mut d = u32::from(b - b'0');
        if i % 2 == 1 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    sum % 10 == 0
}
