//! Unit prices using decimal arithmetic.
//!
//! A cart line carries a snapshot of the unit price at the time it was added.
//! Stored carts written by older clients hold the price either as a decimal
//! string (`"10.00"`) or as a JSON number (`10`); both are accepted. Prices
//! are always written back as decimal strings so no precision is lost.

use core::fmt;
use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Errors that can occur when parsing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The input is not a decimal number.
    #[error("invalid price: {0}")]
    Invalid(String),
    /// The amount is below zero.
    #[error("price cannot be negative")]
    Negative,
}

/// A non-negative unit price in the store currency.
///
/// ## Examples
///
/// ```
/// use kushie_core::Price;
///
/// let price: Price = "10.50".parse().unwrap();
/// assert_eq!(price.line_total(2).to_string(), "21.00");
/// assert_eq!(price.display(), "$10.50");
///
/// assert!("-1".parse::<Price>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Price(Decimal);

impl Price {
    /// Zero price.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] if the amount is below zero.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        Ok(Self(amount))
    }

    /// Create a price from an amount in cents.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Negative`] if the amount is below zero.
    pub fn from_cents(cents: i64) -> Result<Self, PriceError> {
        Self::new(Decimal::new(cents, 2))
    }

    /// The unit amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units, saturating at [`Decimal::MAX`].
    #[must_use]
    pub fn line_total(&self, quantity: u32) -> Decimal {
        self.0
            .checked_mul(Decimal::from(quantity))
            .unwrap_or(Decimal::MAX)
    }

    /// Format for display (e.g., "$19.99").
    #[must_use]
    pub fn display(&self) -> String {
        format!("${:.2}", self.0)
    }
}

impl FromStr for Price {
    type Err = PriceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str(s.trim()).map_err(|_| PriceError::Invalid(s.to_owned()))?;
        Self::new(amount)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

/// Wire shapes a stored price may take.
#[derive(Deserialize)]
#[serde(untagged)]
enum PriceRepr {
    Text(String),
    Number(serde_json::Number),
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = match PriceRepr::deserialize(deserializer)? {
            PriceRepr::Text(text) => text,
            PriceRepr::Number(number) => number.to_string(),
        };
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_and_number() {
        let from_str: Price = serde_json::from_str(r#""10.00""#).unwrap();
        let from_num: Price = serde_json::from_str("10").unwrap();
        assert_eq!(from_str, from_num);

        let fractional: Price = serde_json::from_str("4.2").unwrap();
        assert_eq!(fractional.amount(), Decimal::new(42, 1));
    }

    #[test]
    fn test_serializes_as_string() {
        let price = Price::from_cents(1999).unwrap();
        assert_eq!(serde_json::to_string(&price).unwrap(), r#""19.99""#);
    }

    #[test]
    fn test_rejects_negative() {
        assert_eq!(Price::from_cents(-1), Err(PriceError::Negative));
        assert!(serde_json::from_str::<Price>("-3").is_err());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!("ten".parse::<Price>(), Err(PriceError::Invalid(_))));
        assert!(serde_json::from_str::<Price>("true").is_err());
    }

    #[test]
    fn test_line_total() {
        let price: Price = "2.50".parse().unwrap();
        assert_eq!(price.line_total(3), Decimal::new(750, 2));
        assert_eq!(price.line_total(0), Decimal::ZERO);
    }

    #[test]
    fn test_line_total_saturates() {
        let price: Price = "79228162514264337593543950335".parse().unwrap();
        assert_eq!(price.line_total(2), Decimal::MAX);
        assert_eq!(price.line_total(1), Decimal::MAX);
    }

    #[test]
    fn test_display() {
        assert_eq!(Price::from_cents(500).unwrap().display(), "$5.00");
    }
}
