//! Amount type for handling monetary values typed by users or returned by the ledger.
//!
//! This module provides the `Amount` type which wraps `Decimal`. It parses user input that may
//! include a dollar sign and commas, and it travels over the wire as a plain JSON number.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Represents how amounts were (or should be) formatted for display.
///
/// # Examples
///  - `AmountFormat{ dollar: true, commas: true }` -> `$60,000.00`
///  - `AmountFormat{ dollar: false, commas: true }` -> `60,000.00`
///  - `AmountFormat{ dollar: false, commas: false }` -> `60000.00`
///  - `AmountFormat{ dollar: true, commas: false }` -> `$60000.00`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AmountFormat {
    /// Whether a dollar sign is present in the formatting.
    dollar: bool,
    /// Whether commas are present as thousands separators in the formatting.
    commas: bool,
}

impl Default for AmountFormat {
    fn default() -> Self {
        DEFAULT_FORMAT
    }
}

/// The default format has a dollar sign and commas: e.g. `$60,000.00`.
const DEFAULT_FORMAT: AmountFormat = AmountFormat {
    dollar: true,
    commas: true,
};

/// Format of amounts decoded from the wire.
const PLAIN_FORMAT: AmountFormat = AmountFormat {
    dollar: false,
    commas: false,
};

/// Represents a monetary magnitude. The direction of money (income or expense) is carried by
/// `TransactionType`, not by the sign of the amount.
///
/// Formatting only affects `Display`. Equality, ordering and hashing use the numeric value.
///
/// ```
/// # use moneytalk_sync::Amount;
/// # use std::str::FromStr;
/// let a = Amount::from_str("1200.5").unwrap();
/// let b = Amount::from_str("$1,200.50").unwrap();
/// assert_eq!(a, b);
/// assert_eq!(b.to_string(), "$1,200.50");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct Amount {
    /// The parsed numerical value.
    value: Decimal,
    /// How the value is displayed.
    format: AmountFormat,
}

impl Amount {
    /// Creates a new Amount from a Decimal value with the default formatting.
    pub const fn new(value: Decimal) -> Self {
        Self::new_with_format(value, DEFAULT_FORMAT)
    }

    pub const fn new_with_format(value: Decimal, format: AmountFormat) -> Self {
        Self { value, format }
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value().is_zero()
    }

    /// Returns true if the amount is strictly greater than zero.
    pub fn is_positive(&self) -> bool {
        !self.is_zero() && self.value().is_sign_positive()
    }

    /// Returns true if the amount survives the trip through a JSON number unchanged. Very large
    /// or very precise values are rounded by the conversion to `f64`.
    pub fn fits_json_number(&self) -> bool {
        self.value
            .to_f64()
            .and_then(|n| Decimal::from_str(&n.to_string()).ok())
            == Some(self.value)
    }
}

impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Amount {}

impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Amount {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl Hash for Amount {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.normalize().hash(state)
    }
}

/// An error that can occur when parsing strings into `Decimal` values.
pub struct AmountError(rust_decimal::Error);

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();

        let (dollar, without_dollar) = match trimmed.strip_prefix('-') {
            Some(after_minus) => match after_minus.strip_prefix('$') {
                Some(after_dollar) => (true, format!("-{after_dollar}")),
                None => (false, trimmed.to_string()),
            },
            None => match trimmed.strip_prefix('$') {
                Some(after_dollar) => (true, after_dollar.to_string()),
                None => (false, trimmed.to_string()),
            },
        };

        // Remove commas (thousand separators)
        let without_commas = without_dollar.replace(',', "");
        let commas = without_commas.len() < without_dollar.len();

        let value = Decimal::from_str(&without_commas).map_err(AmountError)?;
        Ok(Amount {
            value,
            format: AmountFormat { dollar, commas },
        })
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let (sign, num) = if self.value.is_sign_negative() && !self.is_zero() {
            ("-", self.value().abs())
        } else {
            ("", self.value())
        };

        let dol = if self.format.dollar { "$" } else { "" };

        if self.format.commas {
            write!(
                f,
                "{sign}{dol}{}",
                format_num::format_num!(",.2", num.to_f64().unwrap_or_default())
            )
        } else {
            write!(f, "{sign}{dol}{num}")
        }
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.value.to_f64() {
            Some(n) => serializer.serialize_f64(n),
            None => Err(serde::ser::Error::custom(format!(
                "amount {} cannot be represented as a number",
                self.value
            ))),
        }
    }
}

struct AmountVisitor;

impl Visitor<'_> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("a number or a numeric string")
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Amount, E> {
        Ok(Amount::new_with_format(Decimal::from(v), PLAIN_FORMAT))
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Amount, E> {
        Ok(Amount::new_with_format(Decimal::from(v), PLAIN_FORMAT))
    }

    fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Amount, E> {
        Decimal::from_f64(v)
            .map(|d| Amount::new_with_format(d, PLAIN_FORMAT))
            .ok_or_else(|| E::custom(format!("{v} is not a valid amount")))
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Amount, E> {
        Amount::from_str(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AmountVisitor)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_currency_input() {
        assert_eq!(Amount::from_str("$50.00").unwrap().value(), dec("50.00"));
        assert_eq!(Amount::from_str("50").unwrap().value(), dec("50"));
        assert_eq!(
            Amount::from_str("  $1,234,567.89 ").unwrap().value(),
            dec("1234567.89")
        );
        assert_eq!(Amount::from_str("-$5.25").unwrap().value(), dec("-5.25"));
    }

    #[test]
    fn test_parse_garbage() {
        assert!(Amount::from_str("").is_err());
        assert!(Amount::from_str("twelve").is_err());
    }

    #[test]
    fn test_display_keeps_input_format() {
        assert_eq!(Amount::from_str("1,000.00").unwrap().to_string(), "1,000.00");
        assert_eq!(Amount::from_str("$1000.00").unwrap().to_string(), "$1000.00");
        assert_eq!(Amount::new(dec("60000")).to_string(), "$60,000.00");
    }

    #[test]
    fn test_equality_ignores_format() {
        let a = Amount::from_str("$1,200.00").unwrap();
        let b = Amount::from_str("1200").unwrap();
        assert_eq!(a, b);
        assert!(Amount::from_str("30").unwrap() < b);
    }

    #[test]
    fn test_is_positive() {
        assert!(Amount::from_str("0.01").unwrap().is_positive());
        assert!(!Amount::from_str("0").unwrap().is_positive());
        assert!(!Amount::from_str("-3").unwrap().is_positive());
    }

    #[test]
    fn test_fits_json_number() {
        assert!(Amount::from_str("$1,234.56").unwrap().fits_json_number());
        assert!(Amount::from_str("0.1").unwrap().fits_json_number());
        assert!(Amount::from_str("12.50").unwrap().fits_json_number());
        assert!(!Amount::from_str("12345678901234567.89")
            .unwrap()
            .fits_json_number());
        assert!(!Amount::from_str("0.10000000000000000001")
            .unwrap()
            .fits_json_number());
    }

    #[test]
    fn test_serialize_as_number() {
        let amount = Amount::from_str("$45.50").unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), "45.5");
    }

    #[test]
    fn test_deserialize_number_or_string() {
        let a: Amount = serde_json::from_str("1200").unwrap();
        assert_eq!(a.value(), dec("1200"));
        let b: Amount = serde_json::from_str("45.1").unwrap();
        assert_eq!(b.value(), dec("45.1"));
        let c: Amount = serde_json::from_str("\"$7.25\"").unwrap();
        assert_eq!(c.value(), dec("7.25"));
        assert!(serde_json::from_str::<Amount>("true").is_err());
    }
}
