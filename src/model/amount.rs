//! Amount type for handling monetary values written in a localized currency format.
//!
//! Budget sheets are written by people, so amounts arrive as strings like `Rp153.700`,
//! `Rp1.234.567,50` or `-$60,000.00`. A `CurrencyFormat` describes how to read (and display) them;
//! the parsed value is always an exact `Decimal`.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Describes how amounts are written in a budget sheet.
///
/// # Examples
///  - Rupiah (the default): prefix `Rp`, thousands `.`, decimal `,` -> `Rp1.234.567,50`
///  - US dollars: prefix `$`, thousands `,`, decimal `.` -> `$1,234,567.50`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CurrencyFormat {
    /// The currency symbol written before the number, e.g. `Rp`. Matched case-insensitively.
    prefix: String,
    /// The character used to group thousands.
    thousands_separator: char,
    /// The character that separates the integer part from the fraction.
    decimal_separator: char,
    /// Number of fraction digits shown when displaying amounts.
    #[serde(default)]
    display_decimals: u32,
}

impl Default for CurrencyFormat {
    fn default() -> Self {
        Self::rupiah()
    }
}

impl CurrencyFormat {
    pub fn new(
        prefix: impl Into<String>,
        thousands_separator: char,
        decimal_separator: char,
        display_decimals: u32,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            thousands_separator,
            decimal_separator,
            display_decimals,
        }
    }

    /// Indonesian Rupiah, e.g. `Rp1.234.567`.
    pub fn rupiah() -> Self {
        Self::new("Rp", '.', ',', 0)
    }

    /// US dollars, e.g. `$1,234.56`.
    pub fn dollar() -> Self {
        Self::new("$", ',', '.', 2)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn thousands_separator(&self) -> char {
        self.thousands_separator
    }

    pub fn decimal_separator(&self) -> char {
        self.decimal_separator
    }

    /// Parses `s` into an `Amount`.
    ///
    /// Accepts an optional sign (a leading `-`, or the whole value in parentheses), an optional
    /// currency prefix, thousands separators and whitespace between groups.
    pub fn parse(&self, s: &str) -> Result<Amount, AmountError> {
        let original = s;
        let mut rest = s.trim();
        if rest.is_empty() {
            return Err(AmountError::Empty);
        }

        let mut negative = false;
        if let Some(inner) = rest.strip_prefix('(').and_then(|r| r.strip_suffix(')')) {
            negative = true;
            rest = inner.trim();
        }
        if let Some(after) = rest.strip_prefix('-') {
            negative = !negative;
            rest = after.trim_start();
        }
        if let Some(after) = strip_prefix_ignore_case(rest, &self.prefix) {
            rest = after.trim_start();
            // `Rp-1.000` puts the sign after the symbol
            if let Some(after) = rest.strip_prefix('-') {
                negative = !negative;
                rest = after.trim_start();
            }
        }

        let invalid = || AmountError::Invalid(original.to_string());
        let (integer, fraction) = match rest.split_once(self.decimal_separator) {
            Some((integer, fraction)) => (integer, Some(fraction)),
            None => (rest, None),
        };

        let mut normalized = String::with_capacity(rest.len() + 1);
        if negative {
            normalized.push('-');
        }
        let groups: Vec<&str> = integer
            .split(|c: char| c == self.thousands_separator || c.is_whitespace())
            .collect();
        for (i, group) in groups.iter().enumerate() {
            let well_formed = match (i, groups.len()) {
                (_, 1) => !group.is_empty(),
                (0, _) => (1..=3).contains(&group.len()),
                _ => group.len() == 3,
            };
            if !well_formed || !group.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            normalized.push_str(group);
        }
        if let Some(fraction) = fraction {
            if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            normalized.push('.');
            normalized.push_str(fraction);
        }

        let value = Decimal::from_str(&normalized)
            .map_err(|e| AmountError::Decimal(original.to_string(), e))?;
        Ok(Amount::new(value))
    }

    /// Formats `amount` for people, e.g. `Rp1.234.567` or `-$60,000.00`.
    pub fn display(&self, amount: Amount) -> String {
        let mut value = amount
            .value()
            .round_dp_with_strategy(self.display_decimals, RoundingStrategy::MidpointAwayFromZero);
        value.rescale(self.display_decimals);
        let sign = if value.is_sign_negative() && !value.is_zero() {
            "-"
        } else {
            ""
        };
        let digits = value.abs().to_string();
        let (integer, fraction) = match digits.split_once('.') {
            Some((integer, fraction)) => (integer, Some(fraction)),
            None => (digits.as_str(), None),
        };

        let mut grouped = String::with_capacity(digits.len() + integer.len() / 3 + 1);
        for (i, c) in integer.chars().enumerate() {
            if i > 0 && (integer.len() - i) % 3 == 0 {
                grouped.push(self.thousands_separator);
            }
            grouped.push(c);
        }
        if let Some(fraction) = fraction {
            grouped.push(self.decimal_separator);
            grouped.push_str(fraction);
        }
        format!("{sign}{}{grouped}", self.prefix)
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return None;
    }
    let head = s.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        s.get(prefix.len()..)
    } else {
        None
    }
}

/// Represents an exact monetary amount.
///
/// `Display`, `Serialize` and `Deserialize` all use the plain decimal representation (e.g.
/// `153700` or `-12.50`), which is also how amounts are stored in SQLite and written to CSV. Use
/// `CurrencyFormat::display` for a localized, human-readable string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount {
    value: Decimal,
}

impl Amount {
    pub const ZERO: Amount = Amount::new(Decimal::ZERO);

    pub const fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.value.is_sign_negative()
    }
}

impl std::ops::Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Self) -> Self::Output {
        Amount::new(self.value + rhs.value)
    }
}

impl std::ops::Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount::new(self.value - rhs.value)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.value += rhs.value;
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| acc + a)
    }
}

impl<'a> std::iter::Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// An error that can occur when parsing strings into `Amount` values.
#[derive(Debug, thiserror::Error)]
pub enum AmountError {
    #[error("The amount is empty")]
    Empty,
    #[error("'{0}' is not a valid amount")]
    Invalid(String),
    #[error("'{0}' could not be converted to a decimal: {1}")]
    Decimal(String, #[source] rust_decimal::Error),
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parses the plain decimal representation, e.g. `153700` or `-12.50`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }
        Decimal::from_str(trimmed)
            .map(Amount::new)
            .map_err(|e| AmountError::Decimal(s.to_string(), e))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.value.normalize(), f)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl schemars::JsonSchema for Amount {
    fn schema_name() -> std::borrow::Cow<'static, str> {
        "Amount".into()
    }

    fn json_schema(generator: &mut schemars::SchemaGenerator) -> schemars::Schema {
        <String as schemars::JsonSchema>::json_schema(generator)
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
