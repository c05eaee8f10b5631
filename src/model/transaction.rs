use crate::model::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The category name used when a row has no category.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Whether a row came from the Expenses or the Income section of a budget sheet.
#[derive(
    Debug,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Expense,
    Income,
}

serde_plain::derive_display_from_serialize!(TransactionType);
serde_plain::derive_fromstr_from_deserialize!(TransactionType);

/// One parsed row of the Expenses or Income section, before it is stored.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// The date exactly as written in the sheet.
    pub(crate) date: String,
    pub(crate) amount: Amount,
    pub(crate) description: String,
    pub(crate) category: String,
}

impl Entry {
    pub fn new(
        date: impl Into<String>,
        amount: Amount,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            date: date.into(),
            amount,
            description: description.into(),
            category: category.into(),
        }
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

/// A stored expense or income row belonging to a `Document`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub(crate) id: i64,
    pub(crate) document_id: i64,
    pub(crate) transaction_type: TransactionType,
    pub(crate) date: String,
    pub(crate) amount: Amount,
    pub(crate) description: String,
    pub(crate) category: String,
    pub(crate) created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn document_id(&self) -> i64 {
        self.document_id
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    /// The category, or `Uncategorized` if it is blank.
    pub fn category_or_uncategorized(&self) -> &str {
        let trimmed = self.category.trim();
        if trimmed.is_empty() {
            UNCATEGORIZED
        } else {
            trimmed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_transaction_type_plain_strings() {
        assert_eq!(TransactionType::Expense.to_string(), "expense");
        assert_eq!(
            TransactionType::from_str("income").unwrap(),
            TransactionType::Income
        );
        assert!(TransactionType::from_str("refund").is_err());
    }

    #[test]
    fn test_uncategorized() {
        let mut t = Transaction {
            id: 1,
            document_id: 1,
            transaction_type: TransactionType::Expense,
            date: "1/8/2025".into(),
            amount: Amount::from_str("15000").unwrap(),
            description: "Snacks".into(),
            category: "  ".into(),
            created_at: Utc::now(),
        };
        assert_eq!(t.category_or_uncategorized(), UNCATEGORIZED);
        t.category = "Food".into();
        assert_eq!(t.category_or_uncategorized(), "Food");
    }
}
