use crate::model::{Amount, BudgetSheet, Month, MonthYear};
use crate::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Row counts and totals of a parsed budget sheet.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Summary {
    pub(crate) total_expenses: Amount,
    pub(crate) total_income: Amount,
    pub(crate) expenses_count: u32,
    pub(crate) income_count: u32,
}

impl Summary {
    /// Computes the summary of `sheet`.
    pub fn of(sheet: &BudgetSheet) -> Self {
        Self {
            total_expenses: sheet.expenses().iter().map(|e| e.amount()).sum(),
            total_income: sheet.income().iter().map(|e| e.amount()).sum(),
            expenses_count: sheet.expenses().len() as u32,
            income_count: sheet.income().len() as u32,
        }
    }

    pub fn total_expenses(&self) -> Amount {
        self.total_expenses
    }

    pub fn total_income(&self) -> Amount {
        self.total_income
    }

    pub fn expenses_count(&self) -> u32 {
        self.expenses_count
    }

    pub fn income_count(&self) -> u32 {
        self.income_count
    }

    pub fn net_income(&self) -> Amount {
        self.total_income - self.total_expenses
    }
}

/// A processed monthly budget spreadsheet.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Document {
    pub(crate) id: i64,
    pub(crate) owner: String,
    pub(crate) source_id: i64,
    /// The Google Drive file ID of the spreadsheet.
    pub(crate) sheet_id: String,
    pub(crate) sheet_name: String,
    pub(crate) period: MonthYear,
    #[serde(flatten)]
    pub(crate) summary: Summary,
    pub(crate) processed_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl Document {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn source_id(&self) -> i64 {
        self.source_id
    }

    pub fn sheet_id(&self) -> &str {
        &self.sheet_id
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    pub fn period(&self) -> MonthYear {
        self.period
    }

    pub fn year(&self) -> i32 {
        self.period.year()
    }

    pub fn month(&self) -> Month {
        self.period.month()
    }

    pub fn month_name(&self) -> &'static str {
        self.period.month().name()
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn net_income(&self) -> Amount {
        self.summary.net_income()
    }

    pub fn processed_at(&self) -> DateTime<Utc> {
        self.processed_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The file name used when the CSV of this document is downloaded.
    pub fn csv_file_name(&self) -> String {
        csv_file_name(&self.owner, self.period)
    }
}

/// `<owner>_<year>_<MM>.csv`
pub fn csv_file_name(owner: &str, period: MonthYear) -> String {
    format!(
        "{owner}_{}_{:02}.csv",
        period.year(),
        period.month().number()
    )
}

/// Builds the CSV export of a parsed sheet.
///
/// Columns are `name,amount,description,category,expense/income`. Expenses come first, then
/// income. `name` repeats the description because the sheets have no separate name column.
pub fn build_csv(sheet: &BudgetSheet) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(["name", "amount", "description", "category", "expense/income"])
        .context("Unable to write the CSV header")?;
    for (kind, entry) in sheet.entries() {
        let amount = entry.amount().to_string();
        let kind = kind.to_string();
        writer
            .write_record([
                entry.description(),
                amount.as_str(),
                entry.description(),
                entry.category(),
                kind.as_str(),
            ])
            .context("Unable to write a CSV row")?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Unable to finish writing the CSV: {e}"))?;
    String::from_utf8(bytes).context("The generated CSV was not valid UTF-8")
}
