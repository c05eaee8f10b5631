//! Parses the Transactions tab of a monthly budget spreadsheet.
//!
//! The tab is semi-structured. Somewhere in the grid there is an `Expenses` title with a
//! `Date | Amount | Description | Category` header row below it, and an `Income` title with the same
//! header row below that. The two sections usually sit side by side:
//!
//! ```text
//!     |  B        | C        | D           | E        | F |  G        | H         | I           | J
//!  2  |  Expenses |          |             |          |   |  Income   |           |             |
//!  4  |  Date     | Amount   | Description | Category |   |  Date     | Amount    | Description | Category
//!  5  |  1/8/2025 | Rp15.000 | Snacks      | Food     |   |  2/8/2025 | Rp500.000 | Paycheck    | Paycheck
//! ```
//!
//! but nothing here depends on that exact placement.

use crate::model::{CurrencyFormat, Entry, TransactionType};
use crate::Result;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

const HEADERS: [&str; 4] = ["date", "amount", "description", "category"];

/// The expenses and income parsed from one Transactions tab.
#[derive(Default, Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BudgetSheet {
    expenses: Vec<Entry>,
    income: Vec<Entry>,
}

/// A `Date | Amount | Description | Category` header found in the grid.
#[derive(Debug, Clone, Copy)]
struct Section {
    kind: TransactionType,
    header_row: usize,
    col: usize,
    /// The row index (exclusive) where the data of this section stops.
    end_row: usize,
}

impl BudgetSheet {
    pub fn new(expenses: Vec<Entry>, income: Vec<Entry>) -> Self {
        Self { expenses, income }
    }

    /// Parses the raw cell grid of a Transactions tab, reading amounts with `format`.
    ///
    /// # Errors
    /// - There is neither an Expenses nor an Income section.
    /// - An amount cannot be parsed.
    pub fn parse<S, R>(grid: impl IntoIterator<Item = R>, format: &CurrencyFormat) -> Result<Self>
    where
        S: Into<String>,
        R: IntoIterator<Item = S>,
    {
        let rows: Vec<Vec<String>> = grid
            .into_iter()
            .map(|row| row.into_iter().map(|s| s.into().trim().to_string()).collect())
            .collect();

        let sections = find_sections(&rows);
        if sections.is_empty() {
            bail!("No Expenses or Income section was found in the Transactions tab");
        }

        let mut sheet = BudgetSheet::default();
        for section in sections {
            debug!(
                "Reading {} section at {}{}",
                section.kind,
                column_name(section.col),
                section.header_row + 1
            );
            for row_ix in (section.header_row + 1)..section.end_row {
                let Some(entry) = read_entry(&rows[row_ix], row_ix, section.col, format)? else {
                    continue;
                };
                match section.kind {
                    TransactionType::Expense => sheet.expenses.push(entry),
                    TransactionType::Income => sheet.income.push(entry),
                }
            }
        }
        Ok(sheet)
    }

    pub fn expenses(&self) -> &[Entry] {
        &self.expenses
    }

    pub fn income(&self) -> &[Entry] {
        &self.income
    }

    /// All entries with their type, expenses first.
    pub fn entries(&self) -> impl Iterator<Item = (TransactionType, &Entry)> {
        self.expenses
            .iter()
            .map(|e| (TransactionType::Expense, e))
            .chain(self.income.iter().map(|e| (TransactionType::Income, e)))
    }
}

fn cell(row: &[String], col: usize) -> &str {
    row.get(col).map(String::as_str).unwrap_or("")
}

fn is_header_at(row: &[String], col: usize) -> bool {
    HEADERS
        .iter()
        .enumerate()
        .all(|(offset, h)| cell(row, col + offset).eq_ignore_ascii_case(h))
}

/// Looks upward from the header row for the nearest `Expenses` or `Income` title above it.
fn section_kind(rows: &[Vec<String>], header_row: usize, col: usize) -> Option<TransactionType> {
    for row in rows[..header_row].iter().rev() {
        for c in col..col + HEADERS.len() {
            match cell(row, c).to_lowercase().as_str() {
                "expenses" | "expense" => return Some(TransactionType::Expense),
                "income" => return Some(TransactionType::Income),
                _ => {}
            }
        }
    }
    None
}

fn find_sections(rows: &[Vec<String>]) -> Vec<Section> {
    let mut headers: Vec<(usize, usize)> = Vec::new();
    for (row_ix, row) in rows.iter().enumerate() {
        for col in 0..row.len() {
            if is_header_at(row, col) {
                headers.push((row_ix, col));
            }
        }
    }

    let mut sections = Vec::new();
    for &(header_row, col) in &headers {
        let Some(kind) = section_kind(rows, header_row, col) else {
            trace!(
                "Ignoring a header at {}{} without an Expenses or Income title",
                column_name(col),
                header_row + 1
            );
            continue;
        };
        // a later header in the same columns starts a new block
        let end_row = headers
            .iter()
            .filter(|(r, c)| *c == col && *r > header_row)
            .map(|(r, _)| *r)
            .min()
            .unwrap_or(rows.len());
        sections.push(Section {
            kind,
            header_row,
            col,
            end_row,
        });
    }
    sections
}

fn read_entry(
    row: &[String],
    row_ix: usize,
    col: usize,
    format: &CurrencyFormat,
) -> Result<Option<Entry>> {
    let date = cell(row, col);
    let amount = cell(row, col + 1);
    let description = cell(row, col + 2);
    let category = cell(row, col + 3);

    if amount.is_empty() && description.is_empty() {
        if !date.is_empty() || !category.is_empty() {
            debug!(
                "Skipping row {} at {}: it has neither amount nor description",
                row_ix + 1,
                column_name(col)
            );
        }
        return Ok(None);
    }
    if amount.is_empty() {
        bail!(
            "The amount of '{description}' in cell {}{} is missing",
            column_name(col + 1),
            row_ix + 1
        );
    }

    let amount = format.parse(amount).with_context(|| {
        format!(
            "Unable to parse the amount in cell {}{}",
            column_name(col + 1),
            row_ix + 1
        )
    })?;
    Ok(Some(Entry::new(date, amount, description, category)))
}

/// Converts a zero-based column index into its A1 name, e.g. `0` -> `A`, `27` -> `AB`.
pub(crate) fn column_name(col: usize) -> String {
    let mut n = col + 1;
    let mut name = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        name.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}
