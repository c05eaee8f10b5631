//! Types that represent the core data model, such as `Document` and `Transaction`.
mod amount;
mod budget_sheet;
mod document;
mod month;
mod source;
mod transaction;

pub use amount::{Amount, CurrencyFormat};
pub use budget_sheet::BudgetSheet;
pub use document::{build_csv, Document, Summary};
pub use month::{Month, MonthYear};
pub use source::{extract_folder_id, DocumentSource, NewSource, SourceType};
#[cfg(test)]
pub(crate) use source::DEFAULT_NAME_PATTERN;
pub use transaction::{Entry, Transaction, TransactionType};
