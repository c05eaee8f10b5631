mod api;
pub mod args;
mod backup;
pub mod commands;
mod config;
mod db;
mod error;
mod mcp;
mod model;
mod service;
#[cfg(test)]
mod test;
mod utils;

pub use api::Mode;
pub use config::Config;
pub use error::{error_type, Error, ErrorType, Result};
pub use model::{
    Amount, CurrencyFormat, Document, DocumentSource, Month, MonthYear, SourceType, Transaction,
    TransactionType,
};
pub use service::{
    Analysis, CategoryBreakdown, Dashboard, DocumentTotals, FailedSheet, FailedSource,
    ProcessedSheet, SkipReason, SkippedSheet, SyncAllReport, SyncReport,
};
