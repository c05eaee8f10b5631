//! Ingestion and analysis on top of the database and the `Drive` backends.

mod analyzer;
mod sync;

pub(crate) use analyzer::{dashboard, document_totals, expense_analysis, income_analysis};
pub use analyzer::{
    Analysis, AnalysisFilter, CategoryBreakdown, Dashboard, DocumentTotals,
};
pub(crate) use sync::{sync_all, sync_source};
pub use sync::{
    FailedSheet, FailedSource, ProcessedSheet, SkipReason, SkippedSheet, SyncAllReport,
    SyncOptions, SyncReport,
};
