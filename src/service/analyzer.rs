//! Read-only aggregations over the stored documents and transactions.

use crate::db::Db;
use crate::model::{Amount, Document, DocumentSource, Month, TransactionType};
use crate::Result;
use anyhow::anyhow;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// The number of documents shown on the dashboard.
pub const DASHBOARD_DOCUMENTS: u32 = 6;

/// Narrows an analysis to one owner and optionally to a year and month.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct AnalysisFilter {
    pub owner: String,
    pub year: Option<i32>,
    pub month: Option<Month>,
}

impl AnalysisFilter {
    pub fn new(owner: impl Into<String>, year: Option<i32>, month: Option<Month>) -> Self {
        Self {
            owner: owner.into(),
            year,
            month,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CategoryBreakdown {
    pub category: String,
    pub total: Amount,
    pub count: u32,
    pub average: Amount,
}

/// Income or expense figures over the documents matching an `AnalysisFilter`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Analysis {
    pub kind: TransactionType,
    pub total: Amount,
    pub document_count: u32,
    /// Per document. Zero when there are no documents.
    pub average: Amount,
    /// Sorted by descending total, then by category name.
    pub categories: Vec<CategoryBreakdown>,
    /// Newest first.
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Dashboard {
    pub recent_documents: Vec<Document>,
    pub active_sources: Vec<DocumentSource>,
    pub total_documents: u64,
    /// Totals across `recent_documents`.
    pub total_income: Amount,
    pub total_expenses: Amount,
    pub net_income: Amount,
}

/// Totals recomputed from the transactions of one document.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DocumentTotals {
    pub total_expenses: Amount,
    pub total_income: Amount,
    pub expenses_count: u32,
    pub income_count: u32,
}

pub(crate) async fn income_analysis(db: &Db, filter: &AnalysisFilter) -> Result<Analysis> {
    analyze(db, filter, TransactionType::Income).await
}

pub(crate) async fn expense_analysis(db: &Db, filter: &AnalysisFilter) -> Result<Analysis> {
    analyze(db, filter, TransactionType::Expense).await
}

async fn analyze(db: &Db, filter: &AnalysisFilter, kind: TransactionType) -> Result<Analysis> {
    let documents = db
        .documents_for_period(&filter.owner, filter.year, filter.month)
        .await?;

    let total: Amount = documents
        .iter()
        .map(|d| match kind {
            TransactionType::Expense => d.summary().total_expenses(),
            TransactionType::Income => d.summary().total_income(),
        })
        .sum();

    let mut by_category: BTreeMap<String, (Amount, u32)> = BTreeMap::new();
    for document in &documents {
        for t in db.transactions(document.id(), Some(kind)).await? {
            let entry = by_category
                .entry(t.category_or_uncategorized().to_string())
                .or_insert((Amount::ZERO, 0));
            entry.0 += t.amount();
            entry.1 += 1;
        }
    }
    let mut categories: Vec<CategoryBreakdown> = by_category
        .into_iter()
        .map(|(category, (total, count))| CategoryBreakdown {
            category,
            total,
            count,
            average: average(total, count),
        })
        .collect();
    categories.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.category.cmp(&b.category)));

    let document_count = documents.len() as u32;
    Ok(Analysis {
        kind,
        total,
        document_count,
        average: average(total, document_count),
        categories,
        documents,
    })
}

pub(crate) async fn dashboard(db: &Db, owner: &str) -> Result<Dashboard> {
    let recent_documents = db.recent_documents(owner, DASHBOARD_DOCUMENTS).await?;
    let active_sources = db.list_sources(owner, true).await?;
    let total_documents = db.count_documents(owner).await?;
    let total_income: Amount = recent_documents
        .iter()
        .map(|d| d.summary().total_income())
        .sum();
    let total_expenses: Amount = recent_documents
        .iter()
        .map(|d| d.summary().total_expenses())
        .sum();
    Ok(Dashboard {
        recent_documents,
        active_sources,
        total_documents,
        total_income,
        total_expenses,
        net_income: total_income - total_expenses,
    })
}

pub(crate) async fn document_totals(
    db: &Db,
    owner: &str,
    document_id: i64,
) -> Result<DocumentTotals> {
    if db.document(owner, document_id).await?.is_none() {
        return Err(anyhow!("Document {document_id} was not found"));
    }
    let mut totals = DocumentTotals::default();
    for t in db.transactions(document_id, None).await? {
        match t.transaction_type() {
            TransactionType::Expense => {
                totals.total_expenses += t.amount();
                totals.expenses_count += 1;
            }
            TransactionType::Income => {
                totals.total_income += t.amount();
                totals.income_count += 1;
            }
        }
    }
    Ok(totals)
}

fn average(total: Amount, count: u32) -> Amount {
    if count == 0 {
        return Amount::ZERO;
    }
    Amount::new((total.value() / Decimal::from(count)).round_dp(2))
}
