use super::{parse_timestamp, timestamp, Db};
use crate::model::{
    Amount, BudgetSheet, Document, DocumentSource, Month, MonthYear, Summary, Transaction,
    TransactionType,
};
use crate::Result;
use anyhow::Context;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;
use tracing::debug;

/// Documents per page when listing.
pub(crate) const PAGE_SIZE: u32 = 10;

const SELECT_DOCUMENT: &str = "SELECT id, owner, source_id, sheet_id, sheet_name, year, month, \
    total_expenses, total_income, expenses_count, income_count, processed_at, updated_at \
    FROM documents";

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: i64,
    owner: String,
    source_id: i64,
    sheet_id: String,
    sheet_name: String,
    year: i32,
    month: u32,
    total_expenses: String,
    total_income: String,
    expenses_count: u32,
    income_count: u32,
    processed_at: String,
    updated_at: String,
}

impl TryFrom<DocumentRow> for Document {
    type Error = crate::Error;

    fn try_from(row: DocumentRow) -> Result<Self> {
        Ok(Document {
            id: row.id,
            owner: row.owner,
            source_id: row.source_id,
            sheet_id: row.sheet_id,
            sheet_name: row.sheet_name,
            period: MonthYear::from_numbers(row.year, row.month)?,
            summary: Summary {
                total_expenses: parse_amount(&row.total_expenses)?,
                total_income: parse_amount(&row.total_income)?,
                expenses_count: row.expenses_count,
                income_count: row.income_count,
            },
            processed_at: parse_timestamp(&row.processed_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    document_id: i64,
    transaction_type: String,
    date: String,
    amount: String,
    description: String,
    category: String,
    created_at: String,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = crate::Error;

    fn try_from(row: TransactionRow) -> Result<Self> {
        Ok(Transaction {
            id: row.id,
            document_id: row.document_id,
            transaction_type: TransactionType::from_str(&row.transaction_type).with_context(
                || format!("Invalid transaction type '{}'", row.transaction_type),
            )?,
            date: row.date,
            amount: parse_amount(&row.amount)?,
            description: row.description,
            category: row.category,
            created_at: parse_timestamp(&row.created_at)?,
        })
    }
}

fn parse_amount(s: &str) -> Result<Amount> {
    Amount::from_str(s).with_context(|| format!("Invalid amount '{s}' in the database"))
}

/// A parsed sheet ready to be stored.
#[derive(Debug, Clone)]
pub(crate) struct NewDocument<'a> {
    pub(crate) source: &'a DocumentSource,
    pub(crate) sheet_id: &'a str,
    pub(crate) sheet_name: &'a str,
    pub(crate) period: MonthYear,
    pub(crate) sheet: &'a BudgetSheet,
    pub(crate) csv: String,
}

/// Filters and paging for listing documents.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub(crate) struct DocumentQuery {
    pub(crate) owner: String,
    pub(crate) year: Option<i32>,
    pub(crate) month: Option<Month>,
    /// Matched against the sheet name, month number and year.
    pub(crate) search: Option<String>,
    /// One-based. Values below 1 are treated as 1.
    pub(crate) page: u32,
}

/// One page of documents.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DocumentPage {
    pub documents: Vec<Document>,
    pub page: u32,
    pub pages: u32,
    pub total: u64,
    /// Every year that has at least one document, newest first.
    pub years: Vec<i32>,
}

fn push_filters<'a>(qb: &mut QueryBuilder<'a, Sqlite>, query: &'a DocumentQuery) {
    qb.push(" WHERE owner = ").push_bind(query.owner.as_str());
    if let Some(year) = query.year {
        qb.push(" AND year = ").push_bind(year);
    }
    if let Some(month) = query.month {
        qb.push(" AND month = ").push_bind(month.number());
    }
    if let Some(search) = query.search.as_deref().map(str::trim) {
        if !search.is_empty() {
            let pattern = format!("%{search}%");
            qb.push(" AND (sheet_name LIKE ")
                .push_bind(pattern.clone())
                .push(" OR CAST(month AS TEXT) LIKE ")
                .push_bind(pattern.clone())
                .push(" OR CAST(year AS TEXT) LIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }
}

impl Db {
    /// The document recorded for `owner` in `period`, if any.
    pub(crate) async fn find_document(
        &self,
        owner: &str,
        period: MonthYear,
    ) -> Result<Option<Document>> {
        let row: Option<DocumentRow> = sqlx::query_as(&format!(
            "{SELECT_DOCUMENT} WHERE owner = ? AND year = ? AND month = ?"
        ))
        .bind(owner)
        .bind(period.year())
        .bind(period.month().number())
        .fetch_optional(self.pool())
        .await
        .context("Unable to query documents")?;
        row.map(Document::try_from).transpose()
    }

    pub(crate) async fn document(&self, owner: &str, id: i64) -> Result<Option<Document>> {
        let row: Option<DocumentRow> =
            sqlx::query_as(&format!("{SELECT_DOCUMENT} WHERE owner = ? AND id = ?"))
                .bind(owner)
                .bind(id)
                .fetch_optional(self.pool())
                .await
                .context("Unable to query documents")?;
        row.map(Document::try_from).transpose()
    }

    /// Stores a parsed sheet as the document of its owner and period together with its
    /// transactions. An existing document for the same period is overwritten and its old
    /// transactions are deleted. Everything happens in one database transaction.
    pub(crate) async fn save_document(&self, new: NewDocument<'_>) -> Result<Document> {
        let owner = new.source.owner();
        let summary = Summary::of(new.sheet);
        let now = timestamp(Utc::now());

        let mut tx = self
            .pool()
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM documents WHERE owner = ? AND year = ? AND month = ?")
                .bind(owner)
                .bind(new.period.year())
                .bind(new.period.month().number())
                .fetch_optional(&mut *tx)
                .await
                .context("Unable to query documents")?;

        let document_id = match existing {
            Some((id,)) => {
                debug!("Replacing document {id} for {}", new.period);
                sqlx::query(
                    "UPDATE documents SET source_id = ?, sheet_id = ?, sheet_name = ?, csv = ?, \
                    total_expenses = ?, total_income = ?, expenses_count = ?, income_count = ?, \
                    updated_at = ? WHERE id = ?",
                )
                .bind(new.source.id())
                .bind(new.sheet_id)
                .bind(new.sheet_name)
                .bind(&new.csv)
                .bind(summary.total_expenses().to_string())
                .bind(summary.total_income().to_string())
                .bind(summary.expenses_count())
                .bind(summary.income_count())
                .bind(&now)
                .bind(id)
                .execute(&mut *tx)
                .await
                .context("Unable to update the document")?;
                sqlx::query("DELETE FROM transactions WHERE document_id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Unable to delete the old transactions")?;
                id
            }
            None => {
                let result = sqlx::query(
                    "INSERT INTO documents (owner, source_id, sheet_id, sheet_name, year, month, \
                    csv, total_expenses, total_income, expenses_count, income_count, \
                    processed_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(owner)
                .bind(new.source.id())
                .bind(new.sheet_id)
                .bind(new.sheet_name)
                .bind(new.period.year())
                .bind(new.period.month().number())
                .bind(&new.csv)
                .bind(summary.total_expenses().to_string())
                .bind(summary.total_income().to_string())
                .bind(summary.expenses_count())
                .bind(summary.income_count())
                .bind(&now)
                .bind(&now)
                .execute(&mut *tx)
                .await
                .context("Unable to insert the document")?;
                result.last_insert_rowid()
            }
        };

        for (kind, entry) in new.sheet.entries() {
            sqlx::query(
                "INSERT INTO transactions \
                (document_id, transaction_type, date, amount, description, category, created_at) \
                VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(document_id)
            .bind(kind.to_string())
            .bind(entry.date())
            .bind(entry.amount().to_string())
            .bind(entry.description())
            .bind(entry.category())
            .bind(&now)
            .execute(&mut *tx)
            .await
            .context("Unable to insert a transaction")?;
        }

        tx.commit()
            .await
            .context("Failed to commit the document")?;

        self.document(owner, document_id)
            .await?
            .context("The document disappeared after it was saved")
    }

    /// Lists documents newest first, filtered and paged by `query`.
    pub(crate) async fn list_documents(&self, query: &DocumentQuery) -> Result<DocumentPage> {
        let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM documents");
        push_filters(&mut count_qb, query);
        let (total,): (i64,) = count_qb
            .build_query_as()
            .fetch_one(self.pool())
            .await
            .context("Unable to count documents")?;
        let total = total.max(0) as u64;

        let pages = (total.div_ceil(PAGE_SIZE as u64) as u32).max(1);
        let page = query.page.clamp(1, pages);
        let offset = (page - 1) * PAGE_SIZE;

        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_DOCUMENT);
        push_filters(&mut qb, query);
        qb.push(" ORDER BY year DESC, month DESC LIMIT ")
            .push_bind(PAGE_SIZE)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows: Vec<DocumentRow> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .context("Unable to list documents")?;
        let documents = rows
            .into_iter()
            .map(Document::try_from)
            .collect::<Result<Vec<_>>>()?;

        let years: Vec<(i32,)> = sqlx::query_as(
            "SELECT DISTINCT year FROM documents WHERE owner = ? ORDER BY year DESC",
        )
        .bind(&query.owner)
        .fetch_all(self.pool())
        .await
        .context("Unable to list document years")?;

        Ok(DocumentPage {
            documents,
            page,
            pages,
            total,
            years: years.into_iter().map(|(y,)| y).collect(),
        })
    }

    /// Documents of `owner` in the optional year and month, newest first.
    pub(crate) async fn documents_for_period(
        &self,
        owner: &str,
        year: Option<i32>,
        month: Option<Month>,
    ) -> Result<Vec<Document>> {
        let query = DocumentQuery {
            owner: owner.to_string(),
            year,
            month,
            ..DocumentQuery::default()
        };
        let mut qb = QueryBuilder::<Sqlite>::new(SELECT_DOCUMENT);
        push_filters(&mut qb, &query);
        qb.push(" ORDER BY year DESC, month DESC");
        let rows: Vec<DocumentRow> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .context("Unable to list documents")?;
        rows.into_iter().map(Document::try_from).collect()
    }

    /// The `limit` most recent documents of `owner`.
    pub(crate) async fn recent_documents(&self, owner: &str, limit: u32) -> Result<Vec<Document>> {
        let rows: Vec<DocumentRow> = sqlx::query_as(&format!(
            "{SELECT_DOCUMENT} WHERE owner = ? ORDER BY year DESC, month DESC LIMIT ?"
        ))
        .bind(owner)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .context("Unable to list recent documents")?;
        rows.into_iter().map(Document::try_from).collect()
    }

    pub(crate) async fn count_documents(&self, owner: &str) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents WHERE owner = ?")
            .bind(owner)
            .fetch_one(self.pool())
            .await
            .context("Unable to count documents")?;
        Ok(count.max(0) as u64)
    }

    /// The transactions of one document, expenses first, in sheet order.
    pub(crate) async fn transactions(
        &self,
        document_id: i64,
        kind: Option<TransactionType>,
    ) -> Result<Vec<Transaction>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, document_id, transaction_type, date, amount, description, category, \
            created_at FROM transactions WHERE document_id = ",
        );
        qb.push_bind(document_id);
        if let Some(kind) = kind {
            qb.push(" AND transaction_type = ").push_bind(kind.to_string());
        }
        qb.push(" ORDER BY CASE transaction_type WHEN 'expense' THEN 0 ELSE 1 END, id");
        let rows: Vec<TransactionRow> = qb
            .build_query_as()
            .fetch_all(self.pool())
            .await
            .context("Unable to list transactions")?;
        rows.into_iter().map(Transaction::try_from).collect()
    }

    /// The stored CSV text of a document.
    pub(crate) async fn document_csv(&self, owner: &str, id: i64) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT csv FROM documents WHERE owner = ? AND id = ?")
                .bind(owner)
                .bind(id)
                .fetch_optional(self.pool())
                .await
                .context("Unable to read the document CSV")?;
        Ok(row.map(|(csv,)| csv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{build_csv, Entry, NewSource, SourceType};
    use crate::test::TestEnv;
    use std::path::PathBuf;

    fn amount(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    fn sheet(expense: &str) -> BudgetSheet {
        BudgetSheet::new(
            vec![
                Entry::new("1/8/2025", amount(expense), "Snacks", "Food"),
                Entry::new("2/8/2025", amount("2500"), "Bus", ""),
            ],
            vec![Entry::new("1/8/2025", amount("500000"), "Paycheck", "Salary")],
        )
    }

    async fn source(db: &Db) -> DocumentSource {
        db.add_source(
            &NewSource::new(
                "tester",
                "Personal",
                SourceType::GoogleDrive,
                "folder",
                Some(PathBuf::from("sa.json")),
                None,
            )
            .unwrap(),
        )
        .await
        .unwrap()
    }

    async fn save(
        db: &Db,
        source: &DocumentSource,
        sheet_id: &str,
        period: MonthYear,
        sheet: &BudgetSheet,
    ) -> Document {
        db.save_document(NewDocument {
            source,
            sheet_id,
            sheet_name: "Monthly budget",
            period,
            sheet,
            csv: build_csv(sheet).unwrap(),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_document_with_transactions() {
        let env = TestEnv::new().await;
        let db = env.config().db().clone();
        let source = source(&db).await;
        let period = MonthYear::new(2025, Month::August);
        let doc = save(&db, &source, "sheet-1", period, &sheet("15000")).await;

        assert_eq!(doc.period(), period);
        assert_eq!(doc.summary().total_expenses(), amount("17500"));
        assert_eq!(doc.summary().total_income(), amount("500000"));
        assert_eq!(doc.summary().expenses_count(), 2);
        assert_eq!(doc.summary().income_count(), 1);

        let transactions = db.transactions(doc.id(), None).await.unwrap();
        assert_eq!(transactions.len(), 3);
        assert_eq!(transactions[0].description(), "Snacks");
        assert_eq!(transactions[2].transaction_type(), TransactionType::Income);

        let income = db
            .transactions(doc.id(), Some(TransactionType::Income))
            .await
            .unwrap();
        assert_eq!(income.len(), 1);

        let csv = db.document_csv("tester", doc.id()).await.unwrap().unwrap();
        assert!(csv.starts_with("name,amount,description,category,expense/income"));
        assert!(db.document_csv("other", doc.id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_document_replaces_same_period() {
        let env = TestEnv::new().await;
        let db = env.config().db().clone();
        let source = source(&db).await;
        let period = MonthYear::new(2025, Month::August);
        let first = save(&db, &source, "sheet-1", period, &sheet("15000")).await;
        let second = save(&db, &source, "sheet-2", period, &sheet("1000")).await;

        assert_eq!(first.id(), second.id());
        assert_eq!(second.sheet_id(), "sheet-2");
        assert_eq!(second.summary().total_expenses(), amount("3500"));
        assert_eq!(db.count_documents("tester").await.unwrap(), 1);
        assert_eq!(db.transactions(second.id(), None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_list_documents_filters_and_pages() {
        let env = TestEnv::new().await;
        let db = env.config().db().clone();
        let source = source(&db).await;
        let s = sheet("15000");
        for month in Month::all() {
            save(&db, &source, "x", MonthYear::new(2024, *month), &s).await;
        }
        save(&db, &source, "y", MonthYear::new(2025, Month::January), &s).await;

        let mut query = DocumentQuery {
            owner: "tester".into(),
            page: 1,
            ..DocumentQuery::default()
        };
        let page = db.list_documents(&query).await.unwrap();
        assert_eq!(page.total, 13);
        assert_eq!(page.pages, 2);
        assert_eq!(page.documents.len(), 10);
        assert_eq!(page.documents[0].period(), MonthYear::new(2025, Month::January));
        assert_eq!(page.documents[1].period(), MonthYear::new(2024, Month::December));
        assert_eq!(page.years, vec![2025, 2024]);

        query.page = 5;
        let page = db.list_documents(&query).await.unwrap();
        assert_eq!(page.page, 2);
        assert_eq!(page.documents.len(), 3);

        query.page = 1;
        query.year = Some(2024);
        query.month = Some(Month::March);
        let page = db.list_documents(&query).await.unwrap();
        assert_eq!(page.total, 1);

        let query = DocumentQuery {
            owner: "tester".into(),
            search: Some("2025".into()),
            page: 1,
            ..DocumentQuery::default()
        };
        assert_eq!(db.list_documents(&query).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_removing_source_removes_documents() {
        let env = TestEnv::new().await;
        let db = env.config().db().clone();
        let source = source(&db).await;
        let doc = save(
            &db,
            &source,
            "sheet-1",
            MonthYear::new(2025, Month::August),
            &sheet("15000"),
        )
        .await;
        assert!(db.remove_source("tester", "Personal").await.unwrap());
        assert_eq!(db.count_documents("tester").await.unwrap(), 0);
        assert!(db.transactions(doc.id(), None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recent_documents() {
        let env = TestEnv::new().await;
        let db = env.config().db().clone();
        let source = source(&db).await;
        let s = sheet("15000");
        for month in Month::all() {
            save(&db, &source, "x", MonthYear::new(2025, *month), &s).await;
        }
        let recent = db.recent_documents("tester", 6).await.unwrap();
        assert_eq!(recent.len(), 6);
        assert_eq!(recent[0].month(), Month::December);
        assert_eq!(recent[5].month(), Month::July);
    }
}
