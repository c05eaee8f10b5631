//! Handlers for `lumos documents list|show|download`.

use crate::args::{DocumentDownloadArgs, DocumentShowArgs, DocumentsListArgs};
use crate::commands::{month, plural, Out};
use crate::db::{DocumentPage, DocumentQuery};
use crate::error::{ErrorType, IntoResult};
use crate::model::{CurrencyFormat, Document, Transaction};
use crate::service::{document_totals, DocumentTotals};
use crate::{utils, Config, Result};
use anyhow::anyhow;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// A document together with totals recomputed from its transactions.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentDetail {
    pub document: Document,
    pub totals: DocumentTotals,
    /// Present when requested.
    pub transactions: Option<Vec<Transaction>>,
}

/// The CSV export of one document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentCsv {
    pub file_name: String,
    pub csv: String,
    /// Where the CSV was written, `None` when it went to stdout or was only returned.
    pub path: Option<PathBuf>,
}

pub async fn documents_list(
    config: Config,
    args: DocumentsListArgs,
) -> Result<Out<DocumentPage>> {
    let month = args.month().map(month).transpose()?;
    let query = DocumentQuery {
        owner: config.owner().to_string(),
        year: args.year(),
        month,
        search: args.search().map(str::to_string),
        page: args.page(),
    };
    let page = config
        .db()
        .list_documents(&query)
        .await
        .pub_result(ErrorType::Database)?;

    let mut message = format!(
        "Page {} of {} ({} document{})",
        page.page,
        page.pages,
        page.total,
        plural(page.total as usize)
    );
    for document in &page.documents {
        message.push_str(&format!("\n  {}", line(config.currency(), document)));
    }
    Ok(Out::new(message, page))
}

pub async fn documents_show(
    config: Config,
    args: DocumentShowArgs,
) -> Result<Out<DocumentDetail>> {
    let document = find(&config, args.id()).await?;
    let totals = document_totals(config.db(), config.owner(), document.id())
        .await
        .pub_result(ErrorType::Database)?;
    let transactions = if args.transactions() {
        Some(
            config
                .db()
                .transactions(document.id(), None)
                .await
                .pub_result(ErrorType::Database)?,
        )
    } else {
        None
    };

    let currency = config.currency();
    let mut message = line(currency, &document);
    message.push_str(&format!(
        "\n  {} expense{}, {} income row{}, net {}",
        totals.expenses_count,
        plural(totals.expenses_count as usize),
        totals.income_count,
        plural(totals.income_count as usize),
        currency.display(document.net_income())
    ));
    if let Some(transactions) = &transactions {
        for t in transactions {
            message.push_str(&format!(
                "\n  {:<7} {:<12} {:>16}  {} [{}]",
                t.transaction_type().to_string(),
                t.date(),
                currency.display(t.amount()),
                t.description(),
                t.category_or_uncategorized()
            ));
        }
    }

    Ok(Out::new(
        message,
        DocumentDetail {
            document,
            totals,
            transactions,
        },
    ))
}

/// Returns the CSV of a document without writing it anywhere.
pub async fn document_csv(config: &Config, id: i64) -> Result<Out<DocumentCsv>> {
    let exported = export(config, id).await?;
    Ok(Out::new(
        format!("CSV of document {id} ({})", exported.file_name),
        exported,
    ))
}

/// Writes the CSV of a document. A directory as output receives a file named after the owner and
/// period, `-` prints the CSV to stdout and no output means the current directory.
pub async fn documents_download(
    config: Config,
    args: DocumentDownloadArgs,
) -> Result<Out<DocumentCsv>> {
    let mut exported = export(&config, args.id()).await?;

    let output = args.output().unwrap_or(Path::new("."));
    if output == Path::new("-") {
        print!("{}", exported.csv);
        return Ok(Out::new(
            format!("Wrote {} to stdout", exported.file_name),
            exported,
        ));
    }

    let path = if output.is_dir() {
        output.join(&exported.file_name)
    } else {
        output.to_path_buf()
    };
    utils::write(&path, &exported.csv)
        .await
        .pub_result(ErrorType::Request)?;
    exported.path = Some(path.clone());
    Ok(Out::new(format!("Wrote '{}'", path.display()), exported))
}

async fn export(config: &Config, id: i64) -> Result<DocumentCsv> {
    let document = find(config, id).await?;
    let csv = config
        .db()
        .document_csv(config.owner(), id)
        .await
        .pub_result(ErrorType::Database)?
        .ok_or_else(|| not_found(id))
        .pub_result(ErrorType::Request)?;
    Ok(DocumentCsv {
        file_name: document.csv_file_name(),
        csv,
        path: None,
    })
}

async fn find(config: &Config, id: i64) -> Result<Document> {
    config
        .db()
        .document(config.owner(), id)
        .await
        .pub_result(ErrorType::Database)?
        .ok_or_else(|| not_found(id))
        .pub_result(ErrorType::Request)
}

fn not_found(id: i64) -> anyhow::Error {
    anyhow!("There is no document with ID {id}")
}

/// One line describing a document, e.g. `#3 August 2025 'Monthly budget Aug 2025' ...`.
fn line(currency: &CurrencyFormat, document: &Document) -> String {
    format!(
        "#{} {} {} '{}' income {} expenses {}",
        document.id(),
        document.month_name(),
        document.year(),
        document.sheet_name(),
        currency.display(document.summary().total_income()),
        currency.display(document.summary().total_expenses()),
    )
}
