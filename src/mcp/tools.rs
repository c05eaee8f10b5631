//! The tools of the lumos MCP server. Each tool calls the command handler of the matching CLI
//! subcommand.

use crate::args::{DocumentShowArgs, DocumentsListArgs, PeriodArgs, SourceListArgs, SyncArgs};
use crate::commands;
use crate::mcp::output::tool_result;
use crate::mcp::LumosServer;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::ErrorData as McpError;
use rmcp::{tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

/// Parameters for the get_document_csv tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(title = "DocumentCsvParams")]
pub struct DocumentCsvParams {
    /// The ID of the document, as returned by `list_documents`.
    pub id: i64,
}

#[tool_router(vis = "pub(super)")]
impl LumosServer {
    #[tool]
    /// Initialize the lumos MCP service for this session and return usage instructions. You
    /// **MUST** call this **ONCE** before using other tools so that you have the full usage
    /// instructions. You **MAY** call it more than once if you have forgotten the usage
    /// instructions.
    async fn initialize_service(&self) -> Result<CallToolResult, McpError> {
        let mut initialized = self.initialized.lock().await;
        *initialized = true;
        Ok(CallToolResult::success(vec![rmcp::model::Content::text(
            include_str!("docs/INSTRUCTIONS.md"),
        )]))
    }

    /// Import new monthly budget spreadsheets from Google Drive into the local database. Creates
    /// a backup of the database first.
    ///
    /// # Behavior
    ///
    /// - Every active source is synced unless `source` names one.
    /// - Spreadsheets whose names have no month and year are skipped.
    /// - A spreadsheet already imported for its month is skipped unless `force` is true.
    /// - A different spreadsheet for an already imported month replaces that month's data.
    /// - A spreadsheet that cannot be read or parsed is reported as failed and the sync goes on.
    ///
    /// # Returns
    ///
    /// A summary message and a JSON report listing the processed, skipped and failed
    /// spreadsheets of each source.
    #[tool]
    async fn sync(
        &self,
        Parameters(args): Parameters<SyncArgs>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!(
            "MCP: sync called with source={:?}, force={}",
            args.source(),
            args.force()
        );
        let config = (*self.config).clone();
        let out = commands::sync(config, self.mode, args).await;
        tool_result(out)
    }

    /// List the configured sources: Google Drive folders that monthly budgets are imported from.
    /// Set `active` to only list sources that are synced.
    #[tool]
    async fn list_sources(
        &self,
        Parameters(args): Parameters<SourceListArgs>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        let config = (*self.config).clone();
        let out = commands::source_list(config, args).await;
        tool_result(out)
    }

    /// List imported monthly budgets, newest first, ten per page.
    ///
    /// # Parameters
    ///
    /// - `year`, `month`: Optional filters. `month` is 1 through 12.
    /// - `search`: Optional text matched against the spreadsheet name, the month number and the
    ///   year.
    /// - `page`: The page to return, starting at 1.
    ///
    /// # Returns
    ///
    /// The documents of the page with their income and expense totals, the page count, the total
    /// number of matching documents and every year that has documents.
    #[tool]
    async fn list_documents(
        &self,
        Parameters(args): Parameters<DocumentsListArgs>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        let config = (*self.config).clone();
        let out = commands::documents_list(config, args).await;
        tool_result(out)
    }

    /// Show one imported monthly budget with totals recomputed from its transactions. Set
    /// `transactions` to also return every expense and income row.
    #[tool]
    async fn show_document(
        &self,
        Parameters(args): Parameters<DocumentShowArgs>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        let config = (*self.config).clone();
        let out = commands::documents_show(config, args).await;
        tool_result(out)
    }

    /// Return the CSV export of one imported monthly budget. The columns are
    /// `name,amount,description,category,expense/income`, expenses first.
    #[tool]
    async fn get_document_csv(
        &self,
        Parameters(params): Parameters<DocumentCsvParams>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        let out = commands::document_csv(&self.config, params.id).await;
        tool_result(out)
    }

    /// Total income, the average per document and a breakdown by category, over every imported
    /// document or those of the given `year` and `month`. Rows without a category are grouped as
    /// `Uncategorized`.
    #[tool]
    async fn analyze_income(
        &self,
        Parameters(args): Parameters<PeriodArgs>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        let config = (*self.config).clone();
        let out = commands::analyze_income(config, args).await;
        tool_result(out)
    }

    /// Total expenses, the average per document and a breakdown by category, over every imported
    /// document or those of the given `year` and `month`. Rows without a category are grouped as
    /// `Uncategorized`.
    #[tool]
    async fn analyze_expense(
        &self,
        Parameters(args): Parameters<PeriodArgs>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        let config = (*self.config).clone();
        let out = commands::analyze_expense(config, args).await;
        tool_result(out)
    }

    /// The six most recent monthly budgets, income, expense and net totals across them, the
    /// number of imported documents and the active sources.
    #[tool]
    async fn dashboard(&self) -> Result<CallToolResult, McpError> {
        require_init!(self);
        let config = (*self.config).clone();
        let out = commands::dashboard(config).await;
        tool_result(out)
    }
}
