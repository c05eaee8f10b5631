//! These structs provide the CLI interface for the lumos CLI.

use crate::model::SourceType;
use clap::{Parser, Subcommand};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// lumos: imports your Google Sheets monthly budgets into a local database and analyzes them.
///
/// Point lumos at a Google Drive folder holding spreadsheets made from Google's "Monthly budget"
/// template, e.g. "Monthly budget Aug 2025". Each sync reads the Transactions tab of every new
/// spreadsheet and stores its expenses and income in a SQLite database, where you can list them,
/// download them as CSV and analyze them by category.
///
/// Access to Google Drive uses a service account. Share the folder with the service account's
/// email address and pass its JSON key to `lumos source add --credentials`.
///
/// There is also a mode in which an AI agent, like Claude, can use this program through the mcp
/// subcommand.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the data directory, the configuration file and the database.
    ///
    /// This is the first command you should run. By default the data directory is $HOME/lumos,
    /// pass --lumos-home or set LUMOS_HOME to put it somewhere else.
    Init(InitArgs),
    /// Manage the Google Drive folders that budgets are imported from.
    #[command(subcommand)]
    Source(SourceCommand),
    /// Import new monthly budget spreadsheets from every active source, or from one.
    Sync(SyncArgs),
    /// List, show and download imported monthly budgets.
    #[command(subcommand)]
    Documents(DocumentsCommand),
    /// Summarize income and expenses by category.
    #[command(subcommand)]
    Analyze(AnalyzeCommand),
    /// Run an MCP server over stdio for AI agents.
    Mcp(McpArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where lumos data and configuration is held. Defaults to ~/lumos
    #[arg(long, env = "LUMOS_HOME", default_value_t = default_lumos_home())]
    lumos_home: DisplayPath,

    /// Print the structured result of the command as JSON to stdout.
    #[arg(long)]
    json: bool,
}

impl Common {
    pub fn new(log_level: LevelFilter, lumos_home: PathBuf, json: bool) -> Self {
        Self {
            log_level,
            lumos_home: lumos_home.into(),
            json,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn lumos_home(&self) -> &DisplayPath {
        &self.lumos_home
    }

    pub fn json(&self) -> bool {
        self.json
    }
}

/// Args for the `lumos init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// The name your sources and documents are recorded under.
    #[arg(long)]
    owner: String,
}

impl InitArgs {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum SourceCommand {
    /// Add a source.
    Add(SourceAddArgs),
    /// List sources.
    List(SourceListArgs),
    /// Remove a source together with every document imported from it.
    Remove(SourceNameArgs),
    /// Resume syncing a disabled source.
    Enable(SourceNameArgs),
    /// Stop syncing a source without removing it.
    Disable(SourceNameArgs),
}

/// Args for the `lumos source add` command.
#[derive(Debug, Parser, Clone)]
pub struct SourceAddArgs {
    /// A name for the source, unique among your sources.
    name: String,

    /// The Google Drive folder, either its URL, e.g.
    /// https://drive.google.com/drive/folders/1a7Km9FxQwRbPt82JvN4LzYpH5OcGnWsT6, or its ID.
    #[arg(long)]
    folder: Option<String>,

    /// The path to the JSON key of a Google service account that can read the folder. It is
    /// copied into the secrets directory.
    #[arg(long)]
    credentials: Option<PathBuf>,

    /// Where documents come from.
    #[arg(long = "type", value_enum, default_value_t = SourceType::GoogleDrive)]
    source_type: SourceType,

    /// A regular expression that spreadsheet names must match. Defaults to names starting with
    /// "Monthly budget", ignoring case.
    #[arg(long)]
    name_pattern: Option<String>,
}

impl SourceAddArgs {
    pub fn new(
        name: impl Into<String>,
        folder: Option<String>,
        credentials: Option<PathBuf>,
        source_type: SourceType,
        name_pattern: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            folder,
            credentials,
            source_type,
            name_pattern,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn folder(&self) -> Option<&str> {
        self.folder.as_deref()
    }

    pub fn credentials(&self) -> Option<&Path> {
        self.credentials.as_deref()
    }

    pub fn source_type(&self) -> SourceType {
        self.source_type
    }

    pub fn name_pattern(&self) -> Option<&str> {
        self.name_pattern.as_deref()
    }
}

/// Args for the `lumos source list` command.
#[derive(Debug, Default, Parser, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SourceListArgs {
    /// Only list active sources.
    #[arg(long)]
    #[serde(default)]
    active: bool,
}

impl SourceListArgs {
    pub fn new(active: bool) -> Self {
        Self { active }
    }

    pub fn active(&self) -> bool {
        self.active
    }
}

/// Names one source.
#[derive(Debug, Parser, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SourceNameArgs {
    /// The name of the source.
    name: String,
}

impl SourceNameArgs {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Args for the `lumos sync` command.
#[derive(Debug, Default, Parser, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncArgs {
    /// Only sync the source with this name. By default every active source is synced.
    #[arg(long)]
    #[serde(default)]
    source: Option<String>,

    /// Import spreadsheets again even if they have already been imported.
    #[arg(long)]
    #[serde(default)]
    force: bool,
}

impl SyncArgs {
    pub fn new(source: Option<String>, force: bool) -> Self {
        Self { source, force }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn force(&self) -> bool {
        self.force
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum DocumentsCommand {
    /// List imported monthly budgets, newest first, ten per page.
    List(DocumentsListArgs),
    /// Show one imported monthly budget.
    Show(DocumentShowArgs),
    /// Write the CSV of one imported monthly budget to a file or to stdout.
    Download(DocumentDownloadArgs),
}

/// Args for the `lumos documents list` command.
#[derive(Debug, Default, Parser, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocumentsListArgs {
    /// Only documents of this year.
    #[arg(long)]
    #[serde(default)]
    year: Option<i32>,

    /// Only documents of this month, 1 through 12.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    #[serde(default)]
    month: Option<u32>,

    /// Text matched against the spreadsheet name, the month number and the year.
    #[arg(long)]
    #[serde(default)]
    search: Option<String>,

    /// The page to show, starting at 1.
    #[arg(long, default_value_t = 1)]
    #[serde(default = "first_page")]
    page: u32,
}

fn first_page() -> u32 {
    1
}

impl DocumentsListArgs {
    pub fn new(year: Option<i32>, month: Option<u32>, search: Option<String>, page: u32) -> Self {
        Self {
            year,
            month,
            search,
            page,
        }
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn month(&self) -> Option<u32> {
        self.month
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn page(&self) -> u32 {
        self.page
    }
}

/// Args for the `lumos documents show` command.
#[derive(Debug, Parser, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocumentShowArgs {
    /// The ID of the document.
    id: i64,

    /// Include every expense and income transaction.
    #[arg(long)]
    #[serde(default)]
    transactions: bool,
}

impl DocumentShowArgs {
    pub fn new(id: i64, transactions: bool) -> Self {
        Self { id, transactions }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn transactions(&self) -> bool {
        self.transactions
    }
}

/// Args for the `lumos documents download` command.
#[derive(Debug, Parser, Clone)]
pub struct DocumentDownloadArgs {
    /// The ID of the document.
    id: i64,

    /// Where to write the CSV. A directory receives a file named `<owner>_<year>_<MM>.csv`, `-`
    /// writes to stdout. Defaults to the current directory.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

impl DocumentDownloadArgs {
    pub fn new(id: i64, output: Option<PathBuf>) -> Self {
        Self { id, output }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_deref()
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum AnalyzeCommand {
    /// Income totals, averages and categories.
    Income(PeriodArgs),
    /// Expense totals, averages and categories.
    Expense(PeriodArgs),
    /// The six most recent documents with their totals, and the active sources.
    Dashboard,
}

/// Narrows an analysis to a year and month.
#[derive(Debug, Default, Parser, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PeriodArgs {
    /// Only documents of this year.
    #[arg(long)]
    #[serde(default)]
    year: Option<i32>,

    /// Only documents of this month, 1 through 12.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    #[serde(default)]
    month: Option<u32>,
}

impl PeriodArgs {
    pub fn new(year: Option<i32>, month: Option<u32>) -> Self {
        Self { year, month }
    }

    pub fn year(&self) -> Option<i32> {
        self.year
    }

    pub fn month(&self) -> Option<u32> {
        self.month
    }
}

/// Args for the `lumos mcp` command.
#[derive(Debug, Parser, Clone)]
pub struct McpArgs {}

fn default_lumos_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("lumos"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --lumos-home or LUMOS_HOME instead of relying on the default \
                lumos home directory. If you continue using the program right now, you may have \
                problems!",
            );
            PathBuf::from("lumos")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        <Args as CommandFactory>::command().debug_assert();
    }

    #[test]
    fn test_parse_documents_list() {
        let args = Args::try_parse_from([
            "lumos",
            "--lumos-home",
            "/tmp/lumos",
            "documents",
            "list",
            "--year",
            "2025",
            "--month",
            "8",
        ])
        .unwrap();
        assert_eq!(args.common().lumos_home().path(), Path::new("/tmp/lumos"));
        match args.command() {
            Command::Documents(DocumentsCommand::List(list)) => {
                assert_eq!(list.year(), Some(2025));
                assert_eq!(list.month(), Some(8));
                assert_eq!(list.page(), 1);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_month_out_of_range_is_rejected() {
        assert!(Args::try_parse_from(["lumos", "analyze", "income", "--month", "13"]).is_err());
    }

    #[test]
    fn test_sync_args_from_json() {
        let args: SyncArgs = serde_json::from_str(r#"{"force": true}"#).unwrap();
        assert!(args.force());
        assert_eq!(args.source(), None);
        let list: DocumentsListArgs = serde_json::from_str("{}").unwrap();
        assert_eq!(list.page(), 1);
    }
}
