//! Imports the monthly budget spreadsheets of a `DocumentSource` into the database.

use crate::api::{list_monthly_budget_files, Drive, DriveFile, TRANSACTIONS};
use crate::db::NewDocument;
use crate::model::{build_csv, BudgetSheet, DocumentSource, MonthYear};
use crate::{Config, Result};
use anyhow::{bail, Context};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Options for a sync run.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct SyncOptions {
    /// Re-import spreadsheets that are already recorded with the same sheet ID.
    pub force: bool,
}

/// Why a spreadsheet was not imported.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The file name has no recognizable month or year.
    NoPeriod,
    /// A document for the period already exists with the same sheet ID.
    AlreadyImported,
    /// Another spreadsheet in this run already provided the period.
    DuplicatePeriod,
}

serde_plain::derive_display_from_serialize!(SkipReason);

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProcessedSheet {
    pub sheet_id: String,
    pub sheet_name: String,
    pub document_id: i64,
    pub year: i32,
    pub month: u32,
    pub expenses_count: u32,
    pub income_count: u32,
    /// Whether an existing document for the period was overwritten.
    pub replaced: bool,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SkippedSheet {
    pub sheet_id: String,
    pub sheet_name: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FailedSheet {
    pub sheet_id: String,
    pub sheet_name: String,
    pub error: String,
}

/// The outcome of syncing one source.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncReport {
    pub source: String,
    pub processed: Vec<ProcessedSheet>,
    pub skipped: Vec<SkippedSheet>,
    pub failed: Vec<FailedSheet>,
}

impl SyncReport {
    fn new(source: &DocumentSource) -> Self {
        Self {
            source: source.name().to_string(),
            ..Self::default()
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} processed, {} skipped, {} failed",
            self.source,
            self.processed.len(),
            self.skipped.len(),
            self.failed.len()
        )
    }
}

/// A source that could not be synced at all.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FailedSource {
    pub source: String,
    pub error: String,
}

/// The outcome of syncing every active source of an owner.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncAllReport {
    pub reports: Vec<SyncReport>,
    pub failed_sources: Vec<FailedSource>,
}

impl SyncAllReport {
    pub fn processed(&self) -> usize {
        self.reports.iter().map(|r| r.processed.len()).sum()
    }

    pub fn skipped(&self) -> usize {
        self.reports.iter().map(|r| r.skipped.len()).sum()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().map(|r| r.failed.len()).sum()
    }
}

enum Outcome {
    Processed(ProcessedSheet),
    Skipped(SkipReason),
}

/// Syncs one source: lists its matching spreadsheets and imports those that are new or changed.
///
/// Failures of individual spreadsheets are recorded in the report. The whole call fails only when
/// the source cannot be synced at all, e.g. it is disabled, locked by another sync, or its folder
/// cannot be listed.
pub(crate) async fn sync_source(
    config: &Config,
    source: &DocumentSource,
    drive: &mut (dyn Drive + Send),
    options: SyncOptions,
) -> Result<SyncReport> {
    source.ensure_syncable()?;

    let db = config.db();
    let token = uuid::Uuid::new_v4().to_string();
    let now = Utc::now();
    let stale_before = now - Duration::minutes(i64::from(config.sync_lock_minutes()));
    if !db
        .acquire_sync_lock(source.id(), &token, now, stale_before)
        .await?
    {
        bail!(
            "Another sync of source '{}' is in progress, try again later",
            source.name()
        );
    }
    debug!("Took the sync lock of source '{}'", source.name());

    let result = sync_locked(config, source, drive, options).await;

    if let Err(e) = db.release_sync_lock(source.id(), &token).await {
        warn!(
            "Unable to release the sync lock of source '{}': {e:#}",
            source.name()
        );
    }
    result
}

async fn sync_locked(
    config: &Config,
    source: &DocumentSource,
    drive: &mut (dyn Drive + Send),
    options: SyncOptions,
) -> Result<SyncReport> {
    let pattern = source.name_regex()?;
    let files = list_monthly_budget_files(drive, source.folder_id(), &pattern)
        .await
        .with_context(|| {
            format!(
                "Unable to list the spreadsheets of source '{}'",
                source.name()
            )
        })?;
    info!(
        "Found {} monthly budget spreadsheets for source '{}'",
        files.len(),
        source.name()
    );

    let mut report = SyncReport::new(source);
    let mut seen: HashSet<MonthYear> = HashSet::new();
    for file in &files {
        match sync_file(config, source, drive, file, options, &mut seen).await {
            Ok(Outcome::Processed(processed)) => {
                info!("Imported '{}'", file.name);
                report.processed.push(processed);
            }
            Ok(Outcome::Skipped(reason)) => {
                debug!("Skipped '{}': {reason}", file.name);
                report.skipped.push(SkippedSheet {
                    sheet_id: file.id.clone(),
                    sheet_name: file.name.clone(),
                    reason,
                });
            }
            Err(e) => {
                warn!("Unable to import '{}': {e:#}", file.name);
                report.failed.push(FailedSheet {
                    sheet_id: file.id.clone(),
                    sheet_name: file.name.clone(),
                    error: format!("{e:#}"),
                });
            }
        }
    }

    config.db().set_last_sync(source.id(), Utc::now()).await?;
    Ok(report)
}

async fn sync_file(
    config: &Config,
    source: &DocumentSource,
    drive: &mut (dyn Drive + Send),
    file: &DriveFile,
    options: SyncOptions,
    seen: &mut HashSet<MonthYear>,
) -> Result<Outcome> {
    let Some(period) = MonthYear::from_file_name(&file.name) else {
        return Ok(Outcome::Skipped(SkipReason::NoPeriod));
    };
    // only periods that are settled in the database count, so a failed file leaves its month open
    if seen.contains(&period) {
        return Ok(Outcome::Skipped(SkipReason::DuplicatePeriod));
    }

    let existing = config.db().find_document(source.owner(), period).await?;
    if let Some(existing) = &existing {
        if existing.sheet_id() == file.id && !options.force {
            seen.insert(period);
            return Ok(Outcome::Skipped(SkipReason::AlreadyImported));
        }
    }

    let tabs = drive
        .sheet_names(&file.id)
        .await
        .context("Unable to list the tabs of the spreadsheet")?;
    let Some(tab) = tabs.iter().find(|t| t.trim().eq_ignore_ascii_case(TRANSACTIONS)) else {
        bail!("The spreadsheet has no '{TRANSACTIONS}' tab");
    };
    let grid = drive
        .values(&file.id, tab)
        .await
        .with_context(|| format!("Unable to read the '{tab}' tab"))?;

    let sheet = BudgetSheet::parse(grid, config.currency())?;
    let csv = build_csv(&sheet)?;
    let document = config
        .db()
        .save_document(NewDocument {
            source,
            sheet_id: &file.id,
            sheet_name: &file.name,
            period,
            sheet: &sheet,
            csv,
        })
        .await?;
    seen.insert(period);

    Ok(Outcome::Processed(ProcessedSheet {
        sheet_id: file.id.clone(),
        sheet_name: file.name.clone(),
        document_id: document.id(),
        year: period.year(),
        month: period.month().number(),
        expenses_count: document.summary().expenses_count(),
        income_count: document.summary().income_count(),
        replaced: existing.is_some(),
    }))
}

/// Syncs every active Google Drive source of the configured owner. A source that fails is
/// recorded and the remaining sources still run.
pub(crate) async fn sync_all<F, Fut>(
    config: &Config,
    options: SyncOptions,
    mut make_drive: F,
) -> Result<SyncAllReport>
where
    F: FnMut(DocumentSource) -> Fut,
    Fut: std::future::Future<Output = Result<Box<dyn Drive + Send>>>,
{
    let sources = config.db().list_sources(config.owner(), true).await?;
    let mut all = SyncAllReport::default();
    for source in sources {
        if source.source_type() != crate::model::SourceType::GoogleDrive {
            continue;
        }
        let name = source.name().to_string();
        let result = match make_drive(source.clone()).await {
            Ok(mut drive) => sync_source(config, &source, drive.as_mut(), options).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(report) => {
                info!("{}", report.summary());
                all.reports.push(report);
            }
            Err(e) => {
                warn!("Unable to sync source '{name}': {e:#}");
                all.failed_sources.push(FailedSource {
                    source: name,
                    error: format!("{e:#}"),
                });
            }
        }
    }
    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{sample_budget_grid, TestDrive, TestFolder, TestSpreadsheet};
    use crate::model::{Amount, Month};
    use crate::test::TestEnv;
    use std::str::FromStr;

    fn uid() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    #[tokio::test]
    async fn test_sync_imports_and_skips() {
        let env = TestEnv::new().await;
        let (aug, template, notes) = (uid(), uid(), uid());
        let folder_id = TestFolder::new(vec![
            TestSpreadsheet::budget(&aug, "Monthly budget Aug 2025", sample_budget_grid()),
            TestSpreadsheet::budget(&template, "Monthly budget template", sample_budget_grid()),
            TestSpreadsheet::budget(&notes, "Notes", sample_budget_grid()),
        ])
        .install();
        let source = env.add_source("Main", &folder_id).await;
        let config = env.config();

        let report = sync_source(&config, &source, &mut TestDrive::new(), SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.processed[0].sheet_id, aug);
        assert_eq!(report.processed[0].expenses_count, 3);
        assert_eq!(report.processed[0].income_count, 2);
        assert!(!report.processed[0].replaced);
        assert_eq!(
            report.skipped,
            vec![SkippedSheet {
                sheet_id: template,
                sheet_name: "Monthly budget template".into(),
                reason: SkipReason::NoPeriod,
            }]
        );
        assert!(report.failed.is_empty());

        let doc = config
            .db()
            .find_document(config.owner(), MonthYear::new(2025, Month::August))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            doc.summary().total_expenses(),
            Amount::from_str("188700").unwrap()
        );
        assert_eq!(
            doc.summary().total_income(),
            Amount::from_str("5250000").unwrap()
        );
        let source = config.db().source(source.id()).await.unwrap().unwrap();
        assert!(source.last_sync().is_some());
    }

    #[tokio::test]
    async fn test_second_sync_creates_nothing() {
        let env = TestEnv::new().await;
        let sheet_id = uid();
        let folder_id = TestFolder::new(vec![TestSpreadsheet::budget(
            &sheet_id,
            "Monthly budget Jan 2025",
            sample_budget_grid(),
        )])
        .install();
        let source = env.add_source("Main", &folder_id).await;
        let config = env.config();
        let mut drive = TestDrive::new();

        sync_source(&config, &source, &mut drive, SyncOptions::default())
            .await
            .unwrap();
        let report = sync_source(&config, &source, &mut drive, SyncOptions::default())
            .await
            .unwrap();
        assert!(report.processed.is_empty());
        assert_eq!(report.skipped[0].reason, SkipReason::AlreadyImported);
        assert_eq!(config.db().count_documents(config.owner()).await.unwrap(), 1);

        let report = sync_source(&config, &source, &mut drive, SyncOptions { force: true })
            .await
            .unwrap();
        assert_eq!(report.processed.len(), 1);
        assert!(report.processed[0].replaced);
        assert_eq!(config.db().count_documents(config.owner()).await.unwrap(), 1);
        let doc = config
            .db()
            .find_document(config.owner(), MonthYear::new(2025, Month::January))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            config.db().transactions(doc.id(), None).await.unwrap().len(),
            5
        );
    }

    #[tokio::test]
    async fn test_missing_tab_and_bad_amount_are_reported() {
        let env = TestEnv::new().await;
        let (good, no_tab, bad) = (uid(), uid(), uid());
        let mut bad_grid = sample_budget_grid();
        bad_grid[4][2] = "fifteen".to_string();
        let folder_id = TestFolder::new(vec![
            TestSpreadsheet::new(
                &no_tab,
                "Monthly budget Feb 2025",
                vec![("Summary".to_string(), Vec::new())],
            ),
            TestSpreadsheet::budget(&bad, "Monthly budget Mar 2025", bad_grid),
            TestSpreadsheet::budget(&good, "Monthly budget Apr 2025", sample_budget_grid()),
        ])
        .install();
        let source = env.add_source("Main", &folder_id).await;
        let config = env.config();

        let report = sync_source(&config, &source, &mut TestDrive::new(), SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.processed[0].sheet_id, good);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].sheet_id, no_tab);
        assert!(report.failed[0].error.contains("Transactions"));
        assert_eq!(report.failed[1].sheet_id, bad);
        assert!(report.failed[1].error.contains("C5"), "{}", report.failed[1].error);
    }

    #[tokio::test]
    async fn test_different_sheet_replaces_period() {
        let env = TestEnv::new().await;
        let (first, second) = (uid(), uid());
        let folder_id = TestFolder::new(vec![TestSpreadsheet::budget(
            &first,
            "Monthly budget May 2025",
            sample_budget_grid(),
        )])
        .install();
        let source = env.add_source("Main", &folder_id).await;
        let config = env.config();
        let mut drive = TestDrive::new();
        sync_source(&config, &source, &mut drive, SyncOptions::default())
            .await
            .unwrap();

        TestDrive::set_folder(
            &folder_id,
            TestFolder::new(vec![TestSpreadsheet::budget(
                &second,
                "Monthly budget May 2025 (v2)",
                sample_budget_grid(),
            )]),
        );
        let report = sync_source(&config, &source, &mut drive, SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.processed.len(), 1);
        assert!(report.processed[0].replaced);
        let doc = config
            .db()
            .find_document(config.owner(), MonthYear::new(2025, Month::May))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.sheet_id(), second);
        assert_eq!(config.db().transactions(doc.id(), None).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_duplicate_period_in_one_run() {
        let env = TestEnv::new().await;
        let (first, second) = (uid(), uid());
        let folder_id = TestFolder::new(vec![
            TestSpreadsheet::budget(&first, "Monthly budget Jun 2025", sample_budget_grid()),
            TestSpreadsheet::budget(&second, "Monthly budget June 2025 copy", sample_budget_grid()),
        ])
        .install();
        let source = env.add_source("Main", &folder_id).await;
        let report = sync_source(
            &env.config(),
            &source,
            &mut TestDrive::new(),
            SyncOptions::default(),
        )
        .await
        .unwrap();
        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.skipped[0].sheet_id, second);
        assert_eq!(report.skipped[0].reason, SkipReason::DuplicatePeriod);
    }

    #[tokio::test]
    async fn test_failed_file_leaves_period_open() {
        let env = TestEnv::new().await;
        let (broken, fixed) = (uid(), uid());
        let mut broken_grid = sample_budget_grid();
        broken_grid[4][2] = "fifteen".to_string();
        let folder_id = TestFolder::new(vec![
            TestSpreadsheet::budget(&broken, "Monthly budget Jun 2025", broken_grid),
            TestSpreadsheet::budget(
                &fixed,
                "Monthly budget Jun 2025 (fixed)",
                sample_budget_grid(),
            ),
        ])
        .install();
        let source = env.add_source("Main", &folder_id).await;
        let config = env.config();
        let report = sync_source(&config, &source, &mut TestDrive::new(), SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].sheet_id, broken);
        assert!(report.skipped.is_empty());
        assert_eq!(report.processed.len(), 1);
        assert_eq!(report.processed[0].sheet_id, fixed);
        let doc = config
            .db()
            .find_document(config.owner(), MonthYear::new(2025, Month::June))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.sheet_id(), fixed);
    }

    #[tokio::test]
    async fn test_locked_source_is_rejected() {
        let env = TestEnv::new().await;
        let folder_id = TestFolder::new(Vec::new()).install();
        let source = env.add_source("Main", &folder_id).await;
        let config = env.config();
        let now = Utc::now();
        assert!(config
            .db()
            .acquire_sync_lock(source.id(), "other", now, now - Duration::minutes(30))
            .await
            .unwrap());

        let err = sync_source(&config, &source, &mut TestDrive::new(), SyncOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("in progress"));

        // the lock is still held by the other process
        assert!(!config
            .db()
            .acquire_sync_lock(source.id(), "third", now, now - Duration::minutes(30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_lock_is_released_after_failure() {
        let env = TestEnv::new().await;
        let folder_id = TestFolder::install_missing();
        let source = env.add_source("Main", &folder_id).await;
        let config = env.config();
        let mut drive = TestDrive::new();

        assert!(sync_source(&config, &source, &mut drive, SyncOptions::default())
            .await
            .is_err());
        let now = Utc::now();
        assert!(config
            .db()
            .acquire_sync_lock(source.id(), "next", now, now - Duration::minutes(30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_disabled_source_is_rejected() {
        let env = TestEnv::new().await;
        let folder_id = TestFolder::new(Vec::new()).install();
        env.add_source("Main", &folder_id).await;
        let config = env.config();
        let source = config
            .db()
            .set_source_active(config.owner(), "Main", false)
            .await
            .unwrap()
            .unwrap();
        let err = sync_source(&config, &source, &mut TestDrive::new(), SyncOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }

    #[tokio::test]
    async fn test_sync_all_continues_past_failing_source() {
        let env = TestEnv::new().await;
        let good_sheet = uid();
        let good = TestFolder::new(vec![TestSpreadsheet::budget(
            &good_sheet,
            "Monthly budget Sep 2025",
            sample_budget_grid(),
        )])
        .install();
        let missing = TestFolder::install_missing();
        env.add_source("A broken", &missing).await;
        env.add_source("B good", &good).await;
        let config = env.config();

        let all = sync_all(&config, SyncOptions::default(), |_| async {
            Ok(Box::new(TestDrive::new()) as Box<dyn Drive + Send>)
        })
        .await
        .unwrap();
        assert_eq!(all.failed_sources.len(), 1);
        assert_eq!(all.failed_sources[0].source, "A broken");
        assert_eq!(all.reports.len(), 1);
        assert_eq!(all.processed(), 1);
    }
}
