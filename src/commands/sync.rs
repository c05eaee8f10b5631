use crate::args::SyncArgs;
use crate::commands::{plural, Out};
use crate::error::{ErrorType, IntoResult};
use crate::service::{sync_all, sync_source, SyncAllReport, SyncOptions};
use crate::{api, Config, Mode, Result};
use anyhow::anyhow;
use tracing::{debug, info};

/// Imports new monthly budget spreadsheets from every active source, or only from the source
/// named in `args`. A backup of the database is taken before anything is written.
///
/// Spreadsheets that fail to import are listed in the result and do not stop the sync. When all
/// sources are synced, a source that cannot be synced at all is listed as well.
pub async fn sync(config: Config, mode: Mode, args: SyncArgs) -> Result<Out<SyncAllReport>> {
    let options = SyncOptions {
        force: args.force(),
    };

    let backup = config
        .backup()
        .copy_sqlite()
        .await
        .pub_result(ErrorType::Database)?;
    debug!("Saved SQLite backup to {}", backup.display());

    let all = match args.source() {
        Some(name) => {
            let source = config
                .db()
                .source_by_name(config.owner(), name)
                .await
                .pub_result(ErrorType::Database)?
                .ok_or_else(|| anyhow!("There is no source named '{name}'"))
                .pub_result(ErrorType::Request)?;
            let mut drive = api::drive(&config, &source, mode)
                .await
                .pub_result(ErrorType::Drive)?;
            let report = sync_source(&config, &source, drive.as_mut(), options)
                .await
                .pub_result(ErrorType::Sync)?;
            SyncAllReport {
                reports: vec![report],
                failed_sources: Vec::new(),
            }
        }
        None => {
            let config = &config;
            sync_all(config, options, |source| async move {
                api::drive(config, &source, mode).await
            })
            .await
            .pub_result(ErrorType::Sync)?
        }
    };

    let message = message(&all);
    info!("{}", message.lines().next().unwrap_or_default());
    Ok(Out::new(message, all))
}

fn message(all: &SyncAllReport) -> String {
    let sources = all.reports.len() + all.failed_sources.len();
    let mut message = format!(
        "Synced {sources} source{}: {} imported, {} skipped, {} failed",
        plural(sources),
        all.processed(),
        all.skipped(),
        all.failed()
    );
    for report in &all.reports {
        for processed in &report.processed {
            message.push_str(&format!(
                "\n  imported '{}' ({} expenses, {} income)",
                processed.sheet_name, processed.expenses_count, processed.income_count
            ));
        }
        for failed in &report.failed {
            message.push_str(&format!(
                "\n  failed '{}': {}",
                failed.sheet_name, failed.error
            ));
        }
    }
    for failed in &all.failed_sources {
        message.push_str(&format!(
            "\n  source '{}' failed: {}",
            failed.source, failed.error
        ));
    }
    message
}
