use clap::Parser;
use lumos_sync::args::{AnalyzeCommand, Args, Command, DocumentsCommand, SourceCommand};
use lumos_sync::commands::{self, Out};
use lumos_sync::{Config, Mode, Result};
use serde::Serialize;
use std::fmt::Debug;
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().lumos_home().path();
    let json = args.common().json();

    // When LUMOS_IN_TEST_MODE is set and non-empty, spreadsheets are read from the in-memory test
    // drive instead of Google Drive.
    let mode = Mode::from_env();

    match args.command() {
        Command::Init(init_args) => emit(commands::init(home, init_args.owner()).await?, json),

        Command::Source(source_command) => {
            let config = Config::load(home).await?;
            match source_command {
                SourceCommand::Add(args) => {
                    emit(commands::source_add(config, args.clone()).await?, json)
                }
                SourceCommand::List(args) => {
                    emit(commands::source_list(config, args.clone()).await?, json)
                }
                SourceCommand::Remove(args) => {
                    emit(commands::source_remove(config, args.clone()).await?, json)
                }
                SourceCommand::Enable(args) => {
                    emit(commands::source_enable(config, args.clone()).await?, json)
                }
                SourceCommand::Disable(args) => {
                    emit(commands::source_disable(config, args.clone()).await?, json)
                }
            }
        }

        Command::Sync(sync_args) => {
            let config = Config::load(home).await?;
            emit(commands::sync(config, mode, sync_args.clone()).await?, json)
        }

        Command::Documents(documents_command) => {
            let config = Config::load(home).await?;
            match documents_command {
                DocumentsCommand::List(args) => {
                    emit(commands::documents_list(config, args.clone()).await?, json)
                }
                DocumentsCommand::Show(args) => {
                    emit(commands::documents_show(config, args.clone()).await?, json)
                }
                DocumentsCommand::Download(args) => emit(
                    commands::documents_download(config, args.clone()).await?,
                    json,
                ),
            }
        }

        Command::Analyze(analyze_command) => {
            let config = Config::load(home).await?;
            match analyze_command {
                AnalyzeCommand::Income(args) => {
                    emit(commands::analyze_income(config, args.clone()).await?, json)
                }
                AnalyzeCommand::Expense(args) => {
                    emit(commands::analyze_expense(config, args.clone()).await?, json)
                }
                AnalyzeCommand::Dashboard => emit(commands::dashboard(config).await?, json),
            }
        }

        // stdout carries the protocol, so nothing else may be printed there.
        Command::Mcp(_mcp_args) => {
            commands::mcp(Config::load(home).await?, mode)
                .await?
                .print();
            Ok(())
        }
    }
}

fn emit<T>(out: Out<T>, json: bool) -> Result<()>
where
    T: Serialize + Clone + Debug,
{
    if json {
        out.print_json()
    } else {
        out.print();
        Ok(())
    }
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
