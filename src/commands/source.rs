//! Handlers for `lumos source add|list|remove|enable|disable`.

use crate::args::{SourceAddArgs, SourceListArgs, SourceNameArgs};
use crate::commands::{plural, Out};
use crate::error::{ErrorType, IntoResult};
use crate::model::{extract_folder_id, DocumentSource, NewSource, SourceType};
use crate::{Config, Result};
use anyhow::{anyhow, bail};
use tracing::info;

/// Adds a source. A Google Drive source needs a folder and credentials; the credentials file is
/// copied into the secrets directory once everything else has been validated.
pub async fn source_add(config: Config, args: SourceAddArgs) -> Result<Out<DocumentSource>> {
    let mut new = new_source(&config, &args).pub_result(ErrorType::Request)?;
    if config
        .db()
        .source_by_name(config.owner(), args.name())
        .await
        .pub_result(ErrorType::Database)?
        .is_some()
    {
        return Err(anyhow!("A source named '{}' already exists", args.name()))
            .pub_result(ErrorType::Request);
    }
    if let Some(path) = args.credentials() {
        new.credentials = Some(
            config
                .import_credentials(path)
                .await
                .pub_result(ErrorType::Request)?,
        );
    }
    let source = config
        .db()
        .add_source(&new)
        .await
        .pub_result(ErrorType::Database)?;
    info!("Added source '{}'", source.name());
    Ok(Out::new(
        format!("Added the source '{}'", source.name()),
        source,
    ))
}

/// Validates `args` into a source without credentials.
fn new_source(config: &Config, args: &SourceAddArgs) -> Result<NewSource> {
    let folder_id = args.folder().map(extract_folder_id).transpose()?;
    if args.source_type() == SourceType::GoogleDrive {
        if folder_id.is_none() {
            bail!("A google_drive source needs --folder");
        }
        if args.credentials().is_none() {
            bail!("A google_drive source needs --credentials");
        }
    }
    NewSource::new(
        config.owner(),
        args.name(),
        args.source_type(),
        folder_id.unwrap_or_default(),
        None,
        args.name_pattern().map(str::to_string),
    )
}

pub async fn source_list(
    config: Config,
    args: SourceListArgs,
) -> Result<Out<Vec<DocumentSource>>> {
    let sources = config
        .db()
        .list_sources(config.owner(), args.active())
        .await
        .pub_result(ErrorType::Database)?;
    let mut message = format!("{} source{}", sources.len(), plural(sources.len()));
    for source in &sources {
        let last_sync = source
            .last_sync()
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        message.push_str(&format!(
            "\n  {} ({}, {}, last sync {last_sync})",
            source.name(),
            source.source_type(),
            if source.is_active() { "active" } else { "disabled" },
        ));
    }
    Ok(Out::new(message, sources))
}

/// Removes a source and, through the foreign key cascade, every document imported from it.
pub async fn source_remove(config: Config, args: SourceNameArgs) -> Result<Out<()>> {
    let removed = config
        .db()
        .remove_source(config.owner(), args.name())
        .await
        .pub_result(ErrorType::Database)?;
    if !removed {
        return Err(unknown_source(args.name())).pub_result(ErrorType::Request);
    }
    Ok(format!("Removed the source '{}' and its documents", args.name()).into())
}

pub async fn source_enable(config: Config, args: SourceNameArgs) -> Result<Out<DocumentSource>> {
    set_active(config, args, true).await
}

pub async fn source_disable(config: Config, args: SourceNameArgs) -> Result<Out<DocumentSource>> {
    set_active(config, args, false).await
}

async fn set_active(
    config: Config,
    args: SourceNameArgs,
    active: bool,
) -> Result<Out<DocumentSource>> {
    let source = config
        .db()
        .set_source_active(config.owner(), args.name(), active)
        .await
        .pub_result(ErrorType::Database)?
        .ok_or_else(|| unknown_source(args.name()))
        .pub_result(ErrorType::Request)?;
    let state = if active { "Enabled" } else { "Disabled" };
    Ok(Out::new(
        format!("{state} the source '{}'", source.name()),
        source,
    ))
}

fn unknown_source(name: &str) -> anyhow::Error {
    anyhow!("There is no source named '{name}'")
}
