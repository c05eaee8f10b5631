use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory, its subdirectories, an initial `config.json` recording `owner`
/// along with default settings, and an empty database.
///
/// # Arguments
/// - `lumos_home` - The directory that will be the root of data directory, e.g. `$HOME/lumos`
/// - `owner` - The name sources and documents are recorded under.
///
/// # Errors
/// - Returns an error if any file operations fail or if the directory already holds a database.
pub async fn init(lumos_home: &Path, owner: &str) -> Result<Out<()>> {
    let config = Config::create(lumos_home, owner)
        .await
        .context("Unable to create the data directory and configs")
        .pub_result(ErrorType::Config)?;
    Ok(format!(
        "Successfully created the lumos directory at '{}'",
        config.root().display()
    )
    .into())
}
