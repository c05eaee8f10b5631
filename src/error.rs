//! Error types used throughout the crate.
//!
//! Internally everything is an `anyhow::Error`. Results that leave a public command are tagged
//! with an `ErrorType` so that callers (the CLI and the MCP server) can tell what kind of thing
//! went wrong without parsing messages.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub type Error = anyhow::Error;
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The broad category of a failure that is reported to the user.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// The lumos home directory or `config.json` is missing or invalid.
    Config,
    /// A SQLite operation failed.
    Database,
    /// Talking to Google Drive or Google Sheets failed.
    Drive,
    /// A sync could not be started or completed.
    Sync,
    /// The MCP service failed.
    Service,
    /// The request itself was invalid, e.g. an unknown source name.
    Request,
}

impl Display for ErrorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorType::Config => "Configuration error",
            ErrorType::Database => "Database error",
            ErrorType::Drive => "Google Drive error",
            ErrorType::Sync => "Sync error",
            ErrorType::Service => "Service error",
            ErrorType::Request => "Invalid request",
        };
        f.write_str(s)
    }
}

/// Converts an internal result into one that carries an `ErrorType` as its outermost context.
pub(crate) trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T, E> IntoResult<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| e.into().context(error_type))
    }
}

/// Finds the `ErrorType` attached to `e` by `pub_result`, if any.
pub fn error_type(e: &Error) -> Option<ErrorType> {
    e.downcast_ref::<ErrorType>().copied()
}
