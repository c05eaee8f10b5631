//! Command handlers for the lumos CLI.
//!
//! This module contains implementations for all CLI subcommands. The MCP server calls the same
//! handlers so that both interfaces behave identically.

mod analyze;
mod documents;
mod init;
mod mcp;
mod source;
mod sync;

use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

pub use analyze::{analyze_expense, analyze_income, dashboard};
pub use documents::{
    document_csv, documents_download, documents_list, documents_show, DocumentCsv, DocumentDetail,
};
pub use init::init;
pub use mcp::mcp;
pub use source::{source_add, source_disable, source_enable, source_list, source_remove};
pub use sync::sync;

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data to both the command line and MCP server interfaces.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    /// Get the `message`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured data stored in `structure`.
    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Print the message to `info!` and the structured data (if it exists) as JSON to `debug!`.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            if let Ok(json) = serde_json::to_string_pretty(structure) {
                debug!("Command output:\n\n{json}\n\n");
            }
        }
    }

    /// Print the message to `info!` and the structured data as JSON to stdout.
    pub fn print_json(&self) -> crate::Result<()> {
        info!("{}", self.message);
        let json = match self.structure() {
            Some(structure) => serde_json::to_string_pretty(structure)?,
            None => serde_json::to_string_pretty(&serde_json::json!({ "message": self.message }))?,
        };
        println!("{json}");
        Ok(())
    }
}

/// Converts a month number from the command line or an MCP call.
pub(crate) fn month(n: u32) -> crate::Result<crate::model::Month> {
    use crate::error::{ErrorType, IntoResult};
    crate::model::Month::from_number(n)
        .ok_or_else(|| anyhow::anyhow!("Invalid month {n}, expected 1 through 12"))
        .pub_result(ErrorType::Request)
}

/// Returns `""` for one and `"s"` otherwise.
pub(crate) fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}
