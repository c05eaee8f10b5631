//! Turns command results into MCP tool results.

use crate::commands::Out;
use crate::error::{error_type, ErrorType};
use rmcp::model::{CallToolResult, Content};
use rmcp::ErrorData;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{error, warn};

/// The JSON that accompanies a failed tool call, so agents can branch on the kind of failure.
#[derive(Debug, Serialize)]
struct ToolError {
    error_type: Option<ErrorType>,
    message: String,
}

/// A successful command becomes its message followed by its structure as JSON. A failed command
/// becomes an error result carrying the full error chain and its `ErrorType`; it is never a
/// protocol error.
pub(super) fn tool_result<T>(result: crate::Result<Out<T>>) -> Result<CallToolResult, ErrorData>
where
    T: Debug + Clone + Serialize,
{
    match result {
        Ok(out) => {
            let mut content = vec![Content::text(out.message())];
            if let Some(structure) = out.structure() {
                match Content::json(structure) {
                    Ok(json) => content.push(json),
                    Err(e) => error!("Unable to serialize the tool output: {e:?}"),
                }
            }
            Ok(CallToolResult::success(content))
        }
        Err(e) => {
            let message = format!("{e:#}");
            warn!("Tool call failed: {message}");
            let mut content = vec![Content::text(message.clone())];
            let detail = ToolError {
                error_type: error_type(&e),
                message,
            };
            if let Ok(json) = Content::json(&detail) {
                content.push(json);
            }
            Ok(CallToolResult::error(content))
        }
    }
}
