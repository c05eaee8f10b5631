//! `lumos mcp`: serves the command handlers as MCP tools over stdio until the client disconnects.

use crate::commands::Out;
use crate::mcp::Io;
use crate::{mcp, Config, Mode, Result};
use tracing::info;

pub async fn mcp(config: Config, mode: Mode) -> Result<Out<()>> {
    let owner = config.owner().to_string();
    info!(
        "Serving lumos for '{owner}' from {} ({mode:?})",
        config.root().display()
    );
    mcp::run_server(config, mode, Io::Stdio).await?;
    Ok(Out::new_message(format!("The MCP session for '{owner}' ended")))
}
