//! MCP-backed tool host.

use mcp::{Server, ServerConfig};
use serde_json::Value;
use tracing::info;

use super::ToolHost;
use crate::llm::ToolSpec;
use crate::{Error, Result};

/// Tool host backed by an MCP server process.
pub struct McpToolHost {
    server: Server,
}

impl McpToolHost {
    /// Spawn the server and complete the handshake.
    ///
    /// Any failure after the process is spawned is a transport error; the
    /// process is torn down before returning.
    pub async fn connect(config: ServerConfig) -> Result<Self> {
        let server = Server::connect(config).await.map_err(|e| match e {
            mcp::Error::UnsupportedScript { .. } => Error::from(e),
            other => Error::Transport(other),
        })?;

        info!(
            server = server.name(),
            tools = server.tools().await.len(),
            "connected to tool provider"
        );
        Ok(Self { server })
    }

    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Tool catalog fetched during the handshake or the last refresh.
    pub async fn cached_tools(&self) -> Vec<ToolSpec> {
        self.server
            .tools()
            .await
            .into_iter()
            .map(ToolSpec::from)
            .collect()
    }

    /// Terminate the server process.
    pub async fn shutdown(self) {
        self.server.shutdown().await;
    }
}

impl ToolHost for McpToolHost {
    async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        let tools = self.server.list_tools().await?;
        Ok(tools.into_iter().map(ToolSpec::from).collect())
    }

    async fn call_tool(&self, name: &str, input: &Value) -> Result<String> {
        let arguments = match input {
            Value::Null => None,
            Value::Object(_) => Some(input.clone()),
            other => {
                return Err(Error::ToolExecution(format!(
                    "arguments for {name} must be a JSON object, got {other}"
                )));
            }
        };

        let result = self.server.call_tool(name, arguments).await?;
        Ok(result.joined_text())
    }
}
