//! MCP (Model Context Protocol) client and provider library.
//!
//! The client half ([`Server`]) spawns a tool provider as a child process and
//! talks JSON-RPC to it over stdio. The provider half ([`provider`]) serves a
//! registry of tool handlers over the same framing.
//!
//! # Example
//!
//! ```no_run
//! use mcp::{Server, ServerConfig};
//!
//! # async fn example() -> mcp::Result<()> {
//! let config = ServerConfig::for_script("weather/server.py")?;
//! let server = Server::connect(config).await?;
//!
//! for tool in server.tools().await {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let result = server
//!     .call_tool("get_alerts", Some(serde_json::json!({ "state": "CA" })))
//!     .await?;
//! println!("{}", result.joined_text());
//!
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod error;
mod protocol;
pub mod provider;
mod server;

pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeParams, InitializeResult,
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, PROTOCOL_VERSION, RequestId, ServerCapabilities, Tool, ToolContent,
};
pub use provider::{Provider, ToolHandler, ToolRouter};
pub use server::{
    DEFAULT_TIMEOUT, HANDSHAKE_TIMEOUT, Interpreter, MAX_OUTPUT_SIZE, Server, ServerConfig,
};
