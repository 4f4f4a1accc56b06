//! Tool catalog and execution.

mod host;
mod mcp_host;
mod registry;

pub use host::ToolHost;
pub use mcp_host::McpToolHost;
pub use registry::ToolRegistry;
