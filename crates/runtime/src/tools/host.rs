//! Tool host trait.

use crate::Result;
use crate::llm::ToolSpec;
use serde_json::Value;
use std::future::Future;

/// Trait for tool execution hosts.
///
/// Implementations provide tool specifications and execute tool calls.
/// This is the boundary between the model loop and side effects.
pub trait ToolHost: Send + Sync {
    /// Fetch the current tool catalog.
    fn list_tools(&self) -> impl Future<Output = Result<Vec<ToolSpec>>> + Send;

    /// Execute a tool call, returning its text output.
    fn call_tool(&self, name: &str, input: &Value) -> impl Future<Output = Result<String>> + Send;
}
