//! Runtime for answering queries with a language model and remote tools.
//!
//! # Overview
//!
//! The runtime is organized around these concepts:
//!
//! - **Backend**: a trait abstracting the completion service (Anthropic, etc.).
//! - **ToolHost**: a trait over whatever executes tools; [`McpToolHost`] runs
//!   them in an MCP server process.
//! - **Orchestrator**: drives a single query through the backend, dispatching
//!   the model's tool requests to the host and feeding results back.
//!
//! # Example
//!
//! ```ignore
//! use mcp::ServerConfig;
//! use runtime::{AnthropicBackend, CompletionSettings, McpToolHost, Orchestrator};
//!
//! # async fn example() -> runtime::Result<()> {
//! let backend = AnthropicBackend::builder("sk-ant-api03-...").build()?;
//! let host = McpToolHost::connect(ServerConfig::for_script("weather.py")?).await?;
//!
//! let orchestrator = Orchestrator::new(backend, host, CompletionSettings::default());
//! let answer = orchestrator.process_query("Any weather alerts in CA?").await;
//! orchestrator.into_host().shutdown().await;
//! println!("{}", answer?);
//! # Ok(())
//! # }
//! ```

mod conversation;
mod error;
pub mod llm;
mod orchestrator;
mod providers;
pub mod tools;

// LLM core types (provider-agnostic)
pub use llm::{Backend, ContentBlock, Message, ModelError, Role, ToolSpec};

// Completion service adapters
pub use providers::{
    ANTHROPIC_API_URL, AnthropicBackend, AnthropicBackendBuilder, DEFAULT_TIMEOUT as COMPLETION_TIMEOUT,
};

// Error types
pub use error::{Error, Result};

// Tools
pub use tools::{McpToolHost, ToolHost, ToolRegistry};

// Query processing
pub use conversation::Conversation;
pub use orchestrator::{CompletionSettings, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, Orchestrator};
