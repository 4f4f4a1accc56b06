use crate::llm::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing configuration, e.g. an unsupported server script.
    #[error("config error: {0}")]
    Config(String),

    /// The provider process or its channel failed.
    #[error("transport error: {0}")]
    Transport(#[source] mcp::Error),

    /// The provider reported that a tool call failed.
    #[error("tool error: {0}")]
    ToolExecution(String),

    /// The completion service call failed.
    #[error("completion service error: {0}")]
    Completion(#[from] ModelError),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl From<mcp::Error> for Error {
    fn from(error: mcp::Error) -> Self {
        match error {
            mcp::Error::UnsupportedScript { .. } => Self::Config(error.to_string()),
            mcp::Error::ToolCallFailed(message) => Self::ToolExecution(message),
            mcp::Error::ToolNotFound(_)
            | mcp::Error::InvalidArguments(_)
            | mcp::Error::JsonRpc(_) => Self::ToolExecution(error.to_string()),
            other => Self::Transport(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn mcp_errors_are_classified() {
        let config = Error::from(mcp::Error::UnsupportedScript {
            path: "server.rb".into(),
        });
        assert!(matches!(config, Error::Config(_)));

        let tool = Error::from(mcp::Error::ToolCallFailed("bad state".into()));
        assert!(matches!(tool, Error::ToolExecution(ref m) if m == "bad state"));

        let rpc = Error::from(mcp::Error::JsonRpc(mcp::JsonRpcError::invalid_params(
            "unknown tool: x",
        )));
        assert!(matches!(rpc, Error::ToolExecution(_)));

        for transport in [
            mcp::Error::ServerExited,
            mcp::Error::Timeout(Duration::from_secs(1)),
            mcp::Error::NotInitialized,
        ] {
            assert!(matches!(Error::from(transport), Error::Transport(_)));
        }
    }
}
