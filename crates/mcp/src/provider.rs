//! Provider side of the protocol: a registry of tool handlers served over a
//! newline-delimited JSON-RPC stream (normally the process's stdin/stdout).
//!
//! Requests are handled one at a time, in arrival order. The loop ends when
//! the input reaches EOF.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeResult, JsonRpcError,
    JsonRpcMessage, JsonRpcRequest, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION,
    ServerCapabilities, Tool, ToolsCapability,
};

/// A named, schema-described capability invocable with JSON arguments.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the arguments object.
    fn input_schema(&self) -> Value;

    /// Run the tool. Errors are reported to the caller as a failed result.
    async fn invoke(&self, arguments: Value) -> Result<String>;
}

/// Tool handlers by name, in registration order.
#[derive(Default)]
pub struct ToolRouter {
    handlers: Vec<Arc<dyn ToolHandler>>,
    index: HashMap<String, usize>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Names must be unique.
    pub fn register(&mut self, handler: impl ToolHandler + 'static) -> Result<()> {
        let name = handler.name().to_string();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateTool(name));
        }
        self.index.insert(name, self.handlers.len());
        self.handlers.push(Arc::new(handler));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, handler: impl ToolHandler + 'static) -> Result<Self> {
        self.register(handler)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Tool descriptors as advertised by `tools/list`.
    pub fn definitions(&self) -> Vec<Tool> {
        self.handlers
            .iter()
            .map(|handler| Tool {
                name: handler.name().to_string(),
                description: Some(handler.description().to_string()),
                input_schema: handler.input_schema(),
            })
            .collect()
    }

    /// Resolve a handler by name and invoke it.
    pub async fn call(&self, name: &str, arguments: Value) -> Result<String> {
        let handler = self
            .index
            .get(name)
            .map(|&i| Arc::clone(&self.handlers[i]))
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;
        handler.invoke(arguments).await
    }
}

/// Serves a [`ToolRouter`] over a JSON-RPC stream.
pub struct Provider {
    info: Implementation,
    router: ToolRouter,
    initialized: bool,
}

impl Provider {
    pub fn new(name: impl Into<String>, version: impl Into<String>, router: ToolRouter) -> Self {
        Self {
            info: Implementation {
                name: name.into(),
                version: Some(version.into()),
            },
            router,
            initialized: false,
        }
    }

    /// Serve on the process's stdin/stdout.
    pub async fn serve_stdio(self) -> io::Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve until `reader` reaches EOF.
    pub async fn serve<R, W>(mut self, reader: R, mut writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        info!(provider = %self.info.name, tools = self.router.len(), "serving tools");
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let reply = match serde_json::from_str::<JsonRpcMessage>(&line) {
                Ok(JsonRpcMessage::Request(request)) => Some(self.handle_request(request).await),
                Ok(JsonRpcMessage::Notification(notification)) => {
                    debug!(method = %notification.method, "notification");
                    None
                }
                Ok(JsonRpcMessage::Response(response)) => {
                    debug!(id = %response.id, "ignoring unsolicited response");
                    None
                }
                Err(e) => {
                    warn!("malformed message: {e}");
                    let error = JsonRpcError::new(JsonRpcError::PARSE_ERROR, e.to_string());
                    Some(json!({ "jsonrpc": "2.0", "id": null, "error": error }))
                }
            };

            if let Some(reply) = reply {
                let mut bytes = serde_json::to_vec(&reply)?;
                bytes.push(b'\n');
                writer.write_all(&bytes).await?;
                writer.flush().await?;
            }
        }

        info!(provider = %self.info.name, "input closed, stopping");
        Ok(())
    }

    async fn handle_request(&mut self, request: JsonRpcRequest) -> Value {
        let id = request.id.clone();
        let outcome = match request.method.as_str() {
            "initialize" => Ok(self.handle_initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(request.params).await,
            method => Err(JsonRpcError::method_not_found(method)),
        };

        let response = match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(error) => JsonRpcResponse::failure(id, error),
        };
        serde_json::to_value(response).unwrap_or(Value::Null)
    }

    fn handle_initialize(&mut self) -> Value {
        self.initialized = true;
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                ..ServerCapabilities::default()
            },
            server_info: self.info.clone(),
        };
        serde_json::to_value(result).unwrap_or(Value::Null)
    }

    fn require_initialized(&self) -> std::result::Result<(), JsonRpcError> {
        if self.initialized {
            Ok(())
        } else {
            Err(JsonRpcError::new(
                JsonRpcError::INVALID_REQUEST,
                "server not initialized",
            ))
        }
    }

    fn handle_tools_list(&self) -> std::result::Result<Value, JsonRpcError> {
        self.require_initialized()?;
        let result = ListToolsResult {
            tools: self.router.definitions(),
            next_cursor: None,
        };
        Ok(serde_json::to_value(result).unwrap_or(Value::Null))
    }

    async fn handle_tools_call(
        &self,
        params: Option<Value>,
    ) -> std::result::Result<Value, JsonRpcError> {
        self.require_initialized()?;

        let params: CallToolParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| JsonRpcError::invalid_params(format!("invalid tool call params: {e}")))?
            .ok_or_else(|| JsonRpcError::invalid_params("missing tool call params"))?;

        let arguments = params
            .arguments
            .unwrap_or_else(|| Value::Object(Default::default()));

        let result = match self.router.call(&params.name, arguments).await {
            Ok(text) => CallToolResult::text(text),
            Err(Error::ToolNotFound(name)) => {
                return Err(JsonRpcError::invalid_params(format!("unknown tool: {name}")));
            }
            Err(e) => {
                warn!(tool = %params.name, "tool failed: {e}");
                CallToolResult::error(e.to_string())
            }
        };

        Ok(serde_json::to_value(result).unwrap_or(Value::Null))
    }
}
