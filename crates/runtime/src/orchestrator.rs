//! Drives one user query through the completion service and the tool host.

use tracing::{debug, info, warn};

use crate::conversation::Conversation;
use crate::llm::{Backend, ContentBlock, Message, ModelRequest, ModelResponse};
use crate::tools::{ToolHost, ToolRegistry};
use crate::Result;

pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Model parameters sent with every completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSettings {
    pub model: String,
    pub max_tokens: u32,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Interleaves model output with tool calls for one query at a time.
///
/// No state survives between queries: each call to
/// [`process_query`](Self::process_query) starts from the query text alone.
pub struct Orchestrator<B, H> {
    backend: B,
    host: H,
    settings: CompletionSettings,
}

impl<B: Backend, H: ToolHost> Orchestrator<B, H> {
    pub fn new(backend: B, host: H, settings: CompletionSettings) -> Self {
        Self {
            backend,
            host,
            settings,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn settings(&self) -> &CompletionSettings {
        &self.settings
    }

    /// Give back the tool host so its owner can shut it down.
    pub fn into_host(self) -> H {
        self.host
    }

    /// Answer one query, calling tools as the model requests them.
    ///
    /// Each `ToolUse` in the model's first response is executed in order and
    /// followed by exactly one continuation call; only the first block of that
    /// continuation is reported, and tool requests inside it are not followed.
    pub async fn process_query(&self, query: &str) -> Result<String> {
        let mut conversation = Conversation::new(query);

        let registry = ToolRegistry::new(self.host.list_tools().await?);
        debug!(tools = ?registry.names(), "refreshed tool registry");

        let response = self.complete(&conversation, &registry).await?;

        let mut output = Vec::new();
        let mut assistant = Vec::new();

        for block in response.content {
            match block {
                ContentBlock::Text { text } => {
                    output.push(text.clone());
                    assistant.push(ContentBlock::Text { text });
                }
                ContentBlock::ToolUse { id, name, input } => {
                    assistant.push(ContentBlock::tool_use(id.clone(), name.clone(), input.clone()));
                    conversation.push(Message::assistant(std::mem::take(&mut assistant)))?;

                    info!(tool = %name, "calling tool");
                    let result = self.host.call_tool(&name, &input).await?;
                    conversation.push(Message::tool_result(id, result))?;
                    output.push(format!("[Calling tool {name} with args {input}]"));

                    let continuation = self.complete(&conversation, &registry).await?;
                    match continuation.content.first() {
                        Some(ContentBlock::Text { text }) => output.push(text.clone()),
                        Some(other) => {
                            warn!(block = ?other, "continuation did not start with text, skipping");
                        }
                        None => warn!("continuation was empty"),
                    }
                }
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    warn!(%tool_use_id, "ignoring tool result block in model output");
                }
            }
        }

        Ok(output.join("\n"))
    }

    async fn complete(
        &self,
        conversation: &Conversation,
        registry: &ToolRegistry,
    ) -> Result<ModelResponse> {
        let request = ModelRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            messages: conversation.messages(),
            tools: registry.specs(),
        };
        Ok(self.backend.complete(request).await?)
    }
}
