//! Anthropic API backend.

use std::time::Duration;

use crate::llm::{
    Backend, ContentBlock, Message, ModelError, ModelRequest, ModelResponse, Role, ToolSpec, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const ANTHROPIC_API_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default per-request timeout for completion calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ApiContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiResponseBlock>,
    #[serde(default)]
    usage: ApiUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an Anthropic backend.
#[derive(Debug, Clone)]
pub struct AnthropicBackendBuilder {
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl AnthropicBackendBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<AnthropicBackend, ModelError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ModelError::Network(e.to_string()))?;

        let base_url = self.base_url.trim_end_matches('/');
        Ok(AnthropicBackend {
            client,
            api_key: self.api_key,
            endpoint: format!("{base_url}/v1/messages"),
        })
    }
}

/// Anthropic Messages API backend.
pub struct AnthropicBackend {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl AnthropicBackend {
    pub fn builder(api_key: impl Into<String>) -> AnthropicBackendBuilder {
        AnthropicBackendBuilder::new(api_key)
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn message_to_api(msg: &Message) -> ApiMessage {
        let role = Self::role_to_api(msg.role);

        // Simple case: single text block
        if let [ContentBlock::Text { text }] = msg.content.as_slice() {
            return ApiMessage {
                role,
                content: ApiContent::Text(text.clone()),
            };
        }

        let blocks = msg
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => ApiContentBlock::Text { text: text.clone() },
                ContentBlock::ToolUse { id, name, input } => ApiContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                },
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                } => ApiContentBlock::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: content.clone(),
                },
            })
            .collect();

        ApiMessage {
            role,
            content: ApiContent::Blocks(blocks),
        }
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool<'_> {
        ApiTool {
            name: &spec.name,
            description: &spec.description,
            input_schema: &spec.input_schema,
        }
    }

    fn response_to_blocks(blocks: Vec<ApiResponseBlock>) -> Vec<ContentBlock> {
        blocks
            .into_iter()
            .filter_map(|block| match block {
                ApiResponseBlock::Text { text } => Some(ContentBlock::Text { text }),
                ApiResponseBlock::ToolUse { id, name, input } => {
                    Some(ContentBlock::ToolUse { id, name, input })
                }
                ApiResponseBlock::Unknown => None,
            })
            .collect()
    }
}

impl std::fmt::Display for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anthropic({})", self.endpoint)
    }
}

impl Backend for AnthropicBackend {
    async fn complete(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let api_request = ApiRequest {
            model: request.model,
            max_tokens: request.max_tokens,
            messages: request.messages.iter().map(Self::message_to_api).collect(),
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else {
                    ModelError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let usage = Usage {
            input_tokens: api_response.usage.input_tokens,
            output_tokens: api_response.usage.output_tokens,
        };
        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "completion finished"
        );

        Ok(ModelResponse {
            content: Self::response_to_blocks(api_response.content),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn weather_tool() -> ToolSpec {
        ToolSpec {
            name: "get_alerts".into(),
            description: "Get weather alerts for a US state".into(),
            input_schema: json!({"type": "object", "properties": {"state": {"type": "string"}}}),
        }
    }

    #[test]
    fn tool_exchange_serializes_as_blocks() {
        let assistant = Message::assistant(vec![
            ContentBlock::text("Checking."),
            ContentBlock::tool_use("toolu_1", "get_alerts", json!({"state": "CA"})),
        ]);
        let api = serde_json::to_value(AnthropicBackend::message_to_api(&assistant)).unwrap();
        assert_eq!(api["role"], "assistant");
        assert_eq!(api["content"][1]["type"], "tool_use");
        assert_eq!(api["content"][1]["input"]["state"], "CA");

        let result = Message::tool_result("toolu_1", "No active alerts");
        let api = serde_json::to_value(AnthropicBackend::message_to_api(&result)).unwrap();
        assert_eq!(api["role"], "user");
        assert_eq!(api["content"][0]["type"], "tool_result");
        assert_eq!(api["content"][0]["tool_use_id"], "toolu_1");
    }

    #[test]
    fn single_text_message_is_plain_string() {
        let api = serde_json::to_value(AnthropicBackend::message_to_api(&Message::user("hi")))
            .unwrap();
        assert_eq!(api, json!({"role": "user", "content": "hi"}));
    }

    #[tokio::test]
    async fn complete_parses_text_and_tool_use() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .and(body_partial_json(json!({
                "model": "claude-3-5-sonnet-20241022",
                "max_tokens": 1000,
                "tools": [{"name": "get_alerts"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "content": [
                    {"type": "text", "text": "Let me check."},
                    {"type": "thinking", "thinking": "..."},
                    {"type": "tool_use", "id": "toolu_1", "name": "get_alerts", "input": {"state": "CA"}}
                ],
                "stop_reason": "tool_use",
                "usage": {"input_tokens": 12, "output_tokens": 34}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = AnthropicBackend::builder("test-key")
            .base_url(server.uri())
            .build()
            .unwrap();
        let messages = [Message::user("Any alerts in California?")];
        let tools = [weather_tool()];
        let response = backend
            .complete(ModelRequest {
                model: "claude-3-5-sonnet-20241022",
                max_tokens: 1000,
                messages: &messages,
                tools: &tools,
            })
            .await
            .unwrap();

        assert_eq!(
            response.content,
            vec![
                ContentBlock::text("Let me check."),
                ContentBlock::tool_use("toolu_1", "get_alerts", json!({"state": "CA"})),
            ]
        );
        assert_eq!(response.usage.output_tokens, 34);
    }

    #[tokio::test]
    async fn api_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid x-api-key"))
            .mount(&server)
            .await;

        let backend = AnthropicBackend::builder("bad")
            .base_url(server.uri())
            .build()
            .unwrap();
        let messages = [Message::user("hi")];
        let err = backend
            .complete(ModelRequest {
                model: "m",
                max_tokens: 10,
                messages: &messages,
                tools: &[],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ModelError::Api(ref body) if body.contains("401")));
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"content": []}))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let backend = AnthropicBackend::builder("key")
            .base_url(server.uri())
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let messages = [Message::user("hi")];
        let err = backend
            .complete(ModelRequest {
                model: "m",
                max_tokens: 10,
                messages: &messages,
                tools: &[],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ModelError::Timeout), "unexpected error: {err}");
    }
}
