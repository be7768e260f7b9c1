//! Anthropic Messages API client.
//!
//! Supports native tool use and prompt caching. Cacheable system segments are
//! marked `ephemeral` so repeated turns reuse the persona and rules text;
//! the per-turn game state tail is never cached.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infrastructure::ports::{
    ChatMessage, ContentBlock, FinishReason, LlmError, MessageContent, MessageRole, ModelBackend,
    ModelRequest, ModelResponse, SystemPrompt, TextStream, TokenUsage, ToolCall, ToolDefinition,
};
use crate::infrastructure::streaming;

/// Default Anthropic API base URL.
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Default model for Anthropic.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-5-sonnet-20241022";

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 300;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Client for the Anthropic Messages API.
#[derive(Clone)]
pub struct AnthropicClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    enable_caching: bool,
}

impl AnthropicClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        // Use 120 second timeout for LLM requests (they can be slow)
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        let enable_caching = std::env::var("ENABLE_PROMPT_CACHING")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            enable_caching,
        }
    }

    /// Override the caching flag (for testing).
    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.enable_caching = enabled;
        self
    }

    async fn send(
        &self,
        request: ModelRequest,
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ModelResponse, LlmError> {
        let has_tools = tools.is_some_and(|t| !t.is_empty());

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            messages: build_messages(&request.messages),
            system: self.build_system(request.system_prompt.as_ref(), has_tools),
            tools: tools.filter(|t| !t.is_empty()).map(|ts| {
                ts.iter()
                    .map(|t| WireTool {
                        name: &t.name,
                        description: &t.description,
                        input_schema: &t.parameters,
                    })
                    .collect()
            }),
            stream: None,
        };

        let response = self.post_messages(&body).await?;

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        Ok(convert_response(parsed))
    }

    async fn post_messages(&self, body: &MessagesRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!("HTTP {status}: {text}")));
        }

        Ok(response)
    }

    /// Build the system parameter.
    ///
    /// When caching is enabled and no tools are in play, the system prompt is
    /// sent as an array of blocks with `cache_control` markers. Tool requests
    /// use a flat string, which the API handles more predictably.
    fn build_system(&self, prompt: Option<&SystemPrompt>, has_tools: bool) -> Option<SystemParam> {
        let prompt = prompt.filter(|p| !p.is_empty())?;

        if self.enable_caching && !has_tools {
            let mut blocks: Vec<SystemBlock> = prompt
                .cacheable
                .iter()
                .filter(|s| !s.trim().is_empty())
                .map(|s| SystemBlock {
                    kind: "text",
                    text: s.clone(),
                    cache_control: Some(CacheControl { kind: "ephemeral" }),
                })
                .collect();
            if let Some(tail) = prompt.tail.as_ref().filter(|s| !s.trim().is_empty()) {
                blocks.push(SystemBlock {
                    kind: "text",
                    text: tail.trim().to_string(),
                    cache_control: None,
                });
            }
            Some(SystemParam::Blocks(blocks))
        } else {
            Some(SystemParam::Text(prompt.flattened()))
        }
    }
}

#[async_trait]
impl ModelBackend for AnthropicClient {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, LlmError> {
        self.send(request, None).await
    }

    async fn generate_with_tools(
        &self,
        request: ModelRequest,
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LlmError> {
        self.send(request, Some(tools)).await
    }

    async fn generate_stream(&self, request: ModelRequest) -> Result<TextStream, LlmError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            messages: build_messages(&request.messages),
            system: self.build_system(request.system_prompt.as_ref(), false),
            tools: None,
            stream: Some(true),
        };

        let response = self.post_messages(&body).await?;

        Ok(streaming::text_chunks(response.bytes_stream(), sse_delta_text))
    }

    fn supports_native_tools(&self) -> bool {
        true
    }
}

/// Convert conversation messages to wire format.
///
/// System-role messages are carried in the separate `system` parameter, and
/// the API rejects empty message content, so both are dropped here.
fn build_messages(messages: &[ChatMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .filter(|m| m.role != MessageRole::System && !m.is_empty())
        .map(|m| WireMessage {
            role: match m.role {
                MessageRole::Assistant => "assistant",
                _ => "user",
            },
            content: match &m.content {
                MessageContent::Text(text) => WireContent::Text(text.clone()),
                MessageContent::Blocks(blocks) => {
                    WireContent::Blocks(blocks.iter().map(to_wire_block).collect())
                }
            },
        })
        .collect()
}

fn to_wire_block(block: &ContentBlock) -> WireBlock {
    match block {
        ContentBlock::Text { text } => WireBlock::Text { text: text.clone() },
        ContentBlock::ToolUse { id, name, input } => WireBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: input.clone(),
        },
        ContentBlock::ToolResult {
            tool_use_id,
            content,
        } => WireBlock::ToolResult {
            tool_use_id: tool_use_id.clone(),
            content: content.clone(),
        },
    }
}

fn convert_response(response: MessagesResponse) -> ModelResponse {
    let mut text = None;
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block {
            ResponseBlock::Text { text: t } => text = Some(t),
            ResponseBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id,
                name,
                arguments: input,
            }),
            ResponseBlock::Unknown => {}
        }
    }

    let finish_reason = if !tool_calls.is_empty() {
        FinishReason::ToolCalls
    } else if response.stop_reason.as_deref() == Some("max_tokens") {
        FinishReason::Length
    } else {
        FinishReason::Stop
    };

    let usage = response.usage.map(|u| TokenUsage {
        prompt_tokens: u.input_tokens,
        completion_tokens: u.output_tokens,
        total_tokens: u.input_tokens + u.output_tokens,
    });

    ModelResponse {
        text,
        tool_calls,
        finish_reason,
        usage,
    }
}

/// Pull the text out of one server-sent-events line.
///
/// Only `content_block_delta` events with a `text_delta` carry narration;
/// message lifecycle events, pings, and `event:` lines are dropped.
fn sse_delta_text(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?.trim();
    let event: StreamEvent = serde_json::from_str(data).ok()?;
    if event.kind != "content_block_delta" {
        return None;
    }
    let delta = event.delta?;
    (delta.kind == "text_delta" && !delta.text.is_empty()).then_some(delta.text)
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<SystemParam>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum SystemParam {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

#[derive(Serialize)]
struct SystemBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: WireContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Blocks(Vec<WireBlock>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    delta: Option<StreamDelta>,
}

#[derive(Deserialize)]
struct StreamDelta {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(caching: bool) -> AnthropicClient {
        AnthropicClient::new(DEFAULT_ANTHROPIC_BASE_URL, "test-key", "test-model")
            .with_caching(caching)
    }

    fn three_part_prompt() -> SystemPrompt {
        SystemPrompt {
            cacheable: vec!["persona".to_string(), "rules".to_string()],
            tail: Some("current state".to_string()),
        }
    }

    #[test]
    fn test_system_blocks_cached_without_tools() {
        let system = client(true)
            .build_system(Some(&three_part_prompt()), false)
            .unwrap();
        let json = serde_json::to_value(&system).unwrap();

        let blocks = json.as_array().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0]["cache_control"]["type"], "ephemeral");
        assert_eq!(blocks[1]["cache_control"]["type"], "ephemeral");
        assert!(blocks[2].get("cache_control").is_none());
        assert_eq!(blocks[2]["text"], "current state");
    }

    #[test]
    fn test_system_flattened_when_tools_present() {
        let system = client(true)
            .build_system(Some(&three_part_prompt()), true)
            .unwrap();
        let json = serde_json::to_value(&system).unwrap();
        assert_eq!(json, serde_json::json!("persona\n\nrules\n\ncurrent state"));
    }

    #[test]
    fn test_system_flattened_when_caching_disabled() {
        let system = client(false)
            .build_system(Some(&three_part_prompt()), false)
            .unwrap();
        let json = serde_json::to_value(&system).unwrap();
        assert!(json.is_string());
    }

    #[test]
    fn test_system_omitted_when_empty() {
        assert!(client(true).build_system(None, false).is_none());
        assert!(client(true)
            .build_system(Some(&SystemPrompt::default()), false)
            .is_none());
    }

    #[test]
    fn test_build_messages_skips_system_and_empty() {
        let messages = vec![
            ChatMessage::system("persona"),
            ChatMessage::user("attack"),
            ChatMessage::assistant("   "),
            ChatMessage::assistant("the goblin falls"),
        ];
        let wire = build_messages(&messages);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0].role, "user");
        assert_eq!(wire[1].role, "assistant");
    }

    #[test]
    fn test_tool_use_round_trip_blocks() {
        let messages = vec![ChatMessage::blocks(
            MessageRole::Assistant,
            vec![
                ContentBlock::Text {
                    text: "Rolling...".to_string(),
                },
                ContentBlock::ToolUse {
                    id: "toolu_1".to_string(),
                    name: "roll_dice".to_string(),
                    input: serde_json::json!({"dice": "1d20"}),
                },
            ],
        )];
        let wire = build_messages(&messages);
        let json = serde_json::to_value(&wire[0].content).unwrap();
        assert_eq!(json[0]["type"], "text");
        assert_eq!(json[1]["type"], "tool_use");
        assert_eq!(json[1]["input"]["dice"], "1d20");
    }

    #[test]
    fn test_convert_response_stop_reasons() {
        let stopped = MessagesResponse {
            content: vec![ResponseBlock::Text {
                text: "done".to_string(),
            }],
            stop_reason: Some("end_turn".to_string()),
            usage: Some(WireUsage {
                input_tokens: 10,
                output_tokens: 5,
            }),
        };
        let converted = convert_response(stopped);
        assert_eq!(converted.finish_reason, FinishReason::Stop);
        assert_eq!(converted.usage.unwrap().total_tokens, 15);

        let truncated = MessagesResponse {
            content: vec![ResponseBlock::Text {
                text: "cut off".to_string(),
            }],
            stop_reason: Some("max_tokens".to_string()),
            usage: None,
        };
        assert_eq!(
            convert_response(truncated).finish_reason,
            FinishReason::Length
        );

        let with_tools = MessagesResponse {
            content: vec![ResponseBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "skill_check".to_string(),
                input: serde_json::json!({"character": "Thorin", "skill": "perception", "dc": 15}),
            }],
            stop_reason: Some("tool_use".to_string()),
            usage: None,
        };
        let converted = convert_response(with_tools);
        assert_eq!(converted.finish_reason, FinishReason::ToolCalls);
        assert_eq!(converted.tool_calls.len(), 1);
        assert_eq!(converted.tool_calls[0].name, "skill_check");
    }

    #[test]
    fn test_sse_delta_takes_text_deltas_only() {
        let delta = r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"The dragon"}}"#;
        assert_eq!(sse_delta_text(delta).as_deref(), Some("The dragon"));

        let stop = r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"}}"#;
        assert!(sse_delta_text(stop).is_none());
        assert!(sse_delta_text(r#"data: {"type":"ping"}"#).is_none());
        assert!(sse_delta_text("event: content_block_delta").is_none());
    }
}
