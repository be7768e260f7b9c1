//! OpenAI-compatible chat completions client.
//!
//! Serves OpenAI itself plus every provider speaking the same wire format
//! (LM Studio, OpenRouter). Tool calls arrive with JSON-encoded argument
//! strings that are parsed before crossing the port boundary.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infrastructure::ports::{
    ChatMessage, ContentBlock, FinishReason, LlmError, MessageContent, MessageRole, ModelBackend,
    ModelRequest, ModelResponse, TextStream, TokenUsage, ToolCall, ToolDefinition,
};
use crate::infrastructure::streaming;

/// Default OpenAI API base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model for OpenAI.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4-turbo-preview";

/// Client for OpenAI-compatible chat completion APIs.
#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        // Use 120 second timeout for LLM requests (they can be slow)
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    async fn send(
        &self,
        request: ModelRequest,
        tools: Option<&[ToolDefinition]>,
    ) -> Result<ModelResponse, LlmError> {
        let tools = tools.filter(|t| !t.is_empty());

        let body = ChatRequest {
            model: &self.model,
            messages: build_messages(&request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: tools.map(|ts| {
                ts.iter()
                    .map(|t| ChatTool {
                        kind: "function",
                        function: ChatFunction {
                            name: &t.name,
                            description: &t.description,
                            parameters: &t.parameters,
                        },
                    })
                    .collect()
            }),
            tool_choice: tools.map(|_| "auto"),
            stream: None,
        };

        let response = self.post_completions(&body).await?;

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        convert_response(parsed)
    }

    async fn post_completions(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
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
}

#[async_trait]
impl ModelBackend for OpenAiClient {
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
        let body = ChatRequest {
            model: &self.model,
            messages: build_messages(&request),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            tools: None,
            tool_choice: None,
            stream: Some(true),
        };

        let response = self.post_completions(&body).await?;

        Ok(streaming::text_chunks(response.bytes_stream(), sse_delta_text))
    }

    fn supports_native_tools(&self) -> bool {
        true
    }
}

/// Convert to the chat completions message list.
///
/// Structured blocks map onto the OpenAI convention: assistant tool-use
/// becomes `tool_calls` on an assistant message, and each tool result becomes
/// its own `tool`-role message referencing the originating call id.
fn build_messages(request: &ModelRequest) -> Vec<ChatWireMessage> {
    let mut messages = Vec::new();

    if let Some(system) = request.system_prompt.as_ref().filter(|p| !p.is_empty()) {
        messages.push(ChatWireMessage::text("system", system.flattened()));
    }

    for msg in request.messages.iter().filter(|m| !m.is_empty()) {
        match (&msg.role, &msg.content) {
            (MessageRole::System, MessageContent::Text(text)) => {
                messages.push(ChatWireMessage::text("system", text.clone()));
            }
            (MessageRole::User, MessageContent::Text(text)) => {
                messages.push(ChatWireMessage::text("user", text.clone()));
            }
            (MessageRole::Assistant, MessageContent::Text(text)) => {
                messages.push(ChatWireMessage::text("assistant", text.clone()));
            }
            (MessageRole::Assistant, MessageContent::Blocks(blocks)) => {
                let text: Vec<&str> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                let tool_calls: Vec<RequestToolCall> = blocks
                    .iter()
                    .filter_map(|b| match b {
                        ContentBlock::ToolUse { id, name, input } => Some(RequestToolCall {
                            id: id.clone(),
                            kind: "function",
                            function: RequestFunctionCall {
                                name: name.clone(),
                                arguments: input.to_string(),
                            },
                        }),
                        _ => None,
                    })
                    .collect();
                messages.push(ChatWireMessage {
                    role: "assistant",
                    content: (!text.is_empty()).then(|| text.join("\n")),
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                    tool_call_id: None,
                });
            }
            (_, MessageContent::Blocks(blocks)) => {
                for block in blocks {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                    } = block
                    {
                        messages.push(ChatWireMessage {
                            role: "tool",
                            content: Some(content.clone()),
                            tool_calls: None,
                            tool_call_id: Some(tool_use_id.clone()),
                        });
                    }
                }
            }
        }
    }

    messages
}

fn convert_response(response: ChatResponse) -> Result<ModelResponse, LlmError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("No choices in response".to_string()))?;

    let mut tool_calls = Vec::new();
    for tc in choice.message.tool_calls.unwrap_or_default() {
        let arguments = if tc.function.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&tc.function.arguments).map_err(|e| {
                LlmError::InvalidResponse(format!("Tool call arguments are not valid JSON: {e}"))
            })?
        };
        tool_calls.push(ToolCall {
            id: tc.id,
            name: tc.function.name,
            arguments,
        });
    }

    let finish_reason = if !tool_calls.is_empty() {
        FinishReason::ToolCalls
    } else {
        match choice.finish_reason.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Unknown,
        }
    };

    let usage = response.usage.map(|u| TokenUsage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    Ok(ModelResponse {
        text: choice.message.content,
        tool_calls,
        finish_reason,
        usage,
    })
}

/// Pull the text delta out of one server-sent-events line.
///
/// Non-`data:` lines, the role-only preamble chunk, and the `[DONE]`
/// terminator carry no text.
fn sse_delta_text(line: &str) -> Option<String> {
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return None;
    }
    let chunk: StreamChunk = serde_json::from_str(data).ok()?;
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty())
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatWireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Serialize)]
struct ChatWireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<RequestToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatWireMessage {
    fn text(role: &'static str, content: String) -> Self {
        Self {
            role,
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Serialize)]
struct RequestToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: RequestFunctionCall,
}

#[derive(Serialize)]
struct RequestFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct ChatTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ChatFunction<'a>,
}

#[derive(Serialize)]
struct ChatFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunctionCall,
}

#[derive(Deserialize)]
struct ResponseFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::SystemPrompt;

    #[test]
    fn test_system_prompt_leads_message_list() {
        let request = ModelRequest::new(vec![ChatMessage::user("hello")])
            .with_system_prompt(SystemPrompt::plain("be a narrator"));
        let messages = build_messages(&request);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
    }

    #[test]
    fn test_tool_blocks_map_to_openai_convention() {
        let request = ModelRequest::new(vec![
            ChatMessage::user("attack the goblin"),
            ChatMessage::blocks(
                MessageRole::Assistant,
                vec![ContentBlock::ToolUse {
                    id: "call_1".to_string(),
                    name: "attack_roll".to_string(),
                    input: serde_json::json!({"attacker": "Thorin", "target": "Goblin"}),
                }],
            ),
            ChatMessage::blocks(
                MessageRole::User,
                vec![ContentBlock::ToolResult {
                    tool_use_id: "call_1".to_string(),
                    content: "{\"hit\": true}".to_string(),
                }],
            ),
        ]);

        let messages = build_messages(&request);
        assert_eq!(messages.len(), 3);

        let assistant = &messages[1];
        assert_eq!(assistant.role, "assistant");
        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.name, "attack_roll");

        let tool = &messages[2];
        assert_eq!(tool.role, "tool");
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_convert_parses_tool_call_arguments() {
        let response = ChatResponse {
            choices: vec![ChatChoice {
                message: ResponseMessage {
                    content: None,
                    tool_calls: Some(vec![ResponseToolCall {
                        id: "call_9".to_string(),
                        function: ResponseFunctionCall {
                            name: "roll_dice".to_string(),
                            arguments: "{\"dice\": \"2d6+3\"}".to_string(),
                        },
                    }]),
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
            usage: None,
        };

        let converted = convert_response(response).unwrap();
        assert_eq!(converted.finish_reason, FinishReason::ToolCalls);
        assert_eq!(converted.tool_calls[0].arguments["dice"], "2d6+3");
    }

    #[test]
    fn test_convert_rejects_malformed_arguments() {
        let response = ChatResponse {
            choices: vec![ChatChoice {
                message: ResponseMessage {
                    content: None,
                    tool_calls: Some(vec![ResponseToolCall {
                        id: "call_9".to_string(),
                        function: ResponseFunctionCall {
                            name: "roll_dice".to_string(),
                            arguments: "{not json".to_string(),
                        },
                    }]),
                },
                finish_reason: None,
            }],
            usage: None,
        };

        assert!(matches!(
            convert_response(response),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_convert_empty_arguments_default_to_object() {
        let response = ChatResponse {
            choices: vec![ChatChoice {
                message: ResponseMessage {
                    content: None,
                    tool_calls: Some(vec![ResponseToolCall {
                        id: "call_2".to_string(),
                        function: ResponseFunctionCall {
                            name: "end_combat".to_string(),
                            arguments: String::new(),
                        },
                    }]),
                },
                finish_reason: None,
            }],
            usage: None,
        };

        let converted = convert_response(response).unwrap();
        assert_eq!(converted.tool_calls[0].arguments, serde_json::json!({}));
    }

    #[test]
    fn test_convert_finish_reasons() {
        for (wire, expected) in [
            ("stop", FinishReason::Stop),
            ("length", FinishReason::Length),
            ("content_filter", FinishReason::ContentFilter),
            ("weird", FinishReason::Unknown),
        ] {
            let response = ChatResponse {
                choices: vec![ChatChoice {
                    message: ResponseMessage {
                        content: Some("text".to_string()),
                        tool_calls: None,
                    },
                    finish_reason: Some(wire.to_string()),
                }],
                usage: None,
            };
            assert_eq!(convert_response(response).unwrap().finish_reason, expected);
        }
    }

    #[test]
    fn test_convert_no_choices_is_invalid() {
        let response = ChatResponse {
            choices: vec![],
            usage: None,
        };
        assert!(matches!(
            convert_response(response),
            Err(LlmError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_sse_delta_extracts_content() {
        let line = r#"data: {"id":"c1","choices":[{"index":0,"delta":{"content":"The goblin"},"finish_reason":null}]}"#;
        assert_eq!(sse_delta_text(line).as_deref(), Some("The goblin"));
    }

    #[test]
    fn test_sse_delta_skips_preamble_terminator_and_comments() {
        let preamble = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(sse_delta_text(preamble).is_none());
        assert!(sse_delta_text("data: [DONE]").is_none());
        assert!(sse_delta_text(": keep-alive").is_none());
        assert!(sse_delta_text(r#"data: {"choices":[]}"#).is_none());
    }
}
