//! Ollama client for local models.
//!
//! Ollama's `/api/generate` endpoint has no native tool calling, so tool
//! definitions are injected into the system prompt and replies are scanned
//! for JSON tool invocations. Responses are capped small because local
//! models are slow.

use async_trait::async_trait;
use regex_lite::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::infrastructure::ports::{
    ChatMessage, ContentBlock, FinishReason, LlmError, MessageContent, MessageRole, ModelBackend,
    ModelRequest, ModelResponse, TextStream, ToolCall, ToolDefinition,
};
use crate::infrastructure::streaming;

/// Default Ollama base URL.
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Default model for Ollama.
pub const DEFAULT_OLLAMA_MODEL: &str = "phi3:mini";

/// Hard cap on completion length. Local models take seconds per hundred
/// tokens, so long generations stall the whole turn.
const NUM_PREDICT_CAP: u32 = 200;

const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Tools worth advertising to a small local model. More than a handful of
/// schemas bloats the prompt and tanks generation speed.
const ESSENTIAL_TOOLS: [&str; 3] = ["roll_dice", "skill_check", "attack_roll"];

/// Client for Ollama's generate API.
#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str) -> Self {
        // Use 120 second timeout for LLM requests (they can be slow)
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create client with custom timeout (for testing).
    pub fn with_timeout(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        }
    }

    /// Create client from environment variables.
    ///
    /// Uses `OLLAMA_URL` (or `OLLAMA_BASE_URL`) and `OLLAMA_MODEL`,
    /// falling back to defaults if not set.
    pub fn from_env() -> Self {
        let base_url = std::env::var("OLLAMA_URL")
            .or_else(|_| std::env::var("OLLAMA_BASE_URL"))
            .unwrap_or_else(|_| DEFAULT_OLLAMA_BASE_URL.to_string());
        let model =
            std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_OLLAMA_MODEL.to_string());
        Self::new(&base_url, &model)
    }

    fn build_body<'a>(
        &'a self,
        prompt: String,
        request: &ModelRequest,
        stream: bool,
    ) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream,
            options: GenerateOptions {
                temperature: request.temperature.unwrap_or(DEFAULT_TEMPERATURE),
                num_predict: request.max_tokens.unwrap_or(NUM_PREDICT_CAP).min(NUM_PREDICT_CAP),
            },
        }
    }

    async fn post_generate(&self, body: &GenerateRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed(format!(
                "Ollama API error: {status} - {text}"
            )));
        }

        Ok(response)
    }

    async fn send(&self, prompt: String, request: &ModelRequest) -> Result<GenerateResponse, LlmError> {
        let body = self.build_body(prompt, request, false);
        let response = self.post_generate(&body).await?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        if parsed.response.is_empty() {
            return Err(LlmError::InvalidResponse(
                "Ollama returned empty response".to_string(),
            ));
        }

        Ok(parsed)
    }
}

#[async_trait]
impl ModelBackend for OllamaClient {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, LlmError> {
        let system = request
            .system_prompt
            .as_ref()
            .map(|p| p.flattened())
            .unwrap_or_default();
        let prompt = build_prompt(&system, &request.messages);
        let data = self.send(prompt, &request).await?;

        let finish_reason = if data.done_reason.as_deref() == Some("length") {
            FinishReason::Length
        } else {
            FinishReason::Stop
        };

        Ok(ModelResponse {
            text: Some(data.response),
            tool_calls: Vec::new(),
            finish_reason,
            usage: None,
        })
    }

    async fn generate_with_tools(
        &self,
        request: ModelRequest,
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LlmError> {
        let system = request
            .system_prompt
            .as_ref()
            .map(|p| p.flattened())
            .unwrap_or_default();
        let system = render_tools_into_system(&system, tools);
        let prompt = build_prompt(&system, &request.messages);
        let data = self.send(prompt, &request).await?;

        let (text, tool_calls) = extract_tool_calls(&data.response);

        let finish_reason = if !tool_calls.is_empty() {
            FinishReason::ToolCalls
        } else if data.done_reason.as_deref() == Some("length") {
            FinishReason::Length
        } else {
            FinishReason::Stop
        };

        Ok(ModelResponse {
            text,
            tool_calls,
            finish_reason,
            usage: None,
        })
    }

    async fn generate_stream(&self, request: ModelRequest) -> Result<TextStream, LlmError> {
        let system = request
            .system_prompt
            .as_ref()
            .map(|p| p.flattened())
            .unwrap_or_default();
        let prompt = build_prompt(&system, &request.messages);
        let body = self.build_body(prompt, &request, true);
        let response = self.post_generate(&body).await?;

        Ok(streaming::text_chunks(response.bytes_stream(), stream_line_text))
    }

    fn supports_native_tools(&self) -> bool {
        false
    }
}

/// Flatten the conversation into a plain transcript prompt.
fn build_prompt(system: &str, messages: &[ChatMessage]) -> String {
    let mut prompt = format!("{system}\n\n");
    for msg in messages {
        let text = flatten_content(&msg.content);
        match msg.role {
            MessageRole::User => prompt.push_str(&format!("User: {text}\n")),
            MessageRole::Assistant => prompt.push_str(&format!("Assistant: {text}\n")),
            MessageRole::System => {}
        }
    }
    prompt.push_str("Assistant: ");
    prompt
}

fn flatten_content(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => text.clone(),
                ContentBlock::ToolUse { name, input, .. } => format!("[{name}: {input}]"),
                ContentBlock::ToolResult { content, .. } => content.clone(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Describe tools in the system prompt and ask for JSON invocations.
///
/// Only the most common tools are listed; a full schema dump makes small
/// models noticeably slower and more likely to ramble.
fn render_tools_into_system(system: &str, tools: &[ToolDefinition]) -> String {
    if tools.is_empty() {
        return system.to_string();
    }

    let mut out = system.to_string();
    out.push_str("\n\n# Available Tools (use only when needed)\n\n");
    out.push_str("Format: ```json\n{\"tool\": \"name\", \"parameters\": {...}}\n```\n\n");

    for tool in tools
        .iter()
        .filter(|t| ESSENTIAL_TOOLS.contains(&t.name.as_str()))
        .take(ESSENTIAL_TOOLS.len())
    {
        out.push_str(&format!("{}: {}\n", tool.name, tool.description));
    }

    out.push_str("\nIMPORTANT: Only use tools when absolutely necessary. Prefer narrative description.\n");
    out
}

/// Scan a reply for JSON tool invocations.
///
/// Tries fenced ```json blocks first, then bare fences, then inline objects
/// with a "tool" key. The first pattern that yields calls wins, and matched
/// JSON is stripped from the narrative text.
fn extract_tool_calls(text: &str) -> (Option<String>, Vec<ToolCall>) {
    let patterns = [
        r"(?s)```json\s*(\{.*?\})\s*```",
        r"(?s)```\s*(\{.*?\})\s*```",
        r#"\{[^{}]*"tool"[^{}]*\{[^{}]*\}[^{}]*\}|\{[^{}]*"tool"[^{}]*\}"#,
    ];

    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut remaining = text.to_string();

    for pattern in patterns {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };

        let matches: Vec<(String, String)> = re
            .captures_iter(text)
            .filter_map(|caps| {
                let full = caps.get(0)?.as_str().to_string();
                let inner = caps
                    .get(1)
                    .map_or_else(|| full.clone(), |m| m.as_str().to_string());
                Some((full, inner))
            })
            .collect();

        for (full, inner) in matches {
            let Ok(serde_json::Value::Object(obj)) = serde_json::from_str(&inner) else {
                continue;
            };
            let Some(name) = obj.get("tool").and_then(|v| v.as_str()) else {
                continue;
            };

            // Parameters may be nested under "parameters" or spread across
            // the object itself.
            let arguments = match obj.get("parameters") {
                Some(serde_json::Value::Object(params)) if !params.is_empty() => {
                    serde_json::Value::Object(params.clone())
                }
                _ => {
                    let rest: serde_json::Map<String, serde_json::Value> = obj
                        .iter()
                        .filter(|(k, _)| k.as_str() != "tool" && k.as_str() != "parameters")
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect();
                    serde_json::Value::Object(rest)
                }
            };

            tool_calls.push(ToolCall {
                id: format!("ollama_{}", tool_calls.len()),
                name: name.to_string(),
                arguments,
            });
            remaining = remaining.replace(&full, "");
        }

        if !tool_calls.is_empty() {
            break;
        }
    }

    let remaining = remaining.trim().to_string();
    ((!remaining.is_empty()).then_some(remaining), tool_calls)
}

/// Decode one line of the streamed body. Each line is a standalone JSON
/// object; the closing `done` line carries an empty response.
fn stream_line_text(line: &str) -> Option<String> {
    let parsed: GenerateResponse = serde_json::from_str(line).ok()?;
    (!parsed.response.is_empty()).then_some(parsed.response)
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done_reason: Option<String>,
}
