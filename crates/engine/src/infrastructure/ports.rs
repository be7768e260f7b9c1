//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - Model backends (swap Anthropic -> OpenAI -> Ollama without touching use cases)
//! - Speech synthesis (could swap OpenAI TTS -> other)
//! - Clock (for testing)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    #[error("{operation} failed: {message}")]
    Io { operation: String, message: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn not_found(entity_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    pub fn io(operation: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// =============================================================================
// Conversation Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

/// Content of a conversation message.
///
/// Most messages are plain text. Tool-use rounds against backends with native
/// tool support carry structured blocks instead.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
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

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn blocks(role: MessageRole, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Empty messages are rejected by some provider APIs and must never be
    /// appended to a conversation log.
    pub fn is_empty(&self) -> bool {
        match &self.content {
            MessageContent::Text(text) => text.trim().is_empty(),
            MessageContent::Blocks(blocks) => blocks.is_empty(),
        }
    }

    /// Plain text of the message, if it has any.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Blocks(_) => None,
        }
    }
}

// =============================================================================
// Model Backend Types
// =============================================================================

/// System prompt split into cacheable segments and a per-turn tail.
///
/// Backends that support prompt caching (Anthropic) mark each cacheable
/// segment; everyone else joins the whole thing into one string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemPrompt {
    pub cacheable: Vec<String>,
    pub tail: Option<String>,
}

impl SystemPrompt {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            cacheable: vec![text.into()],
            tail: None,
        }
    }

    pub fn flattened(&self) -> String {
        let mut parts: Vec<&str> = self.cacheable.iter().map(String::as_str).collect();
        if let Some(tail) = &self.tail {
            parts.push(tail);
        }
        parts.join("\n\n")
    }

    pub fn is_empty(&self) -> bool {
        self.cacheable.iter().all(|s| s.trim().is_empty())
            && self.tail.as_ref().is_none_or(|s| s.trim().is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub messages: Vec<ChatMessage>,
    pub system_prompt: Option<SystemPrompt>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ModelRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            system_prompt: None,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: SystemPrompt) -> Self {
        self.system_prompt = Some(prompt);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A tool the model may call, described as a JSON schema.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Option<TokenUsage>,
}

/// Narration text delivered incrementally as the model produces it.
pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

// =============================================================================
// Ports
// =============================================================================

/// Model backend - narrative generation with optional tool calling.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, LlmError>;

    async fn generate_with_tools(
        &self,
        request: ModelRequest,
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LlmError>;

    /// Stream the narration for `request` as text increments. Tool calls are
    /// not available on this path. The default falls back to a single
    /// increment carrying the full non-streamed response.
    async fn generate_stream(&self, request: ModelRequest) -> Result<TextStream, LlmError> {
        let response = self.generate(request).await?;
        let text = response.text.filter(|t| !t.is_empty());
        Ok(stream::iter(text.map(Ok)).boxed())
    }

    /// Whether the backend carries tool calls natively on its wire format.
    /// Backends that return `false` get tool definitions injected into the
    /// system prompt and their replies scanned for JSON tool invocations.
    fn supports_native_tools(&self) -> bool;
}

/// Speech synthesis for narration. Failures degrade to silence, never errors.
#[async_trait]
pub trait SpeechPort: Send + Sync {
    /// Synthesize text, returning a URL the client can fetch, or `None` when
    /// synthesis is disabled or failed.
    async fn synthesize(&self, text: &str, voice: Option<&str>) -> Option<String>;

    /// Fetch a previously synthesized audio file by name.
    async fn audio(&self, filename: &str) -> Option<Vec<u8>>;

    /// Drop all cached audio, returning the number of files removed.
    async fn clear_cache(&self) -> usize;
}

/// Clock abstraction (for testing).
pub trait ClockPort: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_flattened_joins_segments() {
        let prompt = SystemPrompt {
            cacheable: vec!["persona".to_string(), "rules".to_string()],
            tail: Some("state".to_string()),
        };
        assert_eq!(prompt.flattened(), "persona\n\nrules\n\nstate");
    }

    #[test]
    fn test_system_prompt_plain() {
        let prompt = SystemPrompt::plain("just this");
        assert_eq!(prompt.flattened(), "just this");
        assert!(!prompt.is_empty());
        assert!(SystemPrompt::default().is_empty());
    }

    #[test]
    fn test_empty_message_detection() {
        assert!(ChatMessage::user("   ").is_empty());
        assert!(!ChatMessage::user("attack the goblin").is_empty());
        assert!(ChatMessage::blocks(MessageRole::Assistant, vec![]).is_empty());
        assert!(!ChatMessage::blocks(
            MessageRole::Assistant,
            vec![ContentBlock::Text {
                text: "hello".to_string()
            }]
        )
        .is_empty());
    }

    #[test]
    fn test_request_builders() {
        let request = ModelRequest::new(vec![ChatMessage::user("hi")])
            .with_system_prompt(SystemPrompt::plain("be brief"))
            .with_temperature(0.7)
            .with_max_tokens(300);
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(300));
        assert!(request.system_prompt.is_some());
    }

    struct CannedBackend;

    #[async_trait]
    impl ModelBackend for CannedBackend {
        async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, LlmError> {
            Ok(ModelResponse {
                text: Some("The corridor opens into a vault.".to_string()),
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
                usage: None,
            })
        }

        async fn generate_with_tools(
            &self,
            request: ModelRequest,
            _tools: &[ToolDefinition],
        ) -> Result<ModelResponse, LlmError> {
            self.generate(request).await
        }

        fn supports_native_tools(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_default_stream_yields_full_response_once() {
        let stream = CannedBackend
            .generate_stream(ModelRequest::new(vec![ChatMessage::user("look around")]))
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|chunk| chunk.unwrap()).collect().await;

        assert_eq!(chunks, vec!["The corridor opens into a vault."]);
    }
}
