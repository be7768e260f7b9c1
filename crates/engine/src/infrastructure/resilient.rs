//! Resilient model backend wrapper with exponential backoff retry
//!
//! Wraps any ModelBackend implementation with retry logic to handle
//! transient failures from LLM providers.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use crate::infrastructure::ports::{
    LlmError, ModelBackend, ModelRequest, ModelResponse, TextStream, ToolDefinition,
};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just the initial attempt)
    pub max_retries: u32,
    /// Base delay in milliseconds before first retry
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (caps exponential growth)
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) for randomizing delays to prevent thundering herd
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// Build retry config from environment variables, falling back to
    /// defaults for anything unset or unparseable.
    ///
    /// Reads `LLM_MAX_RETRIES`, `LLM_RETRY_BASE_DELAY_MS`, and
    /// `LLM_RETRY_MAX_DELAY_MS`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_retries: env_parsed("LLM_MAX_RETRIES").unwrap_or(defaults.max_retries),
            base_delay_ms: env_parsed("LLM_RETRY_BASE_DELAY_MS").unwrap_or(defaults.base_delay_ms),
            max_delay_ms: env_parsed("LLM_RETRY_MAX_DELAY_MS").unwrap_or(defaults.max_delay_ms),
            jitter_factor: defaults.jitter_factor,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Wrapper that adds retry logic to any model backend
pub struct ResilientBackend {
    inner: Arc<dyn ModelBackend>,
    config: RetryConfig,
}

impl ResilientBackend {
    /// Create a new resilient wrapper around an existing backend
    pub fn new(inner: Arc<dyn ModelBackend>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    /// Calculate delay for a given attempt number using exponential backoff with jitter
    fn calculate_delay(&self, attempt: u32) -> u64 {
        let base = self.config.base_delay_ms;
        // Exponential: base * 2^(attempt-1)
        let exponential = base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
        let capped = exponential.min(self.config.max_delay_ms);

        // Add jitter: ±jitter_factor around the delay
        let jitter_range = (capped as f64 * self.config.jitter_factor) as i64;
        if jitter_range > 0 {
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped as i64 + jitter).max(0) as u64
        } else {
            capped
        }
    }

    /// Determine if an error is retryable
    fn is_retryable(error: &LlmError) -> bool {
        match error {
            // Network/request failures are typically transient
            LlmError::RequestFailed(msg) => {
                // Don't retry on auth errors or bad requests
                !msg.contains("401")
                    && !msg.contains("403")
                    && !msg.contains("400")
                    && !msg.contains("Invalid")
            }
            // Invalid response could be transient (malformed response due to network issues)
            LlmError::InvalidResponse(_) => true,
        }
    }

    async fn execute_with_retry<T, F, Fut>(
        &self,
        operation_name: &str,
        operation: F,
    ) -> Result<T, LlmError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, LlmError>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(response) => {
                    if attempt > 0 {
                        tracing::info!(
                            attempt = attempt + 1,
                            operation = operation_name,
                            "LLM request succeeded after retry"
                        );
                    }
                    return Ok(response);
                }
                Err(e) => {
                    let is_retryable = Self::is_retryable(&e);

                    if attempt < self.config.max_retries && is_retryable {
                        let delay = self.calculate_delay(attempt + 1);
                        tracing::warn!(
                            attempt = attempt + 1,
                            max_retries = self.config.max_retries,
                            delay_ms = delay,
                            error = %e,
                            operation = operation_name,
                            "LLM request failed, retrying..."
                        );
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    } else if !is_retryable {
                        tracing::error!(
                            error = %e,
                            operation = operation_name,
                            "LLM request failed with non-retryable error"
                        );
                        return Err(e);
                    }

                    last_error = Some(e);
                }
            }
        }

        let error =
            last_error.unwrap_or_else(|| LlmError::RequestFailed("Unknown error".to_string()));
        tracing::error!(
            attempts = self.config.max_retries + 1,
            error = %error,
            operation = operation_name,
            "LLM request failed after all retry attempts"
        );
        Err(error)
    }
}

#[async_trait]
impl ModelBackend for ResilientBackend {
    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, LlmError> {
        // Clone the inner Arc and request for the retry closure
        let inner = Arc::clone(&self.inner);
        self.execute_with_retry("generate", || {
            let inner = Arc::clone(&inner);
            let request = request.clone();
            async move { inner.generate(request).await }
        })
        .await
    }

    async fn generate_with_tools(
        &self,
        request: ModelRequest,
        tools: &[ToolDefinition],
    ) -> Result<ModelResponse, LlmError> {
        let inner = Arc::clone(&self.inner);
        let tools = tools.to_vec();
        self.execute_with_retry("generate_with_tools", || {
            let inner = Arc::clone(&inner);
            let request = request.clone();
            let tools = tools.clone();
            async move { inner.generate_with_tools(request, &tools).await }
        })
        .await
    }

    /// Retries cover stream establishment only. Once the stream is handed
    /// out, a mid-stream failure surfaces as an error item, not a retry.
    async fn generate_stream(&self, request: ModelRequest) -> Result<TextStream, LlmError> {
        let inner = Arc::clone(&self.inner);
        self.execute_with_retry("generate_stream", || {
            let inner = Arc::clone(&inner);
            let request = request.clone();
            async move { inner.generate_stream(request).await }
        })
        .await
    }

    fn supports_native_tools(&self) -> bool {
        self.inner.supports_native_tools()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::FinishReason;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Mock backend that fails a configurable number of times before succeeding
    struct FailingMockBackend {
        failures_remaining: AtomicU32,
        error_type: LlmError,
    }

    impl FailingMockBackend {
        fn new(failure_count: u32, error: LlmError) -> Self {
            Self {
                failures_remaining: AtomicU32::new(failure_count),
                error_type: error,
            }
        }
    }

    #[async_trait]
    impl ModelBackend for FailingMockBackend {
        async fn generate(&self, _request: ModelRequest) -> Result<ModelResponse, LlmError> {
            let remaining = self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            if remaining > 0 {
                Err(self.error_type.clone())
            } else {
                Ok(ModelResponse {
                    text: Some("Success!".to_string()),
                    tool_calls: vec![],
                    finish_reason: FinishReason::Stop,
                    usage: None,
                })
            }
        }

        async fn generate_with_tools(
            &self,
            request: ModelRequest,
            _tools: &[ToolDefinition],
        ) -> Result<ModelResponse, LlmError> {
            self.generate(request).await
        }

        fn supports_native_tools(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_succeeds_without_retry() {
        let mock = Arc::new(FailingMockBackend::new(
            0,
            LlmError::RequestFailed("test".into()),
        ));
        let client = ResilientBackend::new(mock, RetryConfig::default());

        let request = ModelRequest::new(vec![]);
        let result = client.generate(request).await;

        assert!(result.is_ok());
        assert_eq!(result.unwrap().text.as_deref(), Some("Success!"));
    }

    #[tokio::test]
    async fn test_succeeds_after_retry() {
        let mock = Arc::new(FailingMockBackend::new(
            2,
            LlmError::RequestFailed("transient".into()),
        ));
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1, // Fast for tests
            max_delay_ms: 10,
            jitter_factor: 0.0,
        };
        let client = ResilientBackend::new(mock, config);

        let request = ModelRequest::new(vec![]);
        let result = client.generate(request).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_fails_after_max_retries() {
        let mock = Arc::new(FailingMockBackend::new(
            10,
            LlmError::RequestFailed("persistent".into()),
        ));
        let config = RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 10,
            jitter_factor: 0.0,
        };
        let client = ResilientBackend::new(mock, config);

        let request = ModelRequest::new(vec![]);
        let result = client.generate(request).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_no_retry_on_auth_error() {
        let mock = Arc::new(FailingMockBackend::new(
            10,
            LlmError::RequestFailed("401 Unauthorized".into()),
        ));
        let mock_ref = Arc::clone(&mock);
        let config = RetryConfig {
            max_retries: 3,
            base_delay_ms: 1,
            max_delay_ms: 10,
            jitter_factor: 0.0,
        };
        let client = ResilientBackend::new(mock, config);

        let request = ModelRequest::new(vec![]);
        let result = client.generate(request).await;

        // Should fail immediately without retrying
        assert!(result.is_err());
        // Verify only 1 attempt was made (10 - 1 = 9 remaining)
        assert_eq!(
            mock_ref.failures_remaining.load(Ordering::SeqCst),
            9,
            "Auth error should not retry - expected 9 remaining failures after single attempt"
        );
    }

    #[tokio::test]
    async fn test_retries_on_invalid_response() {
        let mock = Arc::new(FailingMockBackend::new(
            1,
            LlmError::InvalidResponse("truncated body".into()),
        ));
        let config = RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 10,
            jitter_factor: 0.0,
        };
        let client = ResilientBackend::new(mock, config);

        let result = client.generate(ModelRequest::new(vec![])).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_stream_establishment_is_retried() {
        use futures_util::StreamExt;

        let mock = Arc::new(FailingMockBackend::new(
            1,
            LlmError::RequestFailed("Connection timeout".into()),
        ));
        let config = RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            max_delay_ms: 10,
            jitter_factor: 0.0,
        };
        let client = ResilientBackend::new(mock, config);

        let stream = client
            .generate_stream(ModelRequest::new(vec![]))
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|chunk| chunk.unwrap()).collect().await;
        assert_eq!(chunks, vec!["Success!"]);
    }

    #[tokio::test]
    async fn test_delegates_native_tool_support() {
        let mock = Arc::new(FailingMockBackend::new(
            0,
            LlmError::RequestFailed("".into()),
        ));
        let client = ResilientBackend::new(mock, RetryConfig::default());
        assert!(client.supports_native_tools());
    }

    #[test]
    fn test_exponential_backoff() {
        let config = RetryConfig {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            jitter_factor: 0.0, // No jitter for predictable test
        };
        let client = ResilientBackend::new(
            Arc::new(FailingMockBackend::new(
                0,
                LlmError::RequestFailed("".into()),
            )),
            config,
        );

        // Attempt 1: 1000 * 2^0 = 1000
        assert_eq!(client.calculate_delay(1), 1000);
        // Attempt 2: 1000 * 2^1 = 2000
        assert_eq!(client.calculate_delay(2), 2000);
        // Attempt 3: 1000 * 2^2 = 4000
        assert_eq!(client.calculate_delay(3), 4000);
        // Attempt 4: 1000 * 2^3 = 8000
        assert_eq!(client.calculate_delay(4), 8000);
        // Attempt 5: 1000 * 2^4 = 16000
        assert_eq!(client.calculate_delay(5), 16000);
        // Attempt 6: 1000 * 2^5 = 32000, but capped at 30000
        assert_eq!(client.calculate_delay(6), 30000);
    }
}
