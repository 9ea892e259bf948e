//! OpenRouter provider adapter
//!
//! Sends one OpenAI-compatible chat completion request per invocation. HTTP
//! failures are mapped onto [`ProviderError`] so strategies can record them;
//! nothing here retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use tracing::{debug, warn};

use super::types::{ChatRequest, ChatResponse, FinishReason, Message};
use super::{Completion, ProviderAdapter, ProviderError, TokenUsage};
use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::registry::ModelSpec;

/// OpenRouter API base URL
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenRouter adapter
///
/// Thread-safe; one instance is shared by every concurrent invocation.
#[derive(Clone)]
pub struct OpenRouterAdapter {
    /// HTTP client for making requests
    http_client: HttpClient,
    /// API key for authentication
    api_key: String,
    /// Base URL for the API
    base_url: String,
    /// Value for the HTTP-Referer attribution header
    referer: String,
    /// Value for the X-Title attribution header
    app_title: String,
}

impl std::fmt::Debug for OpenRouterAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenRouterAdapter")
            .field("base_url", &self.base_url)
            .field("app_title", &self.app_title)
            .finish()
    }
}

/// Builder for creating an OpenRouterAdapter
#[derive(Default)]
pub struct OpenRouterAdapterBuilder {
    config: Option<LlmConfig>,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

impl OpenRouterAdapterBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the LLM configuration
    pub fn config(mut self, config: LlmConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the API key
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the base URL (defaults to the configured one)
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the HTTP client timeout
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Build the adapter
    pub fn build(self) -> Result<OpenRouterAdapter> {
        let config = self.config.unwrap_or_default();
        let api_key = self.api_key.ok_or_else(|| {
            Error::ConfigError(
                "API key is required. Set ENSEMBLE_API_KEY or OPENROUTER_API_KEY.".to_string(),
            )
        })?;

        let timeout_secs = self.timeout_secs.unwrap_or(config.timeout_secs);

        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(Error::NetworkError)?;

        Ok(OpenRouterAdapter {
            http_client,
            api_key,
            base_url: self.base_url.unwrap_or(config.base_url),
            referer: config.referer,
            app_title: config.app_title,
        })
    }
}

impl OpenRouterAdapter {
    /// Create a new adapter with the given configuration and API key
    pub fn new(config: LlmConfig, api_key: impl Into<String>) -> Result<Self> {
        OpenRouterAdapterBuilder::new()
            .config(config)
            .api_key(api_key)
            .build()
    }

    /// Create a new builder
    pub fn builder() -> OpenRouterAdapterBuilder {
        OpenRouterAdapterBuilder::new()
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a single request to the API
    async fn send_request(&self, request: &ChatRequest) -> std::result::Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Sending chat completion request"
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.app_title)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Network(format!("request timed out: {}", e))
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error_status(status.as_u16(), &body));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("failed to parse response: {}", e)))?;

        completion_from_response(chat_response)
    }
}

#[async_trait]
impl ProviderAdapter for OpenRouterAdapter {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn invoke(
        &self,
        model: &ModelSpec,
        system_prompt: &str,
        user_prompt: &str,
    ) -> std::result::Result<Completion, ProviderError> {
        let request = ChatRequest::new(
            model.name.clone(),
            vec![Message::system(system_prompt), Message::user(user_prompt)],
        )
        .with_temperature(model.temperature)
        .with_max_tokens(model.max_tokens);

        self.send_request(&request).await
    }
}

/// Convert a parsed API response into a completion
fn completion_from_response(response: ChatResponse) -> std::result::Result<Completion, ProviderError> {
    let usage = response
        .usage
        .as_ref()
        .map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: if u.total_tokens > 0 {
                u.total_tokens
            } else {
                u.prompt_tokens + u.completion_tokens
            },
        })
        .unwrap_or_default();

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::MalformedResponse("empty response from API".to_string()))?;

    match choice.finish_reason {
        Some(FinishReason::Error) => {
            return Err(ProviderError::MalformedResponse(
                "backend reported an error while generating".to_string(),
            ));
        }
        Some(FinishReason::ContentFilter) => {
            return Err(ProviderError::MalformedResponse(
                "response was blocked by the content filter".to_string(),
            ));
        }
        Some(FinishReason::Length) => {
            warn!(model = %response.model, "Completion truncated at max_tokens");
        }
        _ => {}
    }

    Ok(Completion::new(choice.message.content, usage))
}

/// Map an unsuccessful HTTP status onto a provider error
fn map_error_status(status: u16, body: &str) -> ProviderError {
    match status {
        401 => ProviderError::Unauthorized(
            "invalid API key. Set ENSEMBLE_API_KEY or OPENROUTER_API_KEY.".to_string(),
        ),
        429 => ProviderError::RateLimited(extract_retry_after(body).unwrap_or(60)),
        402 => ProviderError::Api {
            status,
            message: "payment required: insufficient credits".to_string(),
        },
        404 => ProviderError::Api {
            status,
            message: format!("model not found or endpoint unavailable: {}", body),
        },
        _ => ProviderError::Api {
            status,
            message: body.to_string(),
        },
    }
}

/// Extract retry-after seconds from an error body
fn extract_retry_after(body: &str) -> Option<u64> {
    let json = serde_json::from_str::<serde_json::Value>(body).ok()?;
    json.get("retry_after")
        .and_then(|v| v.as_u64())
        .or_else(|| {
            json.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|v| v.as_u64())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_builder() {
        let adapter = OpenRouterAdapter::builder()
            .config(LlmConfig::default())
            .api_key("test-key")
            .base_url("https://example.com")
            .timeout_secs(5)
            .build()
            .unwrap();

        assert_eq!(adapter.base_url(), "https://example.com");
        assert_eq!(adapter.name(), "openrouter");
    }

    #[test]
    fn test_adapter_builder_requires_api_key() {
        let result = OpenRouterAdapter::builder().config(LlmConfig::default()).build();
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_adapter_defaults_to_openrouter() {
        let adapter = OpenRouterAdapter::new(LlmConfig::default(), "test-key").unwrap();
        assert_eq!(adapter.base_url(), OPENROUTER_BASE_URL);
    }

    #[test]
    fn test_adapter_debug_hides_key() {
        let adapter = OpenRouterAdapter::new(LlmConfig::default(), "sk-secret").unwrap();
        let debug = format!("{:?}", adapter);
        assert!(debug.contains("OpenRouterAdapter"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_adapter_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<OpenRouterAdapter>();
    }

    #[test]
    fn test_map_error_status() {
        assert!(matches!(map_error_status(401, ""), ProviderError::Unauthorized(_)));
        assert_eq!(
            map_error_status(429, r#"{"error": {"retry_after": 12}}"#),
            ProviderError::RateLimited(12)
        );
        assert_eq!(map_error_status(429, "slow down"), ProviderError::RateLimited(60));
        assert!(matches!(
            map_error_status(503, "overloaded"),
            ProviderError::Api { status: 503, .. }
        ));
    }

    #[test]
    fn test_extract_retry_after() {
        assert_eq!(extract_retry_after(r#"{"retry_after": 7}"#), Some(7));
        assert_eq!(extract_retry_after("not json"), None);
    }

    fn parse(body: &str) -> ChatResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn test_completion_from_response() {
        let completion = completion_from_response(parse(
            r#"{"model": "m", "choices": [{"message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 4}}"#,
        ))
        .unwrap();

        assert_eq!(completion.content, "ok");
        assert_eq!(completion.usage, TokenUsage::new(3, 4));
    }

    #[test]
    fn test_completion_rejects_empty_and_filtered() {
        let empty = completion_from_response(parse(r#"{"model": "m", "choices": []}"#));
        assert!(matches!(empty, Err(ProviderError::MalformedResponse(_))));

        let filtered = completion_from_response(parse(
            r#"{"model": "m", "choices": [{"message": {"role": "assistant", "content": ""}, "finish_reason": "content_filter"}]}"#,
        ));
        assert!(matches!(filtered, Err(ProviderError::MalformedResponse(_))));
    }
}
