//! OpenAI-compatible chat-completion client.
//!
//! Every pool entry is an `(endpoint, model, credential)` triple, so one
//! [`ChatCompletionClient`] is built per agent. Requests are a single attempt:
//! retry and failover belong to the batch driver, which needs to see rate
//! limits to rotate credentials.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::pool::AgentConfig;
use crate::error::LlmError;

/// Request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Request for text generation from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl GenerationRequest {
    /// Create a new generation request with default parameters.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature for this request.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max tokens for this request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Model that generated this response.
    pub model: String,
    /// Generated text of the first choice.
    pub content: String,
    /// Token usage, when the provider reports it.
    pub usage: Option<Usage>,
}

/// Token usage statistics for a generation request.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Trait for LLM providers that can generate text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a response for the given request.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// Builds the shared HTTP client used by every agent.
pub fn build_http_client(timeout: Duration) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::RequestFailed(format!("failed to build HTTP client: {}", e)))
}

/// Client for one OpenAI-compatible `/chat/completions` endpoint.
pub struct ChatCompletionClient {
    http_client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    /// Agent name and key source, reported when the key is missing.
    agent: String,
    key_source: String,
}

impl ChatCompletionClient {
    /// Create a client with explicit configuration.
    pub fn new(
        http_client: Client,
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            http_client,
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            agent: String::new(),
            key_source: String::new(),
        }
    }

    /// Create a client bound to a pool entry.
    pub fn for_agent(http_client: Client, config: &AgentConfig) -> Self {
        Self {
            http_client,
            base_url: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.credential.secret().map(str::to_string),
            agent: config.name.clone(),
            key_source: config.credential.source().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default)]
    status: Option<String>,
}

impl ApiErrorDetail {
    /// Folds the provider's status/code markers into the message so text-level
    /// detection (e.g. `RESOURCE_EXHAUSTED`) keeps working.
    fn into_message(self) -> String {
        let mut markers = Vec::new();
        if let Some(status) = self.status {
            markers.push(status);
        }
        if let Some(code) = self.code {
            match code {
                serde_json::Value::String(s) => markers.push(s),
                serde_json::Value::Null => {}
                other => markers.push(other.to_string()),
            }
        }
        if markers.is_empty() {
            self.message
        } else {
            format!("{} ({})", self.message, markers.join(", "))
        }
    }
}

#[async_trait]
impl LlmProvider for ChatCompletionClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::MissingApiKey {
                agent: self.agent.clone(),
                env_var: self.key_source.clone(),
            })?;

        let api_request = ApiRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let http_response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            let message = match serde_json::from_str::<ApiErrorResponse>(&error_text) {
                Ok(parsed) => parsed.error.into_message(),
                Err(_) => error_text,
            };

            if status_code == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError {
                code: status_code,
                message,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?
            .message
            .content
            .unwrap_or_default();

        Ok(GenerationResponse {
            model: api_response.model.unwrap_or_else(|| self.model.clone()),
            content,
            usage: api_response.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let system = Message::system("You are helpful.");
        assert_eq!(system.role, "system");
        assert_eq!(system.content, "You are helpful.");

        let user = Message::user("Hello");
        assert_eq!(user.role, "user");
        assert_eq!(user.content, "Hello");
    }

    #[test]
    fn test_generation_request_builder() {
        let request = GenerationRequest::new(vec![Message::user("test")])
            .with_temperature(0.2)
            .with_max_tokens(512);

        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(512));
    }

    #[test]
    fn test_api_request_serialization() {
        let messages = vec![Message::user("test")];
        let request = ApiRequest {
            model: "llama",
            messages: &messages,
            temperature: Some(0.7),
            max_tokens: None,
        };

        let json = serde_json::to_string(&request).expect("serialization should succeed");
        assert!(json.contains("\"model\":\"llama\""));
        assert!(json.contains("\"temperature\":0.7"));
        assert!(!json.contains("max_tokens"));
    }

    #[test]
    fn test_error_detail_keeps_status_marker() {
        let detail: ApiErrorResponse = serde_json::from_str(
            r#"{"error": {"message": "quota hit", "status": "RESOURCE_EXHAUSTED", "code": 8}}"#,
        )
        .expect("valid error body");
        let message = detail.error.into_message();
        assert!(message.starts_with("quota hit"));
        assert!(message.contains("RESOURCE_EXHAUSTED"));
        assert!(message.contains('8'));
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_network() {
        let http = build_http_client(Duration::from_secs(1)).expect("client");
        let client = ChatCompletionClient::new(http, "http://localhost:65535", "llama", None);

        let err = client
            .generate(GenerationRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey { .. }));
    }

    #[tokio::test]
    async fn test_connection_error_is_request_failed() {
        let http = build_http_client(Duration::from_secs(2)).expect("client");
        let client = ChatCompletionClient::new(
            http,
            "http://localhost:65535",
            "llama",
            Some("key".to_string()),
        );

        let err = client
            .generate(GenerationRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed(_)));
    }
}
