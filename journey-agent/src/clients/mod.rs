use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LlmConfig;

/// Returned by [`LLMClient::generate`] in place of model text when the call fails.
pub const LLM_FAILURE_SENTINEL: &str = "Error: Error occurred when calling language model service.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

#[async_trait]
pub trait LLMClient: Send + Sync {
    async fn complete(&self, messages: Vec<Message>) -> Result<String, LLMError>;

    fn model_info(&self) -> ModelInfo;

    /// One system + user exchange. Failures are logged and collapsed into
    /// [`LLM_FAILURE_SENTINEL`] so the caller always gets text back.
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> String {
        let messages = vec![Message::system(system_prompt), Message::user(user_prompt)];
        debug!(model = %self.model_info().name, prompt_chars = user_prompt.len(), "calling language model");

        match self.complete(messages).await {
            Ok(text) => {
                debug!(response_chars = text.len(), "language model responded");
                text
            }
            Err(e) => {
                warn!(error = %e, "language model call failed");
                LLM_FAILURE_SENTINEL.to_string()
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for any OpenAI-compatible `chat/completions` endpoint.
pub struct OpenAIClient {
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
    base_url: String,
}

impl OpenAIClient {
    pub fn new(api_key: Option<String>, model: String, base_url: String, timeout: Duration) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
            timeout,
            base_url,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(
            config.api_key.clone(),
            config.model.clone(),
            config.base_url.clone(),
            config.timeout,
        )
    }

    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{}/chat/completions", base)
        }
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn complete(&self, messages: Vec<Message>) -> Result<String, LLMError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LLMError::ConfigError("API key is not configured".to_string()))?;

        let request = ChatCompletionRequest {
            model: &self.model,
            messages: &messages,
            stream: false,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| LLMError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LLMError::ApiError(format!("{}: {}", status, body)));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LLMError::ParseError(e.to_string()))?;

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LLMError::ParseError("response has no message content".to_string()))
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model.clone(),
            max_tokens: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};

    async fn spawn_backend(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client(base_url: String) -> OpenAIClient {
        OpenAIClient::new(
            Some("test_key".to_string()),
            "test-model".to_string(),
            base_url,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_endpoint_normalisation() {
        assert_eq!(
            client("https://api.deepseek.com/".to_string()).endpoint(),
            "https://api.deepseek.com/chat/completions"
        );
        assert_eq!(
            client("https://api.openai.com/v1/chat/completions".to_string()).endpoint(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[tokio::test]
    async fn test_generate_returns_first_choice() {
        let router = Router::new().route(
            "/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["model"], "test-model");
                assert_eq!(body["stream"], false);
                assert_eq!(body["messages"][0]["role"], "system");
                assert_eq!(body["messages"][1]["content"], "hello");
                Json(serde_json::json!({
                    "choices": [{"message": {"role": "assistant", "content": "Thought: hi"}}]
                }))
            }),
        );
        let base_url = spawn_backend(router).await;

        let text = client(base_url).generate("system", "hello").await;
        assert_eq!(text, "Thought: hi");
    }

    #[tokio::test]
    async fn test_generate_returns_sentinel_on_api_error() {
        let router = Router::new().route(
            "/chat/completions",
            post(|| async { (StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let base_url = spawn_backend(router).await;

        let text = client(base_url).generate("system", "hello").await;
        assert_eq!(text, LLM_FAILURE_SENTINEL);
    }

    #[tokio::test]
    async fn test_missing_api_key_is_config_error() {
        let client = OpenAIClient::new(
            None,
            "test-model".to_string(),
            "http://127.0.0.1:9".to_string(),
            Duration::from_secs(1),
        );
        let result = client.complete(vec![Message::user("hi")]).await;
        assert!(matches!(result, Err(LLMError::ConfigError(_))));
        assert_eq!(client.generate("s", "u").await, LLM_FAILURE_SENTINEL);
    }
}
