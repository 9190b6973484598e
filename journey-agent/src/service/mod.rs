//! Single-turn prompt service behind the HTTP API.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use uuid::Uuid;

use crate::clients::{LLMClient, LLMError, Message, OpenAIClient};
use crate::config::{Config, ProviderKind};
use crate::prompts::{CHAT_V1, EXPLAIN_V1, render};
use crate::schemas::{ChatResponse, ExplainResponse};

const MAX_LIST_ITEMS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AIResult {
    pub provider: String,
    pub text: String,
    pub tokens_est: usize,
}

/// Rough token count: one token per four characters, at least one.
pub fn estimate_tokens(prompt: &str) -> usize {
    (prompt.chars().count() / 4).max(1)
}

#[async_trait]
pub trait AIProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<AIResult, LLMError>;
}

/// Canned answer, no network.
pub struct StubProvider;

pub const STUB_ANSWER: &str = "[stub] Vibe Coding means using rapid AI-assisted iteration to prototype, refactor, and ship features with tight feedback loops.";

#[async_trait]
impl AIProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn generate(&self, prompt: &str) -> Result<AIResult, LLMError> {
        Ok(AIResult {
            provider: self.name().to_string(),
            text: STUB_ANSWER.to_string(),
            tokens_est: estimate_tokens(prompt),
        })
    }
}

/// Passes the rendered prompt straight to a chat-completion backend.
pub struct LLMProvider {
    client: Arc<dyn LLMClient>,
}

impl LLMProvider {
    pub fn new(client: Arc<dyn LLMClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AIProvider for LLMProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, prompt: &str) -> Result<AIResult, LLMError> {
        let text = self.client.complete(vec![Message::user(prompt)]).await?;
        Ok(AIResult {
            provider: self.name().to_string(),
            text,
            tokens_est: estimate_tokens(prompt),
        })
    }
}

pub fn provider_from_config(config: &Config) -> Arc<dyn AIProvider> {
    match config.provider {
        ProviderKind::Stub => Arc::new(StubProvider),
        ProviderKind::OpenAI => Arc::new(LLMProvider::new(Arc::new(OpenAIClient::from_config(
            &config.llm,
        )))),
    }
}

#[derive(Debug, Default, Deserialize)]
struct Explanation {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    risks: Vec<String>,
    #[serde(default)]
    next_steps: Vec<String>,
}

impl Explanation {
    fn fallback(topic: &str) -> Self {
        Self {
            summary: format!("Explanation for: {}", topic),
            risks: vec![
                "Model output may be inconsistent".to_string(),
                "Context may be insufficient".to_string(),
            ],
            next_steps: vec![
                "Add real provider".to_string(),
                "Add eval & logging".to_string(),
                "Add retries/timeouts".to_string(),
            ],
        }
    }
}

#[derive(Clone)]
pub struct AIService {
    provider: Arc<dyn AIProvider>,
}

impl AIService {
    pub fn new(provider: Arc<dyn AIProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn chat(&self, prompt: &str) -> Result<ChatResponse, LLMError> {
        let request_id = new_request_id();
        let started = Instant::now();

        let full_prompt = render(&CHAT_V1, &[("prompt", prompt)]);
        let result = self.provider.generate(&full_prompt).await?;
        let latency_ms = elapsed_ms(started);

        info!(%request_id, provider = %result.provider, latency_ms, template = CHAT_V1.name, "ai.chat");

        Ok(ChatResponse {
            request_id,
            provider: result.provider,
            latency_ms,
            tokens_est: result.tokens_est,
            answer: result.text,
        })
    }

    /// Asks for a JSON explanation; non-JSON output gets a fixed fallback.
    pub async fn explain(&self, topic: &str, context: Option<&str>) -> Result<ExplainResponse, LLMError> {
        let request_id = new_request_id();
        let started = Instant::now();

        let full_prompt = render(
            &EXPLAIN_V1,
            &[("topic", topic), ("context", context.unwrap_or_default())],
        );
        let result = self.provider.generate(&full_prompt).await?;
        let latency_ms = elapsed_ms(started);

        let mut explanation: Explanation = serde_json::from_str(&result.text)
            .unwrap_or_else(|_| Explanation::fallback(topic));
        explanation.risks.truncate(MAX_LIST_ITEMS);
        explanation.next_steps.truncate(MAX_LIST_ITEMS);

        info!(%request_id, provider = %result.provider, latency_ms, template = EXPLAIN_V1.name, "ai.explain");

        Ok(ExplainResponse {
            request_id,
            provider: result.provider,
            latency_ms,
            tokens_est: result.tokens_est,
            summary: explanation.summary,
            risks: explanation.risks,
            next_steps: explanation.next_steps,
        })
    }
}

pub fn new_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::ModelInfo;

    struct JsonClient(String);

    #[async_trait]
    impl LLMClient for JsonClient {
        async fn complete(&self, _messages: Vec<Message>) -> Result<String, LLMError> {
            Ok(self.0.clone())
        }

        fn model_info(&self) -> ModelInfo {
            ModelInfo {
                name: "json".to_string(),
                max_tokens: None,
            }
        }
    }

    fn llm_service(reply: &str) -> AIService {
        AIService::new(Arc::new(LLMProvider::new(Arc::new(JsonClient(reply.to_string())))))
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 1);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn test_request_ids_are_hex() {
        let id = new_request_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_request_id());
    }

    #[tokio::test]
    async fn test_chat_with_stub() {
        let service = AIService::new(Arc::new(StubProvider));
        let response = service.chat("What is vibe coding?").await.unwrap();

        let rendered = render(&CHAT_V1, &[("prompt", "What is vibe coding?")]);
        assert_eq!(response.provider, "stub");
        assert_eq!(response.answer, STUB_ANSWER);
        assert_eq!(response.tokens_est, rendered.chars().count() / 4);
    }

    #[tokio::test]
    async fn test_explain_falls_back_on_non_json() {
        let service = AIService::new(Arc::new(StubProvider));
        let response = service.explain("RAG", None).await.unwrap();

        assert_eq!(response.summary, "Explanation for: RAG");
        assert_eq!(response.risks.len(), 2);
        assert_eq!(response.next_steps.len(), 3);
    }

    #[tokio::test]
    async fn test_explain_parses_and_caps_lists() {
        let service = llm_service(
            r#"{"summary": "Retrieval first", "risks": ["a","b","c","d","e","f","g"], "next_steps": []}"#,
        );
        let response = service.explain("RAG", Some("docs")).await.unwrap();

        assert_eq!(response.provider, "openai");
        assert_eq!(response.summary, "Retrieval first");
        assert_eq!(response.risks, vec!["a", "b", "c", "d", "e"]);
        assert!(response.next_steps.is_empty());
    }

    #[tokio::test]
    async fn test_explain_missing_keys_default() {
        let service = llm_service(r#"{"risks": ["only risk"]}"#);
        let response = service.explain("RAG", None).await.unwrap();

        assert_eq!(response.summary, "");
        assert_eq!(response.risks, vec!["only risk"]);
    }

    #[test]
    fn test_provider_from_config() {
        let mut config = Config::default();
        assert_eq!(provider_from_config(&config).name(), "stub");
        config.provider = ProviderKind::OpenAI;
        assert_eq!(provider_from_config(&config).name(), "openai");
    }
}
