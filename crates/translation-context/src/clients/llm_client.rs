//! OpenAI-compatible chat completion client used for both translation and
//! classification. Backends are tried once each, in configuration order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use super::{default_http_timeout, BackendEndpoint, Classifier, Translator};
use crate::error::{EngineError, EngineResult};
use crate::utils::TextUtils;

const CLASSIFIER_SYSTEM_PROMPT: &str =
    "You label chat conversations. Answer with the requested format only, no explanations.";

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

pub struct LlmClient {
    backends: Vec<BackendEndpoint>,
    http_client: reqwest::Client,
}

impl LlmClient {
    pub fn new(backends: Vec<BackendEndpoint>, timeout: Duration) -> Self {
        let timeout = if timeout.is_zero() { default_http_timeout() } else { timeout };
        Self {
            backends,
            http_client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    fn completions_url(backend: &BackendEndpoint) -> String {
        format!("{}/v1/chat/completions", backend.base_url)
    }

    /// Backends registered under `model_id`, or all of them when none match.
    fn candidates(&self, model_id: &str) -> Vec<&BackendEndpoint> {
        let named: Vec<&BackendEndpoint> = self
            .backends
            .iter()
            .filter(|b| !model_id.is_empty() && b.name.eq_ignore_ascii_case(model_id))
            .collect();
        if named.is_empty() {
            self.backends.iter().collect()
        } else {
            named
        }
    }

    async fn complete(
        &self,
        backend: &BackendEndpoint,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> anyhow::Result<String> {
        let request = ChatCompletionRequest {
            model: &backend.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            max_tokens,
            temperature: 0.1,
            stream: false,
        };

        let mut builder = self.http_client.post(Self::completions_url(backend)).json(&request);
        if let Some(key) = &backend.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{} request failed: {}", backend.name, e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("{} returned {}: {}", backend.name, status, body));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to parse {} response: {}", backend.name, e))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default();

        let content = TextUtils::strip_think_tags(&content);
        if content.is_empty() {
            return Err(anyhow::anyhow!("{} returned an empty completion", backend.name));
        }
        Ok(content)
    }

    /// Tries each candidate once; reports the last error after all failed.
    async fn complete_any(
        &self,
        model_id: &str,
        system: &str,
        user: &str,
        max_tokens: u32,
    ) -> Result<String, String> {
        let mut last_error = None;
        for backend in self.candidates(model_id) {
            match self.complete(backend, system, user, max_tokens).await {
                Ok(content) => {
                    debug!("Completion served by backend {}", backend.name);
                    return Ok(content);
                }
                Err(e) => {
                    warn!("Backend {} failed: {}", backend.name, e);
                    last_error = Some(e.to_string());
                }
            }
        }
        Err(match last_error {
            Some(e) => format!("all backends failed, last error: {}", e),
            None => "no backends configured".to_string(),
        })
    }
}

#[async_trait]
impl Translator for LlmClient {
    async fn translate(&self, text: &str, instruction: &str, model_id: &str) -> EngineResult<String> {
        self.complete_any(model_id, instruction, text, 2048)
            .await
            .map_err(EngineError::TranslatorUnavailable)
    }
}

#[async_trait]
impl Classifier for LlmClient {
    async fn classify(&self, prompt: &str) -> EngineResult<String> {
        self.complete_any("", CLASSIFIER_SYSTEM_PROMPT, prompt, 150)
            .await
            .map_err(EngineError::ClassifierError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(name: &str, url: &str) -> BackendEndpoint {
        BackendEndpoint {
            name: name.to_string(),
            base_url: url.to_string(),
            api_key: Some("test-key".to_string()),
            model: "test-model".to_string(),
        }
    }

    fn completion_body(content: &str) -> String {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content}}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_translate_uses_first_healthy_backend() {
        let mut failing = mockito::Server::new_async().await;
        let failing_mock = failing
            .mock("POST", "/v1/chat/completions")
            .with_status(500)
            .with_body("quota exceeded")
            .expect(1)
            .create_async()
            .await;

        let mut healthy = mockito::Server::new_async().await;
        let healthy_mock = healthy
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("<think>short</think>Magandang umaga"))
            .create_async()
            .await;

        let client = LlmClient::new(
            vec![backend("gemini", &failing.url()), backend("gemini", &healthy.url())],
            Duration::from_secs(5),
        );
        let translated = client.translate("Good morning", "Translate to Tagalog", "gemini").await.unwrap();

        assert_eq!(translated, "Magandang umaga");
        failing_mock.assert_async().await;
        healthy_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_translate_reports_exhaustion() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(503)
            .create_async()
            .await;

        let client = LlmClient::new(vec![backend("deepseek", &server.url())], Duration::from_secs(5));
        let err = client.translate("hi", "instr", "deepseek").await.unwrap_err();
        assert!(matches!(err, EngineError::TranslatorUnavailable(_)));
    }

    #[tokio::test]
    async fn test_classify_rejects_empty_completion() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(completion_body("   "))
            .create_async()
            .await;

        let client = LlmClient::new(vec![backend("classifier", &server.url())], Duration::from_secs(5));
        let err = client.classify("topic?").await.unwrap_err();
        assert!(matches!(err, EngineError::ClassifierError(_)));
    }

    #[tokio::test]
    async fn test_no_backends() {
        let client = LlmClient::new(Vec::new(), Duration::ZERO);
        let err = client.translate("hi", "instr", "any").await.unwrap_err();
        assert_eq!(err.to_string(), "translator unavailable: no backends configured");
    }

    #[test]
    fn test_candidates_fall_back_to_all_backends() {
        let client = LlmClient::new(
            vec![backend("claude", "http://a"), backend("gemini", "http://b")],
            Duration::from_secs(1),
        );
        assert_eq!(client.candidates("gemini").len(), 1);
        assert_eq!(client.candidates("unknown").len(), 2);
    }
}
