//! External model clients: the translator and the topic/entity classifier.
//!
//! The host builds one [`ClientRegistry`] at startup, hands it to the
//! orchestrator and closes it at shutdown.

pub mod llm_client;
pub mod offline;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::EngineResult;

pub use llm_client::LlmClient;
pub use offline::{EchoTranslator, StaticClassifier};

/// One OpenAI-compatible endpoint and the credential used for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendEndpoint {
    pub name: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

#[async_trait]
pub trait Translator: Send + Sync {
    /// Fails with `TranslatorUnavailable` once every configured backend failed.
    async fn translate(&self, text: &str, instruction: &str, model_id: &str) -> EngineResult<String>;

    async fn close(&self) {}
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Fails with `ClassifierError` on an empty or unusable response.
    async fn classify(&self, prompt: &str) -> EngineResult<String>;

    async fn close(&self) {}
}

#[derive(Clone)]
pub struct ClientRegistry {
    translator: Arc<dyn Translator>,
    classifier: Arc<dyn Classifier>,
}

impl ClientRegistry {
    pub fn new(translator: Arc<dyn Translator>, classifier: Arc<dyn Classifier>) -> Self {
        Self { translator, classifier }
    }

    /// Offline registry: echoing translator and a classifier that always fails,
    /// so every analysis falls back to its documented default.
    pub fn offline() -> Self {
        Self::new(Arc::new(EchoTranslator::new()), Arc::new(StaticClassifier::failing()))
    }

    pub fn from_config(config: &Config) -> Self {
        let timeout = config.translate_timeout();

        if config.translator_backends.is_empty() {
            warn!("No translator backends configured, translations will fail until TRANSLATOR_BACKENDS is set");
        }
        let translator: Arc<dyn Translator> =
            Arc::new(LlmClient::new(config.translator_backends.clone(), timeout));

        let classifier: Arc<dyn Classifier> = match &config.classifier_backend {
            Some(backend) => Arc::new(LlmClient::new(vec![backend.clone()], config.analysis_timeout())),
            None => {
                warn!("No classifier backend configured, analysis will use fallbacks");
                Arc::new(StaticClassifier::failing())
            }
        };

        info!("Client registry ready");
        Self::new(translator, classifier)
    }

    pub fn translator(&self) -> Arc<dyn Translator> {
        Arc::clone(&self.translator)
    }

    pub fn classifier(&self) -> Arc<dyn Classifier> {
        Arc::clone(&self.classifier)
    }

    pub async fn close(&self) {
        self.translator.close().await;
        self.classifier.close().await;
        info!("Client registry closed");
    }
}

pub(crate) fn default_http_timeout() -> Duration {
    Duration::from_secs(60)
}
