// translation-context/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache_management::TranslationMemoryConfig;
use crate::clients::BackendEndpoint;
use crate::context_engine::orchestrator::OrchestratorConfig;
use crate::context_engine::topic_analyzer::TopicStrategy;

/// Which persistence implementation backs the engine stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Memory,
    None,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            "none" | "null" => Ok(StoreBackend::None),
            other => Err(anyhow::anyhow!("Unknown STORE_BACKEND '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    pub database_path: String,
    pub translator_backends: Vec<BackendEndpoint>,
    pub classifier_backend: Option<BackendEndpoint>,
    pub topic_strategy: TopicStrategy,
    pub analysis_timeout_seconds: u64,
    pub translate_timeout_seconds: u64,
    pub max_analysis_workers: usize,
    pub entity_snippet_max_chars: usize,
    pub memory_confidence_gate: f32,
    pub memory_reinforce_step: f32,
    pub enhanced_context: bool,
    pub min_words_for_context: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_backend: StoreBackend::Sqlite,
            database_path: "data/translation_context.db".to_string(),
            translator_backends: Vec::new(),
            classifier_backend: None,
            topic_strategy: TopicStrategy::Model,
            analysis_timeout_seconds: 10,
            translate_timeout_seconds: 60,
            max_analysis_workers: default_workers(),
            entity_snippet_max_chars: 1000,
            memory_confidence_gate: 0.7,
            memory_reinforce_step: 0.05,
            enhanced_context: true,
            min_words_for_context: 5,
        }
    }
}

fn default_workers() -> usize {
    num_cpus::get().clamp(1, 4)
}

impl Config {
    /// Reads configuration from the process environment.
    ///
    /// Loading a `.env` file is the host binary's job; this only reads
    /// variables that are already set.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let store_backend = env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "sqlite".into())
            .parse()?;
        let database_path = env::var("DATABASE_PATH").unwrap_or(defaults.database_path);

        let translator_model = env::var("TRANSLATOR_MODEL").unwrap_or_else(|_| "deepseek-chat".into());
        let translator_backends = parse_backends(
            &env::var("TRANSLATOR_BACKENDS").unwrap_or_default(),
            &env::var("TRANSLATOR_API_KEYS").unwrap_or_default(),
            &translator_model,
        )?;

        let classifier_backend = match env::var("CLASSIFIER_URL") {
            Ok(url) if !url.trim().is_empty() => Some(BackendEndpoint {
                name: "classifier".to_string(),
                base_url: url.trim().trim_end_matches('/').to_string(),
                api_key: env::var("CLASSIFIER_API_KEY").ok().filter(|k| !k.is_empty()),
                model: env::var("CLASSIFIER_MODEL").unwrap_or_else(|_| translator_model.clone()),
            }),
            _ => translator_backends.first().cloned(),
        };

        let topic_strategy = env::var("TOPIC_STRATEGY")
            .unwrap_or_else(|_| "model".into())
            .parse()?;

        let max_analysis_workers: usize = match env::var("MAX_ANALYSIS_WORKERS") {
            Ok(v) => v.parse::<usize>().context("MAX_ANALYSIS_WORKERS must be an integer")?,
            Err(_) => defaults.max_analysis_workers,
        };

        let config = Self {
            store_backend,
            database_path,
            translator_backends,
            classifier_backend,
            topic_strategy,
            analysis_timeout_seconds: env::var("ANALYSIS_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
            translate_timeout_seconds: env::var("TRANSLATE_TIMEOUT_SECONDS")
                .unwrap_or_else(|_| "60".into())
                .parse()?,
            max_analysis_workers: max_analysis_workers.clamp(1, 4),
            entity_snippet_max_chars: env::var("ENTITY_SNIPPET_MAX_CHARS")
                .unwrap_or_else(|_| "1000".into())
                .parse()?,
            memory_confidence_gate: env::var("MEMORY_CONFIDENCE_GATE")
                .unwrap_or_else(|_| "0.7".into())
                .parse()?,
            memory_reinforce_step: env::var("MEMORY_REINFORCE_STEP")
                .unwrap_or_else(|_| "0.05".into())
                .parse()?,
            enhanced_context: env::var("ENHANCED_CONTEXT")
                .unwrap_or_else(|_| "true".into())
                .parse()?,
            min_words_for_context: env::var("MIN_WORDS_FOR_CONTEXT")
                .unwrap_or_else(|_| "5".into())
                .parse()?,
        };

        if config.translator_backends.is_empty() {
            warn!("No TRANSLATOR_BACKENDS configured; only offline translation is available");
        }
        info!(
            "Engine configuration: store={:?}, {} translator backend(s), topic strategy {:?}, {} analysis workers",
            config.store_backend,
            config.translator_backends.len(),
            config.topic_strategy,
            config.max_analysis_workers
        );

        Ok(config)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_seconds)
    }

    pub fn translate_timeout(&self) -> Duration {
        Duration::from_secs(self.translate_timeout_seconds)
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            enhanced_context: self.enhanced_context,
            analysis_timeout: self.analysis_timeout(),
            translate_timeout: self.translate_timeout(),
            max_analysis_workers: self.max_analysis_workers,
            entity_snippet_max_chars: self.entity_snippet_max_chars,
            min_words_for_context: self.min_words_for_context,
            topic_strategy: self.topic_strategy,
            memory: self.memory_config(),
            ..OrchestratorConfig::default()
        }
    }

    pub fn memory_config(&self) -> TranslationMemoryConfig {
        TranslationMemoryConfig {
            confidence_gate: self.memory_confidence_gate,
            reinforce_step: self.memory_reinforce_step,
            ..TranslationMemoryConfig::default()
        }
    }
}

/// Parses `name=url` pairs, attaching API keys by position.
fn parse_backends(spec: &str, keys: &str, model: &str) -> Result<Vec<BackendEndpoint>> {
    let keys: Vec<&str> = keys.split(',').map(str::trim).collect();
    let mut backends = Vec::new();

    for (i, entry) in spec.split(',').map(str::trim).filter(|e| !e.is_empty()).enumerate() {
        let (name, url) = entry
            .split_once('=')
            .with_context(|| format!("Backend entry '{}' must look like name=url", entry))?;
        let url = url.trim().trim_end_matches('/');
        if url.is_empty() {
            return Err(anyhow::anyhow!("Backend '{}' has an empty URL", name));
        }
        backends.push(BackendEndpoint {
            name: name.trim().to_string(),
            base_url: url.to_string(),
            api_key: keys.get(i).filter(|k| !k.is_empty()).map(|k| k.to_string()),
            model: model.to_string(),
        });
    }

    Ok(backends)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Helper function to create a test Config with default values
    fn create_test_config() -> Config {
        Config {
            store_backend: StoreBackend::Memory,
            database_path: "/tmp/test.db".to_string(),
            translator_backends: vec![BackendEndpoint {
                name: "deepseek".to_string(),
                base_url: "http://127.0.0.1:9100".to_string(),
                api_key: None,
                model: "deepseek-chat".to_string(),
            }],
            classifier_backend: None,
            topic_strategy: TopicStrategy::Weighted,
            analysis_timeout_seconds: 5,
            translate_timeout_seconds: 30,
            max_analysis_workers: 4,
            entity_snippet_max_chars: 500,
            memory_confidence_gate: 0.7,
            memory_reinforce_step: 0.05,
            enhanced_context: true,
            min_words_for_context: 5,
        }
    }

    #[test]
    fn test_store_backend_parsing() {
        assert_eq!("sqlite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert_eq!(" Memory ".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert_eq!("none".parse::<StoreBackend>().unwrap(), StoreBackend::None);
        assert!("redis".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_parse_backends_assigns_keys_by_position() {
        let backends = parse_backends(
            "gemini=https://a.example/,gemini=https://b.example",
            "k1,k2",
            "flash",
        )
        .unwrap();
        assert_eq!(backends.len(), 2);
        assert_eq!(backends[0].base_url, "https://a.example");
        assert_eq!(backends[0].api_key.as_deref(), Some("k1"));
        assert_eq!(backends[1].api_key.as_deref(), Some("k2"));
        assert_eq!(backends[1].model, "flash");
    }

    #[test]
    fn test_parse_backends_rejects_malformed_entries() {
        assert!(parse_backends("no-equals-sign", "", "m").is_err());
        assert!(parse_backends("name=", "", "m").is_err());
        assert!(parse_backends("", "", "m").unwrap().is_empty());
    }

    #[test]
    fn test_derived_component_configs() {
        let config = create_test_config();
        let orchestrator = config.orchestrator_config();
        assert_eq!(orchestrator.analysis_timeout, Duration::from_secs(5));
        assert_eq!(orchestrator.entity_snippet_max_chars, 500);
        assert_eq!(orchestrator.topic_strategy, TopicStrategy::Weighted);

        let memory = config.memory_config();
        assert!((memory.confidence_gate - 0.7).abs() < f32::EPSILON);
        assert!((memory.reinforce_step - 0.05).abs() < f32::EPSILON);
    }

    #[test]
    fn test_default_workers_are_bounded() {
        let config = Config::default();
        assert!(config.max_analysis_workers >= 1);
        assert!(config.max_analysis_workers <= 4);
    }
}
