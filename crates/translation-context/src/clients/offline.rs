//! Clients that never leave the process, for offline runs and tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{Classifier, Translator};
use crate::error::{EngineError, EngineResult};

/// Returns the input text, optionally prefixed, and counts calls.
#[derive(Debug, Default)]
pub struct EchoTranslator {
    prefix: String,
    calls: AtomicUsize,
    instructions: Mutex<Vec<String>>,
}

impl EchoTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Instructions received so far, oldest first.
    pub fn instructions(&self) -> Vec<String> {
        self.instructions
            .lock()
            .map(|seen| seen.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Translator for EchoTranslator {
    async fn translate(&self, text: &str, instruction: &str, _model_id: &str) -> EngineResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.instructions.lock() {
            seen.push(instruction.to_string());
        }
        Ok(format!("{}{}", self.prefix, text))
    }
}

/// Answers from fixed rules: the first rule whose needle occurs in the prompt
/// wins, otherwise the default response, otherwise a `ClassifierError`.
#[derive(Debug, Default)]
pub struct StaticClassifier {
    rules: Vec<(String, String)>,
    default_response: Option<String>,
    calls: AtomicUsize,
}

impl StaticClassifier {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            default_response: Some(response.into()),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), response.into()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Classifier for StaticClassifier {
    async fn classify(&self, prompt: &str) -> EngineResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .or_else(|| self.default_response.clone())
            .ok_or_else(|| EngineError::ClassifierError("no scripted response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_echo_translator_counts_calls() {
        let translator = EchoTranslator::with_prefix("[tl] ");
        assert_eq!(translator.translate("hi", "instr", "m").await.unwrap(), "[tl] hi");
        assert_eq!(translator.calls(), 1);
        assert_eq!(translator.instructions(), vec!["instr".to_string()]);
    }

    #[tokio::test]
    async fn test_static_classifier_rules() {
        let classifier = StaticClassifier::failing().with_rule("topic", "Anime Talk, 0.9");
        assert_eq!(classifier.classify("what topic?").await.unwrap(), "Anime Talk, 0.9");
        assert!(classifier.classify("entities?").await.is_err());
        assert_eq!(classifier.calls(), 2);
    }
}
