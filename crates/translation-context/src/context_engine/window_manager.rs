//! Dynamic context window sizing.

use crate::context_engine::complexity::ComplexityAssessor;
use crate::utils::TextUtils;

const INTERROGATIVES: &[&str] = &["what", "how", "why", "when", "where", "who"];

#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub base_size: usize,
    pub max_size: usize,
    pub continuity_bonus: usize,
    pub high_complexity_threshold: f32,
    pub high_complexity_bonus: usize,
    pub medium_complexity_threshold: f32,
    pub medium_complexity_bonus: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            base_size: 10,
            max_size: 50,
            continuity_bonus: 5,
            high_complexity_threshold: 0.7,
            high_complexity_bonus: 10,
            medium_complexity_threshold: 0.5,
            medium_complexity_bonus: 5,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextWindowManager {
    config: WindowConfig,
    assessor: ComplexityAssessor,
}

impl ContextWindowManager {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            config,
            assessor: ComplexityAssessor::new(),
        }
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    /// Number of prior messages to include as context. Pure; always within
    /// `[base_size, max_size]`.
    pub fn optimal_window_size<S: AsRef<str>>(
        &self,
        recent_messages: &[S],
        topic_continuity: bool,
        complexity: f32,
    ) -> usize {
        let cfg = &self.config;
        let mut size = cfg.base_size;

        if topic_continuity {
            size += cfg.continuity_bonus;
        }

        if complexity > cfg.high_complexity_threshold {
            size += cfg.high_complexity_bonus;
        } else if complexity > cfg.medium_complexity_threshold {
            size += cfg.medium_complexity_bonus;
        }

        let qa_pairs = Self::count_qa_pairs(recent_messages);
        if qa_pairs > 0 {
            size = size.max(qa_pairs * 2);
        }

        size.clamp(cfg.base_size, cfg.max_size.max(cfg.base_size))
    }

    pub fn assess_complexity(&self, text: &str) -> f32 {
        self.assessor.assess(text)
    }

    /// A pair is a question-bearing message followed by any other message.
    pub fn count_qa_pairs<S: AsRef<str>>(messages: &[S]) -> usize {
        if messages.len() < 2 {
            return 0;
        }
        messages[..messages.len() - 1]
            .iter()
            .filter(|m| Self::is_question(m.as_ref()))
            .count()
    }

    fn is_question(text: &str) -> bool {
        if text.contains('?') {
            return true;
        }
        let lowered = text.to_lowercase();
        INTERROGATIVES
            .iter()
            .any(|word| TextUtils::contains_word_form(&lowered, word))
    }
}
