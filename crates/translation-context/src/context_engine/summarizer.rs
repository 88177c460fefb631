//! Condenses long conversations before they are embedded in prompts or
//! stored as translation memory summaries.

use crate::context_engine::entity_extractor::EntityExtractor;
use crate::context_engine::topic_analyzer::GENERAL_TOPIC;
use crate::memory_db::schema::EntityMap;
use crate::utils::TextUtils;

/// Summary length used inside translation instructions.
pub const PROMPT_SUMMARY_CHARS: usize = 500;

#[derive(Debug, Clone)]
pub struct SummarizerConfig {
    /// Conversations longer than this are summarized instead of joined.
    pub summarize_above: usize,
    pub recent_messages: usize,
    pub entities_per_type: usize,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            summarize_above: 30,
            recent_messages: 10,
            entities_per_type: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContextSummarizer {
    config: SummarizerConfig,
}

impl ContextSummarizer {
    pub fn new(config: SummarizerConfig) -> Self {
        Self { config }
    }

    pub fn summarize<S: AsRef<str>>(&self, messages: &[S], topic: &str, max_chars: usize) -> String {
        if messages.is_empty() {
            return String::new();
        }

        let lines: Vec<&str> = messages.iter().map(AsRef::as_ref).collect();
        if lines.len() <= self.config.summarize_above {
            return TextUtils::truncate_chars(&lines.join("\n"), max_chars).to_string();
        }

        let mut parts = Vec::new();
        if !topic.is_empty() && topic != GENERAL_TOPIC {
            parts.push(format!("Discussion about {}", topic));
        }

        let mentions = self.format_entities(&self.collect_entities(&lines));
        if !mentions.is_empty() {
            parts.push(format!("Mentions: {}", mentions));
        }
        parts.push("Recent messages:".to_string());

        let recent = &lines[lines.len().saturating_sub(self.config.recent_messages)..];
        let summary = format!("{}\n{}", parts.join(". "), recent.join("\n"));
        TextUtils::truncate_chars(&summary, max_chars).to_string()
    }

    fn collect_entities(&self, lines: &[&str]) -> EntityMap {
        let mut all = EntityMap::new();
        for line in lines {
            for (entity_type, names) in EntityExtractor::lexicon_matches(line, self.config.entities_per_type) {
                let slot = all.get_or_insert_with(&entity_type, Vec::new);
                for name in names {
                    if !slot.contains(&name) {
                        slot.push(name);
                    }
                }
            }
        }
        all
    }

    fn format_entities(&self, entities: &EntityMap) -> String {
        entities
            .iter()
            .filter(|(_, names)| !names.is_empty())
            .map(|(entity_type, names)| {
                let shown: Vec<&str> = names
                    .iter()
                    .take(self.config.entities_per_type)
                    .map(String::as_str)
                    .collect();
                format!("{}: {}", entity_type, shown.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}
