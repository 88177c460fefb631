//! Translation memory keyed by source text, language pair and a fingerprint of
//! the conversation that preceded it.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use super::cache_config::TranslationMemoryConfig;
use crate::context_engine::summarizer::ContextSummarizer;
use crate::context_engine::topic_analyzer::GENERAL_TOPIC;
use crate::memory_db::schema::{MemoryKey, MemoryStats, TranslationMemoryEntry};
use crate::stores::TranslationMemoryStore;

/// Digest over the ordered context lines and an optional topic tag.
///
/// Each line is length-prefixed, so reordering lines or moving text across a
/// line boundary changes the result.
pub fn fingerprint<S: AsRef<str>>(context: &[S], topic: Option<&str>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(context.len() as u64).to_le_bytes());
    for line in context {
        let bytes = line.as_ref().as_bytes();
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    match topic {
        Some(topic) => {
            hasher.update(&[1]);
            hasher.update(&(topic.len() as u64).to_le_bytes());
            hasher.update(topic.as_bytes());
        }
        None => {
            hasher.update(&[0]);
        }
    }
    hasher.finalize().to_hex().to_string()
}

/// One lookup or write against the memory.
#[derive(Debug, Clone, Copy)]
pub struct MemoryRequest<'a> {
    pub source_text: &'a str,
    pub source_lang: &'a str,
    pub target_lang: &'a str,
    pub context: &'a [String],
    pub topic: Option<&'a str>,
}

pub struct TranslationMemory {
    store: Arc<dyn TranslationMemoryStore>,
    summarizer: ContextSummarizer,
    config: TranslationMemoryConfig,
}

impl TranslationMemory {
    pub fn new(store: Arc<dyn TranslationMemoryStore>, config: TranslationMemoryConfig) -> Self {
        Self {
            store,
            summarizer: ContextSummarizer::default(),
            config,
        }
    }

    pub fn config(&self) -> &TranslationMemoryConfig {
        &self.config
    }

    fn context_tail<'a>(&self, context: &'a [String]) -> &'a [String] {
        &context[context.len().saturating_sub(self.config.context_tail)..]
    }

    pub fn key_for(&self, request: &MemoryRequest<'_>) -> MemoryKey {
        MemoryKey {
            source_text: request.source_text.to_string(),
            source_lang: request.source_lang.to_string(),
            target_lang: request.target_lang.to_string(),
            context_fingerprint: fingerprint(self.context_tail(request.context), request.topic),
        }
    }

    /// Creates the entry at full confidence, or reinforces an existing one
    /// without touching its stored translation. Failures are logged.
    pub fn store(
        &self,
        request: &MemoryRequest<'_>,
        translated_text: &str,
        entities: &[String],
    ) -> Option<TranslationMemoryEntry> {
        let key = self.key_for(request);
        let tail = self.context_tail(request.context);
        let now = Utc::now();

        let entry = TranslationMemoryEntry {
            source_text: key.source_text,
            source_lang: key.source_lang,
            target_lang: key.target_lang,
            context_fingerprint: key.context_fingerprint,
            translated_text: translated_text.to_string(),
            context_summary: self.summarizer.summarize(
                tail,
                request.topic.unwrap_or(GENERAL_TOPIC),
                self.config.summary_max_chars,
            ),
            topic_label: request.topic.unwrap_or(GENERAL_TOPIC).to_string(),
            entities_involved: entities.iter().take(self.config.max_entities).cloned().collect(),
            confidence_score: 1.0,
            usage_count: 0,
            last_used: now,
            created_at: now,
        };

        match self.store.upsert_reinforce(&entry, self.config.reinforce_step) {
            Ok(stored) => {
                debug!(
                    "Translation memory entry now at confidence {:.2}, used {} times",
                    stored.confidence_score, stored.usage_count
                );
                Some(stored)
            }
            Err(e) => {
                warn!("Failed to store translation memory: {}", e);
                crate::metrics::inc_store_failure("translation_memory");
                None
            }
        }
    }

    /// The stored translation when the entry exists and clears the confidence
    /// gate; a hit also bumps `usage_count` and `last_used`.
    pub fn retrieve(&self, request: &MemoryRequest<'_>) -> Option<String> {
        let key = self.key_for(request);
        match self.store.take_hit(&key, self.config.confidence_gate) {
            Ok(Some(entry)) => {
                crate::metrics::inc_memory_lookup("hit");
                debug!("Translation memory hit (used {} times)", entry.usage_count);
                Some(entry.translated_text)
            }
            Ok(None) => {
                crate::metrics::inc_memory_lookup("miss");
                None
            }
            Err(e) => {
                warn!("Translation memory lookup failed: {}", e);
                crate::metrics::inc_memory_lookup("error");
                None
            }
        }
    }

    pub fn entry(&self, request: &MemoryRequest<'_>) -> anyhow::Result<Option<TranslationMemoryEntry>> {
        self.store.get(&self.key_for(request))
    }

    pub fn stats(&self) -> anyhow::Result<MemoryStats> {
        self.store.stats(self.config.confidence_gate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_db::MemoryDatabase;
    use crate::stores::{InMemoryTranslationMemory, NullStore};
    use proptest::prelude::*;

    fn context() -> Vec<String> {
        vec![
            "Speaker A: did you finish the episode?".to_string(),
            "Speaker B: yes, Tanjiro finally won".to_string(),
        ]
    }

    fn request<'a>(context: &'a [String], topic: Option<&'a str>) -> MemoryRequest<'a> {
        MemoryRequest {
            source_text: "That fight was amazing",
            source_lang: "en",
            target_lang: "tl",
            context,
            topic,
        }
    }

    fn memory() -> TranslationMemory {
        TranslationMemory::new(
            Arc::new(InMemoryTranslationMemory::default()),
            TranslationMemoryConfig::default(),
        )
    }

    #[test]
    fn test_first_store_is_immediately_servable() {
        let memory = memory();
        let ctx = context();
        let stored = memory.store(&request(&ctx, Some("anime")), "Ang galing ng laban", &[]).unwrap();
        assert_eq!(stored.confidence_score, 1.0);
        assert_eq!(stored.usage_count, 0);

        assert_eq!(
            memory.retrieve(&request(&ctx, Some("anime"))).as_deref(),
            Some("Ang galing ng laban")
        );
        assert_eq!(memory.entry(&request(&ctx, Some("anime"))).unwrap().unwrap().usage_count, 1);
    }

    #[test]
    fn test_second_store_reinforces_without_overwriting() {
        let memory = memory();
        let ctx = context();
        memory.store(&request(&ctx, Some("anime")), "first", &[]);
        let second = memory.store(&request(&ctx, Some("anime")), "second", &[]).unwrap();

        assert_eq!(second.translated_text, "first");
        assert_eq!(second.usage_count, 1);
        assert_eq!(second.confidence_score, 1.0);
        assert_eq!(memory.retrieve(&request(&ctx, Some("anime"))).as_deref(), Some("first"));
    }

    #[test]
    fn test_context_and_topic_scope_the_key() {
        let memory = memory();
        let ctx = context();
        memory.store(&request(&ctx, Some("anime")), "cached", &[]);

        assert!(memory.retrieve(&request(&ctx, None)).is_none());
        let other: Vec<String> = vec!["Speaker A: hello".to_string()];
        assert!(memory.retrieve(&request(&other, Some("anime"))).is_none());
    }

    #[test]
    fn test_entries_below_gate_are_not_served() {
        let memory = TranslationMemory::new(
            Arc::new(InMemoryTranslationMemory::default()),
            TranslationMemoryConfig {
                confidence_gate: 1.0,
                ..TranslationMemoryConfig::default()
            },
        );
        let ctx = context();
        memory.store(&request(&ctx, None), "provisional", &[]);
        assert!(memory.retrieve(&request(&ctx, None)).is_none());
        assert_eq!(memory.entry(&request(&ctx, None)).unwrap().unwrap().usage_count, 0);
    }

    #[test]
    fn test_only_the_context_tail_is_fingerprinted() {
        let memory = memory();
        let mut long: Vec<String> = (0..15).map(|i| format!("line {}", i)).collect();
        memory.store(&request(&long, None), "cached", &[]);

        long[0] = "rewritten early line".to_string();
        assert_eq!(memory.retrieve(&request(&long, None)).as_deref(), Some("cached"));
        long[14] = "rewritten last line".to_string();
        assert!(memory.retrieve(&request(&long, None)).is_none());
    }

    #[test]
    fn test_summary_and_entities_are_kept() {
        let memory = memory();
        let ctx = context();
        let entities: Vec<String> = (0..12).map(|i| format!("e{}", i)).collect();
        let stored = memory.store(&request(&ctx, Some("anime")), "x", &entities).unwrap();
        assert_eq!(stored.entities_involved.len(), 10);
        assert_eq!(stored.topic_label, "anime");
        assert_eq!(stored.context_summary, ctx.join("\n"));
    }

    #[test]
    fn test_sqlite_backed_memory() {
        let db = MemoryDatabase::new_in_memory().unwrap();
        let memory = TranslationMemory::new(Arc::new(db.translation_memory.clone()), TranslationMemoryConfig::default());
        let ctx = context();
        memory.store(&request(&ctx, Some("anime")), "first", &[]);
        memory.store(&request(&ctx, Some("anime")), "second", &[]);
        assert_eq!(memory.retrieve(&request(&ctx, Some("anime"))).as_deref(), Some("first"));

        let stats = memory.stats().unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_usage, 2);
    }

    #[test]
    fn test_null_store_always_misses() {
        let memory = TranslationMemory::new(Arc::new(NullStore), TranslationMemoryConfig::default());
        let ctx = context();
        memory.store(&request(&ctx, None), "x", &[]);
        assert!(memory.retrieve(&request(&ctx, None)).is_none());
    }

    #[test]
    fn test_fingerprint_order_and_boundaries() {
        assert_ne!(fingerprint(&["a", "b"], None), fingerprint(&["b", "a"], None));
        assert_ne!(fingerprint(&["ab", "c"], None), fingerprint(&["a", "bc"], None));
        assert_ne!(fingerprint(&["a"], None), fingerprint(&["a"], Some("")));
        let empty: [&str; 0] = [];
        assert_ne!(fingerprint(&empty, None), fingerprint(&[""], None));
    }

    proptest! {
        #[test]
        fn prop_fingerprint_is_pure(
            ctx in proptest::collection::vec("[a-z ]{0,12}", 0..8),
            topic in proptest::option::of("[a-z]{1,8}"),
        ) {
            prop_assert_eq!(fingerprint(&ctx, topic.as_deref()), fingerprint(&ctx.clone(), topic.as_deref()));
        }

        #[test]
        fn prop_fingerprint_sees_order_and_topic(
            a in "[a-z]{1,10}",
            b in "[a-z]{1,10}",
            topic in "[a-z]{1,8}",
        ) {
            prop_assume!(a != b);
            let forward = vec![a.clone(), b.clone()];
            let reversed = vec![b, a];
            prop_assert_ne!(fingerprint(&forward, None), fingerprint(&reversed, None));
            prop_assert_ne!(fingerprint(&forward, None), fingerprint(&forward, Some(topic.as_str())));
        }
    }
}
