//! Storage capabilities consumed by the engine.
//!
//! Each capability has a SQLite implementation (`memory_db`), a process-local
//! `DashMap` implementation and a null implementation. Which one is used is
//! decided once, when [`EngineStores`] is built.

pub mod in_memory;
pub mod null;

use anyhow::Result;
use std::sync::Arc;

use crate::config::StoreBackend;
use crate::memory_db::schema::{
    EntityMention, FeedbackRecord, MemoryKey, MemoryStats, MessageCluster, TopicRecord,
    TranslationMemoryEntry, UserProfile,
};
use crate::memory_db::MemoryDatabase;
use crate::utils::TextUtils;

pub use in_memory::{
    InMemoryClusterStore, InMemoryEntityStore, InMemoryFeedbackStore, InMemoryProfileStore,
    InMemoryTopicStore, InMemoryTranslationMemory,
};
pub use null::NullStore;

pub trait TranslationMemoryStore: Send + Sync {
    /// Creates the entry, or on an existing key increments `usage_count` and
    /// raises `confidence_score` by `step` (capped at 1.0). The stored
    /// translated text is never overwritten. Atomic per key.
    fn upsert_reinforce(&self, entry: &TranslationMemoryEntry, step: f32) -> Result<TranslationMemoryEntry>;

    /// Returns the entry and records the hit (`usage_count + 1`, `last_used`)
    /// only when its confidence is strictly above `gate`.
    fn take_hit(&self, key: &MemoryKey, gate: f32) -> Result<Option<TranslationMemoryEntry>>;

    fn get(&self, key: &MemoryKey) -> Result<Option<TranslationMemoryEntry>>;

    fn stats(&self, gate: f32) -> Result<MemoryStats>;
}

pub trait EntityStore: Send + Sync {
    /// Upserts a mention, appending `context` to the snippet and keeping at
    /// most `max_snippet_chars` of its most recent tail.
    fn track(
        &self,
        session_id: &str,
        entity_type: &str,
        entity_name: &str,
        context: &str,
        max_snippet_chars: usize,
    ) -> Result<EntityMention>;

    fn session_entities(&self, session_id: &str) -> Result<Vec<EntityMention>>;
}

pub trait TopicStore: Send + Sync {
    /// Extends the session's latest segment when the label matches,
    /// otherwise closes it and opens a new one.
    fn record_topic(
        &self,
        session_id: &str,
        label: &str,
        confidence: f32,
        keywords: &[String],
    ) -> Result<TopicRecord>;

    fn session_topics(&self, session_id: &str) -> Result<Vec<TopicRecord>>;
}

pub trait ClusterStore: Send + Sync {
    /// Replaces the previous clustering pass of the session.
    fn replace_clusters(&self, session_id: &str, clusters: &[MessageCluster]) -> Result<()>;

    fn session_clusters(&self, session_id: &str) -> Result<Vec<MessageCluster>>;
}

pub trait ProfileStore: Send + Sync {
    fn get_or_create(&self, user_id: &str) -> Result<UserProfile>;

    /// Read-modify-write of one profile as a single atomic step.
    fn update(&self, user_id: &str, apply: &mut dyn FnMut(&mut UserProfile)) -> Result<UserProfile>;
}

pub trait FeedbackStore: Send + Sync {
    fn append(&self, record: &FeedbackRecord) -> Result<()>;

    /// Newest first.
    fn recent_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<FeedbackRecord>>;
}

/// Joins a new context fragment onto an existing snippet and keeps the tail.
pub(crate) fn append_snippet(existing: &str, addition: &str, max_chars: usize) -> String {
    let joined = match (existing.is_empty(), addition.is_empty()) {
        (_, true) => existing.to_string(),
        (true, false) => addition.to_string(),
        (false, false) => format!("{}\n{}", existing, addition),
    };
    TextUtils::keep_tail(&joined, max_chars).to_string()
}

/// The full set of store capabilities handed to the orchestrator.
#[derive(Clone)]
pub struct EngineStores {
    pub memory: Arc<dyn TranslationMemoryStore>,
    pub entities: Arc<dyn EntityStore>,
    pub topics: Arc<dyn TopicStore>,
    pub clusters: Arc<dyn ClusterStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub feedback: Arc<dyn FeedbackStore>,
}

impl EngineStores {
    pub fn in_memory() -> Self {
        Self {
            memory: Arc::new(InMemoryTranslationMemory::default()),
            entities: Arc::new(InMemoryEntityStore::default()),
            topics: Arc::new(InMemoryTopicStore::default()),
            clusters: Arc::new(InMemoryClusterStore::default()),
            profiles: Arc::new(InMemoryProfileStore::default()),
            feedback: Arc::new(InMemoryFeedbackStore::default()),
        }
    }

    pub fn null() -> Self {
        let store = Arc::new(NullStore);
        Self {
            memory: store.clone(),
            entities: store.clone(),
            topics: store.clone(),
            clusters: store.clone(),
            profiles: store.clone(),
            feedback: store,
        }
    }

    pub fn sqlite(db: &MemoryDatabase) -> Self {
        Self {
            memory: Arc::new(db.translation_memory.clone()),
            entities: Arc::new(db.entities.clone()),
            topics: Arc::new(db.sessions.clone()),
            clusters: Arc::new(db.sessions.clone()),
            profiles: Arc::new(db.profiles.clone()),
            feedback: Arc::new(db.feedback.clone()),
        }
    }

    /// Builds the stores selected by configuration. The database handle is
    /// returned alongside so the host can report stats and close it.
    pub fn from_backend(
        backend: StoreBackend,
        database_path: &str,
    ) -> Result<(Self, Option<Arc<MemoryDatabase>>)> {
        match backend {
            StoreBackend::Sqlite => {
                let db = Arc::new(MemoryDatabase::new(std::path::Path::new(database_path))?);
                Ok((Self::sqlite(&db), Some(db)))
            }
            StoreBackend::Memory => Ok((Self::in_memory(), None)),
            StoreBackend::None => Ok((Self::null(), None)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_snippet() {
        assert_eq!(append_snippet("", "first", 100), "first");
        assert_eq!(append_snippet("first", "", 100), "first");
        assert_eq!(append_snippet("first", "second", 100), "first\nsecond");
        assert_eq!(append_snippet("first", "second", 8), "t\nsecond");
    }
}
