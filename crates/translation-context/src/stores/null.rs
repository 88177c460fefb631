//! Store that accepts every write and remembers nothing.

use anyhow::Result;
use chrono::Utc;

use super::{ClusterStore, EntityStore, FeedbackStore, ProfileStore, TopicStore, TranslationMemoryStore};
use crate::memory_db::schema::{
    EntityMention, FeedbackRecord, MemoryKey, MemoryStats, MessageCluster, TopicRecord,
    TranslationMemoryEntry, UserProfile,
};
use crate::utils::TextUtils;

#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl TranslationMemoryStore for NullStore {
    fn upsert_reinforce(&self, entry: &TranslationMemoryEntry, _step: f32) -> Result<TranslationMemoryEntry> {
        Ok(entry.clone())
    }

    fn take_hit(&self, _key: &MemoryKey, _gate: f32) -> Result<Option<TranslationMemoryEntry>> {
        Ok(None)
    }

    fn get(&self, _key: &MemoryKey) -> Result<Option<TranslationMemoryEntry>> {
        Ok(None)
    }

    fn stats(&self, _gate: f32) -> Result<MemoryStats> {
        Ok(MemoryStats::default())
    }
}

impl EntityStore for NullStore {
    fn track(
        &self,
        session_id: &str,
        entity_type: &str,
        entity_name: &str,
        context: &str,
        max_snippet_chars: usize,
    ) -> Result<EntityMention> {
        let now = Utc::now();
        Ok(EntityMention {
            session_id: session_id.to_string(),
            entity_type: entity_type.to_string(),
            entity_name: entity_name.to_string(),
            context_snippet: TextUtils::keep_tail(context, max_snippet_chars).to_string(),
            first_seen: now,
            last_seen: now,
            mention_count: 1,
        })
    }

    fn session_entities(&self, _session_id: &str) -> Result<Vec<EntityMention>> {
        Ok(Vec::new())
    }
}

impl TopicStore for NullStore {
    fn record_topic(
        &self,
        session_id: &str,
        label: &str,
        confidence: f32,
        keywords: &[String],
    ) -> Result<TopicRecord> {
        Ok(TopicRecord {
            session_id: session_id.to_string(),
            topic_label: label.to_string(),
            confidence,
            keywords: keywords.to_vec(),
            start_time: Utc::now(),
            end_time: None,
            message_count: 1,
        })
    }

    fn session_topics(&self, _session_id: &str) -> Result<Vec<TopicRecord>> {
        Ok(Vec::new())
    }
}

impl ClusterStore for NullStore {
    fn replace_clusters(&self, _session_id: &str, _clusters: &[MessageCluster]) -> Result<()> {
        Ok(())
    }

    fn session_clusters(&self, _session_id: &str) -> Result<Vec<MessageCluster>> {
        Ok(Vec::new())
    }
}

impl ProfileStore for NullStore {
    fn get_or_create(&self, user_id: &str) -> Result<UserProfile> {
        Ok(UserProfile::new(user_id))
    }

    fn update(&self, user_id: &str, apply: &mut dyn FnMut(&mut UserProfile)) -> Result<UserProfile> {
        let mut profile = UserProfile::new(user_id);
        apply(&mut profile);
        Ok(profile)
    }
}

impl FeedbackStore for NullStore {
    fn append(&self, _record: &FeedbackRecord) -> Result<()> {
        Ok(())
    }

    fn recent_for_user(&self, _user_id: &str, _limit: usize) -> Result<Vec<FeedbackRecord>> {
        Ok(Vec::new())
    }
}
