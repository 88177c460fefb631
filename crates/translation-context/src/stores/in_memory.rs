//! Process-local store implementations. Every mutation goes through the
//! `DashMap` entry API, which holds the shard lock for the whole upsert.

use anyhow::Result;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;

use super::{
    append_snippet, ClusterStore, EntityStore, FeedbackStore, ProfileStore, TopicStore,
    TranslationMemoryStore,
};
use crate::memory_db::schema::{
    EntityMention, FeedbackRecord, MemoryKey, MemoryStats, MessageCluster, TopicRecord,
    TranslationMemoryEntry, UserProfile,
};
use crate::utils::TextUtils;

#[derive(Clone, Default)]
pub struct InMemoryTranslationMemory {
    entries: Arc<DashMap<MemoryKey, TranslationMemoryEntry>>,
}

impl TranslationMemoryStore for InMemoryTranslationMemory {
    fn upsert_reinforce(&self, entry: &TranslationMemoryEntry, step: f32) -> Result<TranslationMemoryEntry> {
        let now = Utc::now();
        let mut slot = self
            .entries
            .entry(entry.key())
            .and_modify(|existing| {
                existing.usage_count += 1;
                existing.confidence_score = (existing.confidence_score + step).min(1.0);
                existing.last_used = now;
            })
            .or_insert_with(|| entry.clone());
        Ok(slot.value_mut().clone())
    }

    fn take_hit(&self, key: &MemoryKey, gate: f32) -> Result<Option<TranslationMemoryEntry>> {
        match self.entries.get_mut(key) {
            Some(mut existing) if existing.confidence_score > gate => {
                existing.usage_count += 1;
                existing.last_used = Utc::now();
                Ok(Some(existing.clone()))
            }
            _ => Ok(None),
        }
    }

    fn get(&self, key: &MemoryKey) -> Result<Option<TranslationMemoryEntry>> {
        Ok(self.entries.get(key).map(|e| e.clone()))
    }

    fn stats(&self, gate: f32) -> Result<MemoryStats> {
        let mut stats = MemoryStats::default();
        for entry in self.entries.iter() {
            stats.entries += 1;
            stats.total_usage += u64::from(entry.usage_count);
            if entry.confidence_score > gate {
                stats.servable_entries += 1;
            }
        }
        Ok(stats)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryEntityStore {
    mentions: Arc<DashMap<(String, String, String), EntityMention>>,
}

impl EntityStore for InMemoryEntityStore {
    fn track(
        &self,
        session_id: &str,
        entity_type: &str,
        entity_name: &str,
        context: &str,
        max_snippet_chars: usize,
    ) -> Result<EntityMention> {
        let now = Utc::now();
        let key = (session_id.to_string(), entity_type.to_string(), entity_name.to_string());
        let mention = self
            .mentions
            .entry(key)
            .and_modify(|m| {
                m.mention_count += 1;
                m.last_seen = now;
                m.context_snippet = append_snippet(&m.context_snippet, context, max_snippet_chars);
            })
            .or_insert_with(|| EntityMention {
                session_id: session_id.to_string(),
                entity_type: entity_type.to_string(),
                entity_name: entity_name.to_string(),
                context_snippet: TextUtils::keep_tail(context, max_snippet_chars).to_string(),
                first_seen: now,
                last_seen: now,
                mention_count: 1,
            })
            .clone();
        Ok(mention)
    }

    fn session_entities(&self, session_id: &str) -> Result<Vec<EntityMention>> {
        let mut found: Vec<EntityMention> = self
            .mentions
            .iter()
            .filter(|m| m.session_id == session_id)
            .map(|m| m.clone())
            .collect();
        found.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then(a.entity_name.cmp(&b.entity_name)));
        Ok(found)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryTopicStore {
    segments: Arc<DashMap<String, Vec<TopicRecord>>>,
}

impl TopicStore for InMemoryTopicStore {
    fn record_topic(
        &self,
        session_id: &str,
        label: &str,
        confidence: f32,
        keywords: &[String],
    ) -> Result<TopicRecord> {
        let now = Utc::now();
        let mut segments = self.segments.entry(session_id.to_string()).or_default();

        if let Some(last) = segments.last_mut() {
            if last.topic_label == label {
                last.end_time = Some(now);
                last.message_count += 1;
                last.confidence = confidence;
                last.keywords = keywords.to_vec();
                return Ok(last.clone());
            }
            last.end_time = Some(now);
        }

        let record = TopicRecord {
            session_id: session_id.to_string(),
            topic_label: label.to_string(),
            confidence,
            keywords: keywords.to_vec(),
            start_time: now,
            end_time: None,
            message_count: 1,
        };
        segments.push(record.clone());
        Ok(record)
    }

    fn session_topics(&self, session_id: &str) -> Result<Vec<TopicRecord>> {
        Ok(self
            .segments
            .get(session_id)
            .map(|s| s.clone())
            .unwrap_or_default())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryClusterStore {
    clusters: Arc<DashMap<String, Vec<MessageCluster>>>,
}

impl ClusterStore for InMemoryClusterStore {
    fn replace_clusters(&self, session_id: &str, clusters: &[MessageCluster]) -> Result<()> {
        self.clusters.insert(session_id.to_string(), clusters.to_vec());
        Ok(())
    }

    fn session_clusters(&self, session_id: &str) -> Result<Vec<MessageCluster>> {
        Ok(self
            .clusters
            .get(session_id)
            .map(|c| c.clone())
            .unwrap_or_default())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryProfileStore {
    profiles: Arc<DashMap<String, UserProfile>>,
}

impl ProfileStore for InMemoryProfileStore {
    fn get_or_create(&self, user_id: &str) -> Result<UserProfile> {
        Ok(self
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile::new(user_id))
            .clone())
    }

    fn update(&self, user_id: &str, apply: &mut dyn FnMut(&mut UserProfile)) -> Result<UserProfile> {
        let mut profile = self
            .profiles
            .entry(user_id.to_string())
            .or_insert_with(|| UserProfile::new(user_id));
        apply(profile.value_mut());
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryFeedbackStore {
    records: Arc<DashMap<String, Vec<FeedbackRecord>>>,
}

impl FeedbackStore for InMemoryFeedbackStore {
    fn append(&self, record: &FeedbackRecord) -> Result<()> {
        self.records
            .entry(record.user_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn recent_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<FeedbackRecord>> {
        Ok(self
            .records
            .get(user_id)
            .map(|records| records.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
