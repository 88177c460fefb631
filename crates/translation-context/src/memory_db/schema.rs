//! Record types persisted by the engine stores
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::utils::OrderedMap;

/// entity_type -> entity names, in detection order.
pub type EntityMap = OrderedMap<Vec<String>>;

/// original phrase -> preferred translation.
pub type Glossary = OrderedMap<String>;

/// A named entity seen in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMention {
    pub session_id: String,
    pub entity_type: String,
    pub entity_name: String,
    pub context_snippet: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub mention_count: u32,
}

/// A contiguous topic segment of a session. `end_time` is open until the
/// segment is superseded or extended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub session_id: String,
    pub topic_label: String,
    pub confidence: f32,
    pub keywords: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub message_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryKey {
    pub source_text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub context_fingerprint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationMemoryEntry {
    pub source_text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub context_fingerprint: String,
    pub translated_text: String,
    pub context_summary: String,
    pub topic_label: String,
    pub entities_involved: Vec<String>,
    pub confidence_score: f32,
    pub usage_count: u32,
    pub last_used: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TranslationMemoryEntry {
    pub fn key(&self) -> MemoryKey {
        MemoryKey {
            source_text: self.source_text.clone(),
            source_lang: self.source_lang.clone(),
            target_lang: self.target_lang.clone(),
            context_fingerprint: self.context_fingerprint.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub entries: u64,
    pub total_usage: u64,
    pub servable_entries: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainInterest {
    pub domain: String,
    pub weight: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub preferred_formality: String,
    /// Sorted by weight, heaviest first.
    pub domain_interests: Vec<DomainInterest>,
    pub personal_glossary: Glossary,
    pub language_pair_stats: BTreeMap<String, u64>,
    /// context_type -> overrides applied on top of the default preferences.
    pub style_preferences: OrderedMap<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            preferred_formality: "casual".to_string(),
            domain_interests: Vec::new(),
            personal_glossary: Glossary::new(),
            language_pair_stats: BTreeMap::new(),
            style_preferences: OrderedMap::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub id: String,
    pub user_id: String,
    pub original_text: String,
    pub original_translation: String,
    pub corrected_translation: String,
    pub source_lang: String,
    pub target_lang: String,
    pub context: Option<String>,
    pub session_id: Option<String>,
    pub feedback_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageCluster {
    pub session_id: String,
    pub cluster_id: String,
    pub member_message_ids: Vec<String>,
    pub cluster_type: String,
    pub topic_label: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub coherence_score: f32,
}

/// Row counts per table plus on-disk size.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub translation_memory: i64,
    pub entity_mentions: i64,
    pub conversation_topics: i64,
    pub user_profiles: i64,
    pub translation_feedback: i64,
    pub message_clusters: i64,
    pub database_size_bytes: i64,
}
