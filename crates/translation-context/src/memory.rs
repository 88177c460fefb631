//! Chat messages and the message store the engine reads context from.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};

/// A chat message. `timestamp` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender_id: String,
    pub timestamp: i64,
}

impl Message {
    pub fn new(id: impl Into<String>, text: impl Into<String>, sender_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            sender_id: sender_id.into(),
            timestamp,
        }
    }

    pub fn time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.timestamp)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Translation slots and metadata written back for a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationWrite {
    pub slots: HashMap<String, String>,
    pub metadata: serde_json::Value,
}

/// External message store. Implementations must return messages in a stable
/// total order: timestamp ascending, arrival order as tiebreak.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn get_messages(&self, session_id: &str, after_timestamp: Option<i64>) -> EngineResult<Vec<Message>>;

    async fn get_message(&self, session_id: &str, message_id: &str) -> EngineResult<Option<Message>>;

    async fn write_translation(
        &self,
        session_id: &str,
        message_id: &str,
        slots: HashMap<String, String>,
        metadata: serde_json::Value,
    ) -> EngineResult<()>;
}

#[derive(Debug, Clone)]
struct StoredEntry {
    message: Message,
    arrival: u64,
}

/// Process-local message store backed by `DashMap`.
#[derive(Clone, Default)]
pub struct InMemoryMessageStore {
    sessions: Arc<DashMap<String, Vec<StoredEntry>>>,
    translations: Arc<DashMap<(String, String), TranslationWrite>>,
    arrivals: Arc<AtomicU64>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&self, session_id: &str, message: Message) {
        let arrival = self.arrivals.fetch_add(1, Ordering::SeqCst);
        let mut entry = self.sessions.entry(session_id.to_string()).or_default();
        entry.push(StoredEntry { message, arrival });
    }

    pub fn add_messages(&self, session_id: &str, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.add_message(session_id, message);
        }
    }

    pub fn translation_for(&self, session_id: &str, message_id: &str) -> Option<TranslationWrite> {
        self.translations
            .get(&(session_id.to_string(), message_id.to_string()))
            .map(|t| t.clone())
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn get_messages(&self, session_id: &str, after_timestamp: Option<i64>) -> EngineResult<Vec<Message>> {
        let mut entries: Vec<StoredEntry> = match self.sessions.get(session_id) {
            Some(entries) => entries
                .iter()
                .filter(|e| after_timestamp.map_or(true, |after| e.message.timestamp >= after))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        entries.sort_by_key(|e| (e.message.timestamp, e.arrival));
        Ok(entries.into_iter().map(|e| e.message).collect())
    }

    async fn get_message(&self, session_id: &str, message_id: &str) -> EngineResult<Option<Message>> {
        Ok(self.sessions.get(session_id).and_then(|entries| {
            entries
                .iter()
                .find(|e| e.message.id == message_id)
                .map(|e| e.message.clone())
        }))
    }

    async fn write_translation(
        &self,
        session_id: &str,
        message_id: &str,
        slots: HashMap<String, String>,
        metadata: serde_json::Value,
    ) -> EngineResult<()> {
        let known = self
            .sessions
            .get(session_id)
            .map_or(false, |entries| entries.iter().any(|e| e.message.id == message_id));
        if !known {
            return Err(EngineError::MessageStore(format!(
                "message {} not found in session {}",
                message_id, session_id
            )));
        }

        let mut entry = self
            .translations
            .entry((session_id.to_string(), message_id.to_string()))
            .or_default();
        entry.slots.extend(slots);
        entry.metadata = metadata;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_messages_ordered_by_timestamp_then_arrival() {
        let store = InMemoryMessageStore::new();
        store.add_message("s1", Message::new("m3", "third", "a", 300));
        store.add_message("s1", Message::new("m1", "first", "a", 100));
        store.add_message("s1", Message::new("m2a", "tie one", "b", 200));
        store.add_message("s1", Message::new("m2b", "tie two", "a", 200));

        let ids: Vec<String> = store
            .get_messages("s1", None)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["m1", "m2a", "m2b", "m3"]);
    }

    #[tokio::test]
    async fn test_after_timestamp_is_inclusive() {
        let store = InMemoryMessageStore::new();
        store.add_message("s1", Message::new("m1", "old", "a", 100));
        store.add_message("s1", Message::new("m2", "boundary", "a", 200));
        store.add_message("s1", Message::new("m3", "new", "a", 300));

        let messages = store.get_messages("s1", Some(200)).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, "m2");
    }

    #[tokio::test]
    async fn test_write_translation_merges_slots() {
        let store = InMemoryMessageStore::new();
        store.add_message("s1", Message::new("m1", "hola", "a", 100));

        let mut slots = HashMap::new();
        slots.insert("translation1".to_string(), "hello".to_string());
        store
            .write_translation("s1", "m1", slots, serde_json::json!({"target_lang": "en"}))
            .await
            .unwrap();

        let written = store.translation_for("s1", "m1").unwrap();
        assert_eq!(written.slots.get("translation1").map(String::as_str), Some("hello"));
        assert_eq!(written.metadata["target_lang"], "en");
    }

    #[tokio::test]
    async fn test_write_translation_unknown_message() {
        let store = InMemoryMessageStore::new();
        let result = store
            .write_translation("s1", "missing", HashMap::new(), serde_json::Value::Null)
            .await;
        assert!(matches!(result, Err(EngineError::MessageStore(_))));
    }

    #[test]
    fn test_get_message_by_id() {
        let store = InMemoryMessageStore::new();
        store.add_message("s1", Message::new("m1", "hola", "a", 100));

        let found = tokio_test::block_on(store.get_message("s1", "m1")).unwrap();
        assert_eq!(found.map(|m| m.text).as_deref(), Some("hola"));
        assert!(tokio_test::block_on(store.get_message("s1", "m2")).unwrap().is_none());
        assert!(tokio_test::block_on(store.get_message("other", "m1")).unwrap().is_none());
    }
}
