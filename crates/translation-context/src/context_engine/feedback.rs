//! User corrections: always recorded, promoted into the glossary when the
//! correction changes enough of the translation.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::context_engine::user_profiles::{language_pair, UserProfileManager};
use crate::memory_db::schema::FeedbackRecord;
use crate::stores::FeedbackStore;
use crate::utils::TextUtils;

pub const CORRECTION: &str = "correction";

/// Share of the original's distinct words that must change.
const SIGNIFICANCE_RATIO: f32 = 0.3;

#[derive(Debug, Clone, Default)]
pub struct FeedbackInput {
    pub user_id: String,
    pub original_text: String,
    pub original_translation: String,
    pub corrected_translation: String,
    pub source_lang: String,
    pub target_lang: String,
    pub context: Option<String>,
    pub session_id: Option<String>,
}

pub struct FeedbackProcessor {
    store: Arc<dyn FeedbackStore>,
    profiles: Arc<UserProfileManager>,
}

impl FeedbackProcessor {
    pub fn new(store: Arc<dyn FeedbackStore>, profiles: Arc<UserProfileManager>) -> Self {
        Self { store, profiles }
    }

    /// Appends the record and promotes significant corrections. `None` when
    /// the record could not be persisted; that is logged, never raised.
    pub fn record(&self, input: FeedbackInput) -> Option<FeedbackRecord> {
        let record = FeedbackRecord {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: input.user_id,
            original_text: input.original_text,
            original_translation: input.original_translation,
            corrected_translation: input.corrected_translation,
            source_lang: input.source_lang,
            target_lang: input.target_lang,
            context: input.context.filter(|c| !c.is_empty()),
            session_id: input.session_id.filter(|s| !s.is_empty()),
            feedback_type: CORRECTION.to_string(),
            created_at: Utc::now(),
        };

        if let Err(e) = self.store.append(&record) {
            warn!("Failed to record feedback from {}: {}", record.user_id, e);
            crate::metrics::inc_store_failure("feedback");
            return None;
        }

        if Self::is_significant(&record.original_translation, &record.corrected_translation) {
            let pair = language_pair(&record.source_lang, &record.target_lang);
            info!("Promoting correction from {} into glossary ({})", record.user_id, pair);
            self.profiles.add_glossary_term(
                &record.user_id,
                &record.original_text,
                &record.corrected_translation,
                Some(&pair),
            );
        }

        Some(record)
    }

    /// Case and surrounding whitespace never count. Otherwise the symmetric
    /// difference of the word sets must exceed 30% of the original's words.
    pub fn is_significant(original: &str, corrected: &str) -> bool {
        if original.trim().to_lowercase() == corrected.trim().to_lowercase() {
            return false;
        }

        let original_words = TextUtils::word_set(original);
        if original_words.is_empty() {
            return true;
        }
        let corrected_words = TextUtils::word_set(corrected);
        let changed = original_words.symmetric_difference(&corrected_words).count();
        changed as f32 / original_words.len() as f32 > SIGNIFICANCE_RATIO
    }

    /// Most recent corrections first.
    pub fn get_user_corrections(&self, user_id: &str, limit: usize) -> Vec<FeedbackRecord> {
        self.store.recent_for_user(user_id, limit).unwrap_or_else(|e| {
            warn!("Failed to load corrections for {}: {}", user_id, e);
            Vec::new()
        })
    }
}
