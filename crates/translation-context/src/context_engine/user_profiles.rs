//! Per-user translation preferences: formality, glossary and domain interests.
//!
//! Every operation is best effort. Storage problems are logged and counted,
//! and readers get the default profile instead of an error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::memory_db::schema::{DomainInterest, Glossary, UserProfile};
use crate::stores::ProfileStore;

pub const MAX_DOMAIN_INTERESTS: usize = 10;
pub const DEFAULT_FORMALITY: &str = "casual";

/// Preferences consulted when building a translation instruction. Fields of a
/// context-specific style override replace these shallowly; unknown override
/// fields land in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub formality: String,
    pub glossary: Glossary,
    pub domains: Vec<DomainInterest>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            formality: DEFAULT_FORMALITY.to_string(),
            glossary: Glossary::new(),
            domains: Vec::new(),
            extra: Map::new(),
        }
    }
}

pub fn language_pair(source_lang: &str, target_lang: &str) -> String {
    format!("{}-{}", source_lang, target_lang)
}

pub struct UserProfileManager {
    store: Arc<dyn ProfileStore>,
}

impl UserProfileManager {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    pub fn get_or_create(&self, user_id: &str) -> Option<UserProfile> {
        match self.store.get_or_create(user_id) {
            Ok(profile) => Some(profile),
            Err(e) => {
                warn!("Failed to load profile for {}: {}", user_id, e);
                None
            }
        }
    }

    fn update(&self, user_id: &str, what: &str, apply: &mut dyn FnMut(&mut UserProfile)) -> Option<UserProfile> {
        match self.store.update(user_id, apply) {
            Ok(profile) => {
                debug!("Updated {} for user {}", what, user_id);
                Some(profile)
            }
            Err(e) => {
                warn!("Failed to update {} for {}: {}", what, user_id, e);
                crate::metrics::inc_store_failure("profiles");
                None
            }
        }
    }

    /// Adds `weight` to an existing domain or appends it, then keeps the ten
    /// heaviest domains, heaviest first.
    pub fn update_domain_interest(&self, user_id: &str, domain: &str, weight: f32) -> Option<UserProfile> {
        self.update(user_id, "domain interests", &mut |profile: &mut UserProfile| {
            Self::merge_domain(&mut profile.domain_interests, domain, weight);
        })
    }

    fn merge_domain(domains: &mut Vec<DomainInterest>, domain: &str, weight: f32) {
        match domains.iter_mut().find(|d| d.domain == domain) {
            Some(existing) => existing.weight += weight,
            None => domains.push(DomainInterest {
                domain: domain.to_string(),
                weight,
            }),
        }
        domains.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));
        domains.truncate(MAX_DOMAIN_INTERESTS);
    }

    /// Stores under `original`, or `original|pair` when a language pair is given.
    pub fn add_glossary_term(
        &self,
        user_id: &str,
        original: &str,
        translation: &str,
        language_pair: Option<&str>,
    ) -> Option<UserProfile> {
        let key = match language_pair {
            Some(pair) if !pair.is_empty() => format!("{}|{}", original, pair),
            _ => original.to_string(),
        };
        self.update(user_id, "glossary", &mut |profile: &mut UserProfile| {
            profile.personal_glossary.insert(key.clone(), translation.to_string());
        })
    }

    pub fn record_language_pair(&self, user_id: &str, source_lang: &str, target_lang: &str) -> Option<UserProfile> {
        let pair = language_pair(source_lang, target_lang);
        self.update(user_id, "language pair stats", &mut |profile: &mut UserProfile| {
            *profile.language_pair_stats.entry(pair.clone()).or_insert(0) += 1;
        })
    }

    pub fn set_formality(&self, user_id: &str, formality: &str) -> Option<UserProfile> {
        self.update(user_id, "formality", &mut |profile: &mut UserProfile| {
            profile.preferred_formality = formality.to_string();
        })
    }

    pub fn set_style_preference(&self, user_id: &str, context_type: &str, overrides: Value) -> Option<UserProfile> {
        self.update(user_id, "style preferences", &mut |profile: &mut UserProfile| {
            profile.style_preferences.insert(context_type, overrides.clone());
        })
    }

    pub fn get_user_preferences(&self, user_id: &str, context_type: Option<&str>) -> UserPreferences {
        let Some(profile) = self.get_or_create(user_id) else {
            return UserPreferences::default();
        };

        let base = UserPreferences {
            formality: profile.preferred_formality.clone(),
            glossary: profile.personal_glossary.clone(),
            domains: profile.domain_interests.clone(),
            extra: Map::new(),
        };

        match context_type.and_then(|c| profile.style_preferences.get(c)) {
            Some(Value::Object(overrides)) => Self::overlay(base, overrides),
            _ => base,
        }
    }

    /// Shallow merge: each override field replaces the whole base field.
    fn overlay(base: UserPreferences, overrides: &Map<String, Value>) -> UserPreferences {
        let Ok(Value::Object(mut merged)) = serde_json::to_value(&base) else {
            return base;
        };
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
        match serde_json::from_value(Value::Object(merged)) {
            Ok(preferences) => preferences,
            Err(e) => {
                warn!("Ignoring malformed style preference override: {}", e);
                base
            }
        }
    }

    /// Glossary entries that apply to `source-target`: global entries plus
    /// pair-specific ones, which win over a global entry for the same phrase.
    pub fn glossary_for_pair(glossary: &Glossary, source_lang: &str, target_lang: &str) -> Glossary {
        let suffix = format!("|{}", language_pair(source_lang, target_lang));
        let mut applicable = Glossary::new();

        for (key, translation) in glossary.iter().filter(|(k, _)| !k.contains('|')) {
            applicable.insert(key, translation.clone());
        }
        for (key, translation) in glossary.iter() {
            if let Some(original) = key.strip_suffix(suffix.as_str()) {
                applicable.insert(original, translation.clone());
            }
        }

        applicable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::{InMemoryProfileStore, NullStore};
    use serde_json::json;

    fn manager() -> UserProfileManager {
        UserProfileManager::new(Arc::new(InMemoryProfileStore::default()))
    }

    #[test]
    fn test_defaults() {
        let profile = manager().get_or_create("u1").unwrap();
        assert_eq!(profile.preferred_formality, "casual");
        assert!(profile.domain_interests.is_empty());
        assert!(profile.personal_glossary.is_empty());
    }

    #[test]
    fn test_domain_interest_accumulates() {
        let manager = manager();
        manager.update_domain_interest("u1", "anime", 1.0);
        let profile = manager.update_domain_interest("u1", "anime", 1.0).unwrap();
        assert_eq!(
            profile.domain_interests,
            vec![DomainInterest {
                domain: "anime".to_string(),
                weight: 2.0
            }]
        );
    }

    #[test]
    fn test_domain_interests_sorted_and_capped() {
        let manager = manager();
        for i in 0..12 {
            manager.update_domain_interest("u1", &format!("d{}", i), i as f32);
        }
        let profile = manager.update_domain_interest("u1", "d0", 100.0).unwrap();
        let names: Vec<&str> = profile.domain_interests.iter().map(|d| d.domain.as_str()).collect();
        assert_eq!(names.len(), MAX_DOMAIN_INTERESTS);
        assert_eq!(names[0], "d0");
        assert_eq!(names[1], "d11");
    }

    #[test]
    fn test_glossary_keys_and_pair_resolution() {
        let manager = manager();
        manager.add_glossary_term("u1", "nakama", "comrade", None);
        manager.add_glossary_term("u1", "nakama", "kaibigan", Some("en-tl"));
        manager.add_glossary_term("u1", "senpai", "upperclassman", Some("ja-en"));
        let profile = manager.get_or_create("u1").unwrap();
        assert_eq!(profile.personal_glossary.len(), 3);
        assert!(profile.personal_glossary.contains_key("nakama|en-tl"));

        let glossary = UserProfileManager::glossary_for_pair(&profile.personal_glossary, "en", "tl");
        assert_eq!(glossary.len(), 1);
        assert_eq!(glossary.get("nakama").map(String::as_str), Some("kaibigan"));

        let glossary = UserProfileManager::glossary_for_pair(&profile.personal_glossary, "en", "ja");
        assert_eq!(glossary.get("nakama").map(String::as_str), Some("comrade"));
    }

    #[test]
    fn test_preferences_with_style_override() {
        let manager = manager();
        manager.set_formality("u1", "formal");
        manager.set_style_preference("u1", "anime", json!({"formality": "casual", "honorifics": true}));

        let plain = manager.get_user_preferences("u1", None);
        assert_eq!(plain.formality, "formal");
        assert!(plain.extra.is_empty());

        let anime = manager.get_user_preferences("u1", Some("anime"));
        assert_eq!(anime.formality, "casual");
        assert_eq!(anime.extra.get("honorifics"), Some(&json!(true)));

        let other = manager.get_user_preferences("u1", Some("business"));
        assert_eq!(other.formality, "formal");
    }

    #[test]
    fn test_malformed_override_is_ignored() {
        let manager = manager();
        manager.set_style_preference("u1", "anime", json!({"formality": 3}));
        assert_eq!(manager.get_user_preferences("u1", Some("anime")).formality, "casual");
    }

    #[test]
    fn test_language_pair_stats() {
        let manager = manager();
        manager.record_language_pair("u1", "en", "tl");
        let profile = manager.record_language_pair("u1", "en", "tl").unwrap();
        assert_eq!(profile.language_pair_stats.get("en-tl"), Some(&2));
    }

    #[test]
    fn test_null_store_degrades_to_defaults() {
        let manager = UserProfileManager::new(Arc::new(NullStore));
        manager.update_domain_interest("u1", "anime", 1.0);
        assert_eq!(manager.get_user_preferences("u1", Some("anime")), UserPreferences::default());
    }
}
