//! Named entity detection: lexicon matching first, classifier only for
//! ambiguous longer messages.

use lazy_static::lazy_static;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clients::Classifier;
use crate::memory_db::schema::{EntityMap, EntityMention};
use crate::stores::EntityStore;
use crate::utils::TextUtils;

pub const ANIME_CHARACTER: &str = "anime_character";
pub const ANIME_TITLE: &str = "anime_title";
pub const TECH_TERM: &str = "tech_term";

lazy_static! {
    static ref ANIME_CHARACTERS: Vec<&'static str> = vec![
        // Demon Slayer
        "tanjiro", "nezuko", "zenitsu", "inosuke", "giyu", "shinobu", "rengoku", "tengen",
        "mitsuri", "obanai", "sanemi", "gyomei", "akaza", "doma", "kokushibo", "muzan",
        "hashira", "pillar",
        // Other long-running series
        "naruto", "sasuke", "sakura", "kakashi", "goku", "vegeta", "luffy", "zoro",
        "ichigo", "rukia", "eren", "mikasa", "levi", "edward", "alphonse",
    ];
    static ref ANIME_TITLES: Vec<&'static str> = vec![
        "demon slayer", "kimetsu no yaiba", "naruto", "one piece", "attack on titan",
        "my hero academia", "jujutsu kaisen", "bleach", "dragon ball", "fullmetal alchemist",
    ];
    static ref TECH_TERMS: Vec<&'static str> = vec!["ai", "api", "code", "app", "software", "database"];
}

const SLOW_PATH_INDICATORS: &[&str] = &["name", "character", "called", "titled"];

const SLOW_PATH_CATEGORIES: &[&str] = &[
    ANIME_CHARACTER,
    ANIME_TITLE,
    "person",
    "place",
    TECH_TERM,
    "product",
];

#[derive(Debug, Clone)]
pub struct EntityExtractorConfig {
    pub max_per_category: usize,
    /// Messages must be longer than this (in characters) to reach the classifier.
    pub slow_path_min_chars: usize,
    pub min_text_chars: usize,
    pub max_snippet_chars: usize,
}

impl Default for EntityExtractorConfig {
    fn default() -> Self {
        Self {
            max_per_category: 3,
            slow_path_min_chars: 50,
            min_text_chars: 3,
            max_snippet_chars: 1000,
        }
    }
}

pub struct EntityExtractor {
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn EntityStore>,
    config: EntityExtractorConfig,
}

impl EntityExtractor {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn EntityStore>,
        config: EntityExtractorConfig,
    ) -> Self {
        Self { classifier, store, config }
    }

    /// Entities in `text` by category, at most three names per category.
    /// Never fails; classifier problems yield an empty map.
    pub async fn extract(&self, text: &str, context: Option<&str>) -> EntityMap {
        if text.trim().chars().count() < self.config.min_text_chars {
            return EntityMap::new();
        }

        let found = self.extract_fast(text);
        if !self.needs_slow_path(text, &found) {
            return found;
        }

        debug!("No lexicon entities in a long message, asking classifier");
        match self.classifier.classify(&Self::build_prompt(text, context)).await {
            Ok(response) => self.parse_response(&response),
            Err(e) => {
                warn!("Entity classification failed: {}", e);
                EntityMap::new()
            }
        }
    }

    /// Lexicon pass. Word-boundary matches, ordered by first occurrence.
    pub fn extract_fast(&self, text: &str) -> EntityMap {
        Self::lexicon_matches(text, self.config.max_per_category)
    }

    /// The lexicon pass without an extractor instance.
    pub fn lexicon_matches(text: &str, max_per_category: usize) -> EntityMap {
        let lowered = text.to_lowercase();
        let mut found = EntityMap::new();

        let groups: [(&str, &[&str], bool); 3] = [
            (ANIME_CHARACTER, ANIME_CHARACTERS.as_slice(), true),
            (ANIME_TITLE, ANIME_TITLES.as_slice(), true),
            (TECH_TERM, TECH_TERMS.as_slice(), false),
        ];

        for (category, lexicon, title_case) in groups {
            let mut hits: Vec<(usize, &str)> = lexicon
                .iter()
                .filter_map(|term| TextUtils::find_word(&lowered, term).map(|pos| (pos, *term)))
                .collect();
            if hits.is_empty() {
                continue;
            }
            hits.sort_by_key(|(pos, _)| *pos);

            let names: Vec<String> = hits
                .into_iter()
                .take(max_per_category)
                .map(|(_, term)| if title_case { TextUtils::title_case(term) } else { term.to_string() })
                .collect();
            found.insert(category, names);
        }

        found
    }

    fn needs_slow_path(&self, text: &str, fast: &EntityMap) -> bool {
        if !fast.is_empty() || text.chars().count() <= self.config.slow_path_min_chars {
            return false;
        }
        let lowered = text.to_lowercase();
        SLOW_PATH_INDICATORS.iter().any(|w| lowered.contains(w))
    }

    fn build_prompt(text: &str, context: Option<&str>) -> String {
        let mut prompt = format!(
            "List the named entities in the message below.\n\
             Allowed categories: {}.\n\
             Answer as category:name,name|category:name and nothing else. \
             Answer none if there are no entities.\n",
            SLOW_PATH_CATEGORIES.join(", ")
        );
        if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
            prompt.push_str(&format!("\nRecent conversation:\n{}\n", context));
        }
        prompt.push_str(&format!("\nMessage: {}", text));
        prompt
    }

    /// Parses `category:a,b|category:c`. Anything unparseable is skipped.
    pub fn parse_response(&self, response: &str) -> EntityMap {
        let response = response.trim();
        let mut found = EntityMap::new();
        if response.is_empty() || response.eq_ignore_ascii_case("none") {
            return found;
        }

        for part in response.split('|') {
            let Some((category, names)) = part.split_once(':') else {
                continue;
            };
            let category = category.trim().to_lowercase().replace(' ', "_");
            if category.is_empty() || !category.chars().all(|c| c.is_alphanumeric() || c == '_') {
                continue;
            }

            let names: Vec<String> = names
                .split(',')
                .map(TextUtils::strip_quotes)
                .filter(|n| !n.is_empty() && !n.eq_ignore_ascii_case("none"))
                .take(self.config.max_per_category)
                .map(str::to_string)
                .collect();
            if names.is_empty() {
                continue;
            }

            let slot = found.get_or_insert_with(&category, Vec::new);
            for name in names {
                if slot.len() < self.config.max_per_category && !slot.contains(&name) {
                    slot.push(name);
                }
            }
        }

        found
    }

    /// Records one mention. Storage failures are logged and reported as `None`.
    pub fn track(
        &self,
        session_id: &str,
        entity_type: &str,
        entity_name: &str,
        context: &str,
    ) -> Option<EntityMention> {
        match self.store.track(
            session_id,
            entity_type,
            entity_name,
            context,
            self.config.max_snippet_chars,
        ) {
            Ok(mention) => Some(mention),
            Err(e) => {
                warn!("Failed to track entity {}:{} in {}: {}", entity_type, entity_name, session_id, e);
                crate::metrics::inc_store_failure("entities");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::StaticClassifier;
    use crate::stores::InMemoryEntityStore;

    fn extractor(classifier: StaticClassifier) -> (EntityExtractor, Arc<StaticClassifier>) {
        let classifier = Arc::new(classifier);
        let extractor = EntityExtractor::new(
            classifier.clone(),
            Arc::new(InMemoryEntityStore::default()),
            EntityExtractorConfig::default(),
        );
        (extractor, classifier)
    }

    #[tokio::test]
    async fn test_characters_are_title_cased_in_text_order() {
        let (extractor, classifier) = extractor(StaticClassifier::failing());
        let entities = extractor.extract("Tanjiro and Nezuko fight Akaza", None).await;
        assert_eq!(
            entities.get(ANIME_CHARACTER).unwrap(),
            &vec!["Tanjiro".to_string(), "Nezuko".to_string(), "Akaza".to_string()]
        );
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_each_category_capped_at_three() {
        let (extractor, _) = extractor(StaticClassifier::failing());
        let entities = extractor
            .extract("zenitsu, inosuke, tanjiro, nezuko and giyu", None)
            .await;
        assert_eq!(
            entities.get(ANIME_CHARACTER).unwrap(),
            &vec!["Zenitsu".to_string(), "Inosuke".to_string(), "Tanjiro".to_string()]
        );
    }

    #[tokio::test]
    async fn test_titles_and_tech_terms() {
        let (extractor, _) = extractor(StaticClassifier::failing());
        let entities = extractor
            .extract("I wrote an app that lists every Demon Slayer episode via an API", None)
            .await;
        assert_eq!(entities.get(ANIME_TITLE).unwrap(), &vec!["Demon Slayer".to_string()]);
        assert_eq!(
            entities.get(TECH_TERM).unwrap(),
            &vec!["app".to_string(), "api".to_string()]
        );
    }

    #[test]
    fn test_lexicon_terms_need_word_boundaries() {
        let found = EntityExtractor::lexicon_matches("She said the happy capital decoded it", 3);
        assert!(found.get(TECH_TERM).is_none());

        let found = EntityExtractor::lexicon_matches("AI, code and the app", 3);
        assert_eq!(
            found.get(TECH_TERM).unwrap(),
            &vec!["ai".to_string(), "code".to_string(), "app".to_string()]
        );
    }

    #[tokio::test]
    async fn test_short_text_is_ignored() {
        let (extractor, _) = extractor(StaticClassifier::new("person:Someone"));
        assert!(extractor.extract(" ai ", None).await.is_empty());
    }

    #[tokio::test]
    async fn test_slow_path_needs_indicator_and_length() {
        let (extractor, classifier) = extractor(StaticClassifier::new("person:Maria Clara|place:Manila, Cebu"));

        let no_indicator = "we spent the whole afternoon walking around the old part of town";
        assert!(extractor.extract(no_indicator, None).await.is_empty());
        assert_eq!(classifier.calls(), 0);

        let with_indicator = "do you remember the name of that girl we met at the museum last week";
        let entities = extractor.extract(with_indicator, Some("Speaker A: hi")).await;
        assert_eq!(classifier.calls(), 1);
        assert_eq!(entities.get("person").unwrap(), &vec!["Maria Clara".to_string()]);
        assert_eq!(
            entities.get("place").unwrap(),
            &vec!["Manila".to_string(), "Cebu".to_string()]
        );
    }

    #[tokio::test]
    async fn test_slow_path_failure_yields_empty() {
        let (extractor, classifier) = extractor(StaticClassifier::failing());
        let text = "what was the character called in that show we watched on friday night";
        assert!(extractor.extract(text, None).await.is_empty());
        assert_eq!(classifier.calls(), 1);
    }

    #[test]
    fn test_parse_response_edge_cases() {
        let (extractor, _) = extractor(StaticClassifier::failing());
        assert!(extractor.parse_response("none").is_empty());
        assert!(extractor.parse_response("garbage without separators").is_empty());

        let parsed = extractor.parse_response("person: A, B, C, D | bad category!:x | product:\"Switch\"");
        assert_eq!(parsed.get("person").unwrap().len(), 3);
        assert_eq!(parsed.get("product").unwrap(), &vec!["Switch".to_string()]);
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_track_increments() {
        let (extractor, _) = extractor(StaticClassifier::failing());
        extractor.track("s1", ANIME_CHARACTER, "Tanjiro", "Tanjiro is strong");
        let second = extractor.track("s1", ANIME_CHARACTER, "Tanjiro", "again").unwrap();
        assert_eq!(second.mention_count, 2);
        assert_eq!(second.context_snippet, "Tanjiro is strong\nagain");
    }
}
