//! Topic classification over the most recent messages of a session.
//!
//! The label itself comes from a swappable [`TopicClassifier`] strategy; the
//! analyzer adds the recency window, caching, keyword extraction and the
//! `general` fallback.

use async_trait::async_trait;
use lazy_static::lazy_static;
use moka::sync::Cache;
use regex::Regex;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clients::Classifier;
use crate::memory_db::schema::TopicRecord;
use crate::stores::TopicStore;
use crate::utils::TextUtils;

pub const GENERAL_TOPIC: &str = "general";
pub const FALLBACK_CONFIDENCE: f32 = 0.5;

const MAX_LABEL_WORDS: usize = 5;

/// Result of one topic classification.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TopicAnalysis {
    pub label: String,
    pub confidence: f32,
    pub keywords: Vec<String>,
}

impl TopicAnalysis {
    pub fn fallback() -> Self {
        Self {
            label: GENERAL_TOPIC.to_string(),
            confidence: FALLBACK_CONFIDENCE,
            keywords: Vec::new(),
        }
    }

    pub fn is_general(&self) -> bool {
        self.label == GENERAL_TOPIC
    }
}

/// A topic labelling strategy. `None` means "no usable answer" and makes the
/// analyzer fall back to `general`.
#[async_trait]
pub trait TopicClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Option<(String, f32)>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicStrategy {
    /// Free-form labels from the black-box classifier.
    Model,
    /// Offline weighted vocabulary scoring.
    Weighted,
}

impl FromStr for TopicStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "model" | "ai" => Ok(TopicStrategy::Model),
            "weighted" | "keyword" | "keywords" => Ok(TopicStrategy::Weighted),
            other => Err(anyhow::anyhow!("Unknown TOPIC_STRATEGY '{}'", other)),
        }
    }
}

impl TopicStrategy {
    pub fn build(self, classifier: Arc<dyn Classifier>) -> Arc<dyn TopicClassifier> {
        match self {
            TopicStrategy::Model => Arc::new(ModelTopicClassifier::new(classifier)),
            TopicStrategy::Weighted => Arc::new(WeightedKeywordClassifier::new()),
        }
    }
}

// ---------------------------------------------------------------------------
// Model strategy
// ---------------------------------------------------------------------------

pub struct ModelTopicClassifier {
    classifier: Arc<dyn Classifier>,
}

impl ModelTopicClassifier {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { classifier }
    }

    fn build_prompt(text: &str) -> String {
        format!(
            "Name the current main topic or intent of this conversation in 2 to 5 words.\n\
             Do not pick from a fixed list; describe it naturally, for example \
             Casual Greeting, Making Weekend Plans, Discussing Anime Characters, Debugging Python Code.\n\n\
             RECENT CONVERSATION:\n{}\n\n\
             Respond with ONLY: topic,confidence\n\
             Example: Casual Greeting,0.95",
            text
        )
    }

    /// Parses `label,confidence` from the first non-empty line. The split is
    /// on the last comma so labels may contain commas.
    pub fn parse_response(response: &str) -> Option<(String, f32)> {
        let line = response.lines().map(str::trim).find(|l| !l.is_empty())?;
        let (label, confidence) = line.rsplit_once(',')?;

        let confidence: f32 = confidence.trim().parse().ok()?;
        if !confidence.is_finite() {
            return None;
        }

        let label = TextUtils::strip_quotes(label.trim().trim_start_matches('-'));
        let label: Vec<&str> = label.split_whitespace().take(MAX_LABEL_WORDS).collect();
        if label.is_empty() {
            return None;
        }

        Some((label.join(" "), confidence.clamp(0.0, 1.0)))
    }
}

#[async_trait]
impl TopicClassifier for ModelTopicClassifier {
    async fn classify(&self, text: &str) -> Option<(String, f32)> {
        match self.classifier.classify(&Self::build_prompt(text)).await {
            Ok(response) => {
                let parsed = Self::parse_response(&response);
                if parsed.is_none() {
                    warn!("Malformed topic response: {:?}", response);
                }
                parsed
            }
            Err(e) => {
                warn!("Topic classification failed: {}", e);
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        "model"
    }
}

// ---------------------------------------------------------------------------
// Weighted vocabulary strategy
// ---------------------------------------------------------------------------

struct TopicVocabulary {
    topic: &'static str,
    primary: &'static [&'static str],
    secondary: &'static [&'static str],
    context: &'static [&'static str],
    entities: &'static [&'static str],
}

const VOCABULARIES: &[TopicVocabulary] = &[
    TopicVocabulary {
        topic: "anime",
        primary: &["anime", "manga", "otaku", "demon slayer", "hashira"],
        secondary: &["episode", "season", "character", "arc", "shonen", "seinen", "kawaii", "fight", "epic"],
        context: &["watch", "read", "favorite", "recommend", "tanaw", "makakita"],
        entities: &["naruto", "goku", "luffy", "ichigo", "eren", "tanjiro", "giyu", "akaza", "shinobu", "rengoku"],
    },
    TopicVocabulary {
        topic: "technology",
        primary: &["code", "programming", "software", "api"],
        secondary: &["app", "database", "server", "algorithm", "debug", "deploy"],
        context: &["develop", "build", "fix", "implement"],
        entities: &["python", "javascript", "react", "nodejs", "github"],
    },
    TopicVocabulary {
        topic: "gaming",
        primary: &["game", "gaming", "gamer"],
        secondary: &["play", "level", "quest", "boss", "multiplayer", "console", "fps", "rpg"],
        context: &["stream", "speedrun", "competitive"],
        entities: &["minecraft", "fortnite", "valorant", "dota"],
    },
    TopicVocabulary {
        topic: "sports",
        primary: &["sport", "sports", "match"],
        secondary: &["team", "player", "score", "goal", "championship", "league", "tournament", "coach"],
        context: &["training", "practice"],
        entities: &["football", "basketball", "tennis", "baseball"],
    },
    TopicVocabulary {
        topic: "food",
        primary: &["food", "eat", "cooking", "recipe"],
        secondary: &["cook", "restaurant", "dish", "meal", "taste", "flavor", "ingredient", "cuisine"],
        context: &["hungry", "delicious", "spicy", "sweet"],
        entities: &["pizza", "sushi", "burger", "pasta", "ramen"],
    },
    TopicVocabulary {
        topic: "travel",
        primary: &["travel", "trip", "vacation"],
        secondary: &["visit", "flight", "hotel", "tourist", "destination", "journey", "explore"],
        context: &["passport", "luggage", "sightseeing"],
        entities: &["japan", "paris", "tokyo", "london"],
    },
    TopicVocabulary {
        topic: "business",
        primary: &["business", "work", "job"],
        secondary: &["meeting", "client", "report", "presentation", "budget", "strategy", "revenue", "profit"],
        context: &["office", "company", "corporate"],
        entities: &["microsoft", "google", "amazon"],
    },
    TopicVocabulary {
        topic: "education",
        primary: &["education", "school", "university", "college", "capstone", "project"],
        secondary: &["study", "learn", "class", "teacher", "student", "exam", "homework", "course", "deadline", "submit"],
        context: &["grade", "assignment", "lecture", "scores"],
        entities: &["harvard", "mit", "stanford", "oxford"],
    },
    TopicVocabulary {
        topic: "finance",
        primary: &["money", "borrow", "loan", "finance", "broke"],
        secondary: &["payment", "cash", "bank", "cost", "price", "expensive", "cheap"],
        context: &["pay", "spend", "save", "afford"],
        entities: &["paypal", "visa", "mastercard", "gcash"],
    },
    TopicVocabulary {
        topic: "health",
        primary: &["health", "medical", "doctor"],
        secondary: &["medicine", "hospital", "symptom", "treatment", "exercise", "diet", "therapy"],
        context: &["sick", "pain", "healthy", "fitness"],
        entities: &["covid", "flu", "diabetes"],
    },
    TopicVocabulary {
        topic: "music",
        primary: &["music", "song", "artist", "band"],
        secondary: &["album", "concert", "melody", "lyrics", "genre", "playlist"],
        context: &["listen", "sing", "dance", "beat"],
        entities: &["spotify", "youtube", "beatles"],
    },
];

/// Words rewritten before scoring so informal variants hit the vocabulary.
const SYNONYMS: &[(&str, &str)] = &[
    ("cartoon", "anime"),
    ("comic", "manga"),
    ("chapter", "episode"),
    ("coding", "programming"),
    ("bug", "debug"),
    ("pvp", "multiplayer"),
    ("mmo", "multiplayer"),
    ("soccer", "football"),
    ("yummy", "delicious"),
    ("holiday", "vacation"),
    ("biz", "business"),
    ("uni", "university"),
    ("kwarta", "money"),
    ("utang", "borrow"),
    ("meds", "medicine"),
    ("track", "song"),
];

lazy_static! {
    static ref CONTEXT_PATTERNS: Vec<(&'static str, Vec<Regex>)> = vec![
        (
            "anime",
            vec![
                Regex::new(r"(?i)what.*anime.*watch").unwrap(),
                Regex::new(r"(?i)favorite.*character").unwrap(),
                Regex::new(r"(?i)episode.*\d+").unwrap(),
                Regex::new(r"(?i)season.*\d+").unwrap(),
            ],
        ),
        (
            "technology",
            vec![
                Regex::new(r"(?i)how.*code").unwrap(),
                Regex::new(r"(?i)error.*\w+").unwrap(),
                Regex::new(r"(?i)function.*\w+").unwrap(),
                Regex::new(r"(?i)install.*\w+").unwrap(),
            ],
        ),
        (
            "gaming",
            vec![
                Regex::new(r"(?i)play.*game").unwrap(),
                Regex::new(r"(?i)level.*\d+").unwrap(),
                Regex::new(r"(?i)beat.*boss").unwrap(),
                Regex::new(r"(?i)rank.*\w+").unwrap(),
            ],
        ),
    ];
}

const PRIMARY_WEIGHT: f32 = 3.0;
const SECONDARY_WEIGHT: f32 = 2.0;
const CONTEXT_WEIGHT: f32 = 1.0;
const ENTITY_BONUS: f32 = 2.0;
const PATTERN_WEIGHT: f32 = 2.0;
const HYBRID_RATIO: f32 = 0.7;
const HYBRID_PENALTY: f32 = 0.9;

#[derive(Debug, Clone, Default)]
struct TopicScore {
    score: f32,
    tiers: usize,
    pattern_hit: bool,
}

/// Offline strategy: weighted vocabulary hits plus regex context patterns.
#[derive(Debug, Clone, Default)]
pub struct WeightedKeywordClassifier;

impl WeightedKeywordClassifier {
    pub fn new() -> Self {
        Self
    }

    fn apply_synonyms(text: &str) -> String {
        text.split_whitespace()
            .map(|word| {
                SYNONYMS
                    .iter()
                    .find(|(from, _)| *from == word)
                    .map_or(word, |(_, to)| to)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn count_term(text: &str, term: &str) -> usize {
        let mut count = 0;
        let mut from = 0;
        while let Some(pos) = TextUtils::find_word(&text[from..], term) {
            count += 1;
            from += pos + term.len();
        }
        count
    }

    fn score_topic(vocabulary: &TopicVocabulary, processed: &str, raw: &str) -> TopicScore {
        let mut result = TopicScore::default();

        for (terms, weight) in [
            (vocabulary.primary, PRIMARY_WEIGHT),
            (vocabulary.secondary, SECONDARY_WEIGHT),
            (vocabulary.context, CONTEXT_WEIGHT),
        ] {
            let hits: usize = terms.iter().map(|t| Self::count_term(processed, t)).sum();
            if hits > 0 {
                result.score += hits as f32 * weight;
                result.tiers += 1;
            }
        }

        let entity_hits = vocabulary
            .entities
            .iter()
            .filter(|e| TextUtils::contains_word(processed, e))
            .count();
        if entity_hits > 0 {
            result.score += entity_hits as f32 * ENTITY_BONUS;
            result.tiers += 1;
        }

        if let Some((_, patterns)) = CONTEXT_PATTERNS.iter().find(|(t, _)| *t == vocabulary.topic) {
            let matches: usize = patterns.iter().map(|p| p.find_iter(raw).count()).sum();
            if matches > 0 {
                result.score += matches as f32 * PATTERN_WEIGHT;
                result.tiers += 1;
                result.pattern_hit = true;
            }
        }

        result
    }

    fn confidence(best: &TopicScore, word_count: usize) -> f32 {
        let density = (best.score / (word_count.max(1) as f32 * 0.03)).min(1.0);
        let diversity = best.tiers as f32 * 0.1;
        let pattern = if best.pattern_hit { 0.2 } else { 0.0 };
        (density + diversity + pattern).min(1.0).max(0.1)
    }

    /// Scores every topic; `None` when nothing in the vocabulary matched.
    pub fn score(&self, text: &str) -> Option<(String, f32)> {
        let raw = text.to_lowercase();
        let processed = Self::apply_synonyms(&raw);

        let mut scored: Vec<(&'static str, TopicScore)> = VOCABULARIES
            .iter()
            .map(|v| (v.topic, Self::score_topic(v, &processed, &raw)))
            .collect();
        // stable: ties keep declaration order
        scored.sort_by(|a, b| b.1.score.partial_cmp(&a.1.score).unwrap_or(std::cmp::Ordering::Equal));

        let (best_topic, best) = scored.first()?;
        if best.score <= 0.0 {
            return None;
        }

        let confidence = Self::confidence(best, TextUtils::count_words(&raw));
        match scored.get(1) {
            Some((runner_up, second)) if second.score > best.score * HYBRID_RATIO => Some((
                format!("{}+{}", best_topic, runner_up),
                confidence * HYBRID_PENALTY,
            )),
            _ => Some((best_topic.to_string(), confidence)),
        }
    }
}

#[async_trait]
impl TopicClassifier for WeightedKeywordClassifier {
    async fn classify(&self, text: &str) -> Option<(String, f32)> {
        self.score(text)
    }

    fn name(&self) -> &'static str {
        "weighted"
    }
}

// ---------------------------------------------------------------------------
// Analyzer
// ---------------------------------------------------------------------------

const ANIME_KEYWORDS: &[&str] = &["anime", "character", "episode", "watch", "tanaw", "demon", "slayer", "naruto"];
const SCHOOL_KEYWORDS: &[&str] = &["project", "capstone", "deadline", "submit", "school", "university"];
const MONEY_KEYWORDS: &[&str] = &["money", "borrow", "broke", "utang", "kwarta", "payment"];

#[derive(Debug, Clone)]
pub struct TopicAnalyzerConfig {
    /// How many of the newest messages are analyzed.
    pub recent_messages: usize,
    pub min_text_chars: usize,
    pub max_keywords: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: u64,
}

impl Default for TopicAnalyzerConfig {
    fn default() -> Self {
        Self {
            recent_messages: 5,
            min_text_chars: 10,
            max_keywords: 5,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1000,
        }
    }
}

pub struct TopicAnalyzer {
    strategy: Arc<dyn TopicClassifier>,
    store: Arc<dyn TopicStore>,
    cache: Cache<String, (String, f32)>,
    config: TopicAnalyzerConfig,
}

impl TopicAnalyzer {
    pub fn new(
        strategy: Arc<dyn TopicClassifier>,
        store: Arc<dyn TopicStore>,
        config: TopicAnalyzerConfig,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.cache_capacity)
            .time_to_live(config.cache_ttl)
            .build();
        Self {
            strategy,
            store,
            cache,
            config,
        }
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Classifies the newest messages. Never fails: empty or too-short input
    /// and strategy failures yield `("general", 0.5, [])`.
    pub async fn classify_topic<S: AsRef<str>>(&self, messages: &[S]) -> TopicAnalysis {
        if messages.is_empty() {
            return TopicAnalysis::fallback();
        }

        let start = messages.len().saturating_sub(self.config.recent_messages);
        let text = messages[start..]
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join("\n");
        if text.trim().chars().count() < self.config.min_text_chars {
            return TopicAnalysis::fallback();
        }

        let cache_key = blake3::hash(text.as_bytes()).to_hex().to_string();
        let classified = match self.cache.get(&cache_key) {
            Some(hit) => {
                debug!("Topic cache hit");
                Some(hit)
            }
            None => {
                let result = self.strategy.classify(&text).await;
                if let Some(result) = &result {
                    self.cache.insert(cache_key, result.clone());
                }
                result
            }
        };

        match classified {
            Some((label, confidence)) => {
                let keywords = Self::extract_keywords(&text, &label, self.config.max_keywords);
                debug!("Topic {} ({:.2}) via {}", label, confidence, self.strategy.name());
                TopicAnalysis {
                    label,
                    confidence: confidence.clamp(0.0, 1.0),
                    keywords,
                }
            }
            None => {
                crate::metrics::inc_analysis_fallback("topic");
                TopicAnalysis::fallback()
            }
        }
    }

    /// Presentational keywords for a label. Never influences the label.
    pub fn extract_keywords(text: &str, label: &str, max: usize) -> Vec<String> {
        let label = label.to_lowercase();
        let vocabulary: Option<&[&str]> = if label.contains("anime") {
            Some(ANIME_KEYWORDS)
        } else if label.contains("education") || label.contains("school") {
            Some(SCHOOL_KEYWORDS)
        } else if label.contains("finance") || label.contains("money") {
            Some(MONEY_KEYWORDS)
        } else {
            None
        };

        let mut keywords: Vec<String> = Vec::new();
        let words = text
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase());

        match vocabulary {
            Some(vocabulary) => {
                for word in words {
                    if vocabulary.contains(&word.as_str()) && !keywords.contains(&word) {
                        keywords.push(word);
                    }
                }
            }
            None => {
                for word in words.filter(|w| w.chars().count() > 4) {
                    if keywords.len() == 3 {
                        break;
                    }
                    if !keywords.contains(&word) {
                        keywords.push(word);
                    }
                }
            }
        }

        keywords.truncate(max);
        keywords
    }

    /// Extends or starts the session's topic segment. Failures are logged.
    pub fn record(&self, session_id: &str, analysis: &TopicAnalysis) -> Option<TopicRecord> {
        match self
            .store
            .record_topic(session_id, &analysis.label, analysis.confidence, &analysis.keywords)
        {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Failed to record topic {} for {}: {}", analysis.label, session_id, e);
                crate::metrics::inc_store_failure("topics");
                None
            }
        }
    }
}
