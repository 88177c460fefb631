//! Composes the analysis components into one context retrieval per
//! translation request, and drives the memory-first translation path.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache_management::{MemoryRequest, TranslationMemory, TranslationMemoryConfig};
use crate::clients::ClientRegistry;
use crate::context_engine::complexity::NEUTRAL_COMPLEXITY;
use crate::context_engine::entity_extractor::{EntityExtractor, EntityExtractorConfig};
use crate::context_engine::feedback::{FeedbackInput, FeedbackProcessor};
use crate::context_engine::prompt_enhancer::{DomainPromptEnhancer, TranslationMode};
use crate::context_engine::semantic_clusterer::{ClusterSegment, SemanticClusterer};
use crate::context_engine::summarizer::{ContextSummarizer, PROMPT_SUMMARY_CHARS};
use crate::context_engine::topic_analyzer::{
    TopicAnalysis, TopicAnalyzer, TopicAnalyzerConfig, TopicStrategy, GENERAL_TOPIC,
};
use crate::context_engine::user_profiles::{UserPreferences, UserProfileManager};
use crate::context_engine::window_manager::ContextWindowManager;
use crate::error::{EngineError, EngineResult};
use crate::memory::{Message, MessageStore};
use crate::memory_db::schema::{EntityMap, FeedbackRecord, MemoryStats, MessageCluster};
use crate::stores::EngineStores;
use crate::utils::TextUtils;

pub const TRANSLATION_SLOT: &str = "translation1";

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub enhanced_context: bool,
    pub analysis_timeout: Duration,
    pub translate_timeout: Duration,
    /// Upper bound on concurrently running analysis tasks per engine.
    pub max_analysis_workers: usize,
    pub entity_snippet_max_chars: usize,
    /// Messages with fewer words are translated without context.
    pub min_words_for_context: usize,
    pub max_window: usize,
    pub clustering_tail: usize,
    pub complexity_tail: usize,
    pub topic_recent_messages: usize,
    /// Characters of a message stored as entity context.
    pub entity_context_chars: usize,
    /// Context lines beyond this count are summarized in the instruction.
    pub summarize_above: usize,
    pub topic_strategy: TopicStrategy,
    pub memory: TranslationMemoryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enhanced_context: true,
            analysis_timeout: Duration::from_secs(10),
            translate_timeout: Duration::from_secs(60),
            max_analysis_workers: 4,
            entity_snippet_max_chars: 1000,
            min_words_for_context: 5,
            max_window: 50,
            clustering_tail: 50,
            complexity_tail: 20,
            topic_recent_messages: 5,
            entity_context_chars: 100,
            summarize_above: 30,
            topic_strategy: TopicStrategy::Model,
            memory: TranslationMemoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContextRequest {
    pub session_id: String,
    /// The message being translated; excluded from its own context.
    pub message_id: String,
    /// Window used when enhancements are disabled.
    pub max_messages: usize,
    pub current_user_id: Option<String>,
    pub recipient_id: Option<String>,
    /// Epoch milliseconds; earlier messages belong to a previous session.
    pub session_start_time: Option<i64>,
}

impl ContextRequest {
    pub fn new(session_id: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            message_id: message_id.into(),
            max_messages: 25,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub topic: String,
    pub topic_confidence: f32,
    pub keywords: Vec<String>,
    pub entities: EntityMap,
    pub clusters: Vec<ClusterSegment>,
    pub complexity: f32,
    pub window_size: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnhancedContext {
    /// `Speaker A: ...` / `Speaker B: ...`, oldest first.
    pub lines: Vec<String>,
    /// Absent when enhancements are disabled or there is no history.
    pub metadata: Option<ContextMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub context: Vec<String>,
    pub model: String,
    pub mode: TranslationMode,
    pub metadata: Option<ContextMetadata>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageTranslationRequest {
    pub session_id: String,
    pub message_id: String,
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
    pub model: String,
    pub mode: TranslationMode,
    pub current_user_id: String,
    pub recipient_id: Option<String>,
    pub session_start_time: Option<i64>,
    pub max_messages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTranslation {
    pub translation: String,
    pub context_used: bool,
    pub metadata: Option<ContextMetadata>,
}

struct PendingMention {
    entity_type: String,
    name: String,
    snippet: String,
}

struct AnalysisWrites {
    session_id: String,
    user_id: Option<String>,
    topic: TopicAnalysis,
    mentions: Vec<PendingMention>,
    clusters: Option<Vec<MessageCluster>>,
}

pub struct ContextOrchestrator {
    clients: ClientRegistry,
    messages: Arc<dyn MessageStore>,
    stores: EngineStores,
    topics: Arc<TopicAnalyzer>,
    window: ContextWindowManager,
    clusterer: SemanticClusterer,
    entities: Arc<EntityExtractor>,
    memory: Arc<TranslationMemory>,
    profiles: Arc<UserProfileManager>,
    feedback: FeedbackProcessor,
    enhancer: DomainPromptEnhancer,
    summarizer: ContextSummarizer,
    workers: Arc<Semaphore>,
    config: OrchestratorConfig,
}

fn require(value: &str, field: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::invalid(format!("{} is required", field)));
    }
    Ok(())
}

impl ContextOrchestrator {
    pub fn new(
        clients: ClientRegistry,
        messages: Arc<dyn MessageStore>,
        stores: EngineStores,
        config: OrchestratorConfig,
    ) -> Self {
        let topics = Arc::new(TopicAnalyzer::new(
            config.topic_strategy.build(clients.classifier()),
            stores.topics.clone(),
            TopicAnalyzerConfig {
                recent_messages: config.topic_recent_messages,
                ..TopicAnalyzerConfig::default()
            },
        ));
        let entities = Arc::new(EntityExtractor::new(
            clients.classifier(),
            stores.entities.clone(),
            EntityExtractorConfig {
                max_snippet_chars: config.entity_snippet_max_chars,
                ..EntityExtractorConfig::default()
            },
        ));
        let memory = Arc::new(TranslationMemory::new(stores.memory.clone(), config.memory.clone()));
        let profiles = Arc::new(UserProfileManager::new(stores.profiles.clone()));
        let feedback = FeedbackProcessor::new(stores.feedback.clone(), profiles.clone());
        let workers = Arc::new(Semaphore::new(config.max_analysis_workers.clamp(1, 4)));

        info!(
            "Context orchestrator ready (topic strategy: {}, enhancements: {})",
            topics.strategy_name(),
            config.enhanced_context
        );

        Self {
            clients,
            messages,
            stores,
            topics,
            window: ContextWindowManager::default(),
            clusterer: SemanticClusterer::new(),
            entities,
            memory,
            profiles,
            feedback,
            enhancer: DomainPromptEnhancer::new(),
            summarizer: ContextSummarizer::default(),
            workers,
            config,
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn memory(&self) -> &TranslationMemory {
        &self.memory
    }

    pub fn profiles(&self) -> &UserProfileManager {
        &self.profiles
    }

    pub fn stores(&self) -> &EngineStores {
        &self.stores
    }

    /// Runs an analysis task on the bounded pool with the analysis timeout.
    /// `None` on timeout; the task is never cancelled from outside.
    fn spawn_analysis<T, F>(&self, task: &'static str, fut: F) -> JoinHandle<Option<T>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let workers = Arc::clone(&self.workers);
        let timeout = self.config.analysis_timeout;
        tokio::spawn(async move {
            let _permit = workers.acquire_owned().await.ok()?;
            match tokio::time::timeout(timeout, fut).await {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("{} analysis timed out after {:?}", task, timeout);
                    None
                }
            }
        })
    }

    async fn join_analysis<T>(task: &'static str, handle: JoinHandle<Option<T>>) -> Option<T> {
        let result = match handle.await {
            Ok(value) => value,
            Err(e) => {
                warn!("{} analysis task failed: {}", task, e);
                None
            }
        };
        if result.is_none() {
            crate::metrics::inc_analysis_fallback(task);
        }
        result
    }

    /// Prior messages of the session as speaker-labelled lines, plus topic,
    /// entity, clustering and window metadata when enhancements are on.
    /// Message store failures degrade to an empty context.
    pub async fn get_enhanced_context(&self, request: &ContextRequest) -> EngineResult<EnhancedContext> {
        require(&request.session_id, "session_id")?;
        require(&request.message_id, "message_id")?;

        let mut history: Vec<Message> = match self
            .messages
            .get_messages(&request.session_id, request.session_start_time)
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!("Could not fetch messages for {}: {}", request.session_id, e);
                return Ok(EnhancedContext::default());
            }
        };
        history.retain(|m| {
            m.id != request.message_id && request.session_start_time.map_or(true, |start| m.timestamp >= start)
        });
        // stable, so equal timestamps keep store order
        history.sort_by_key(|m| m.timestamp);

        if history.is_empty() {
            return Ok(EnhancedContext::default());
        }

        let (window_size, metadata) = if self.config.enhanced_context {
            let metadata = self.analyze(&request.session_id, request.current_user_id.as_deref(), &history).await;
            (metadata.window_size, Some(metadata))
        } else {
            (request.max_messages, None)
        };

        let selected = &history[history.len().saturating_sub(window_size)..];
        let lines = Self::format_speakers(
            selected,
            request.current_user_id.as_deref(),
            request.recipient_id.as_deref(),
        );
        debug!("Returning {} context lines for {}", lines.len(), request.session_id);

        Ok(EnhancedContext { lines, metadata })
    }

    async fn analyze(&self, session_id: &str, user_id: Option<&str>, history: &[Message]) -> ContextMetadata {
        let texts: Vec<String> = history.iter().map(|m| m.text.clone()).collect();
        let tail = |n: usize| texts[texts.len().saturating_sub(n)..].to_vec();

        let topic_task = {
            let topics = Arc::clone(&self.topics);
            let recent = tail(self.config.topic_recent_messages);
            self.spawn_analysis("topic", async move { topics.classify_topic(&recent).await })
        };
        let complexity_task = {
            let window = self.window.clone();
            let text = tail(self.config.complexity_tail).join(" ");
            self.spawn_analysis("complexity", async move { window.assess_complexity(&text) })
        };
        let cluster_task = {
            let clusterer = self.clusterer;
            let recent = tail(self.config.clustering_tail);
            self.spawn_analysis("clustering", async move { clusterer.cluster(&recent) })
        };

        let topic = Self::join_analysis("topic", topic_task)
            .await
            .unwrap_or_else(TopicAnalysis::fallback);
        let complexity = Self::join_analysis("complexity", complexity_task)
            .await
            .unwrap_or(NEUTRAL_COMPLEXITY);
        let clusters = Self::join_analysis("clustering", cluster_task).await;

        let continuity = match &clusters {
            Some(segments) => SemanticClusterer::has_continuity(segments),
            None => !topic.is_general(),
        };
        let recent_texts = tail(self.config.clustering_tail);
        let window_size = self
            .window
            .optimal_window_size(&recent_texts, continuity, complexity)
            .min(self.config.max_window);
        debug!(
            "Topic {} ({:.2}), complexity {:.2}, continuity {}, window {}",
            topic.label, topic.confidence, complexity, continuity, window_size
        );

        // needs the final window, so runs after the parallel phase
        let windowed = &history[history.len().saturating_sub(window_size)..];
        let (entities, mentions) = self.extract_window_entities(windowed).await;

        let persisted = clusters.as_ref().map(|segments| {
            let clustered = &history[history.len().saturating_sub(self.config.clustering_tail)..];
            self.clusterer.to_clusters(session_id, clustered, segments)
        });
        self.persist_analysis(AnalysisWrites {
            session_id: session_id.to_string(),
            user_id: user_id.filter(|u| !u.is_empty()).map(str::to_string),
            topic: topic.clone(),
            mentions,
            clusters: persisted,
        })
        .await;

        ContextMetadata {
            topic: topic.label,
            topic_confidence: topic.confidence,
            keywords: topic.keywords,
            entities,
            clusters: clusters.unwrap_or_default(),
            complexity,
            window_size,
        }
    }

    /// Entities over the window, plus the mentions to track in message order.
    async fn extract_window_entities(&self, messages: &[Message]) -> (EntityMap, Vec<PendingMention>) {
        let mut all = EntityMap::new();
        let mut mentions = Vec::new();
        for message in messages {
            let found = self.entities.extract(&message.text, None).await;
            if found.is_empty() {
                continue;
            }
            let normalized = TextUtils::normalize_whitespace(&message.text);
            let snippet = TextUtils::truncate_chars(&normalized, self.config.entity_context_chars);
            for (entity_type, names) in found {
                for name in names {
                    mentions.push(PendingMention {
                        entity_type: entity_type.clone(),
                        name: name.clone(),
                        snippet: snippet.to_string(),
                    });
                    let slot = all.get_or_insert_with(&entity_type, Vec::new);
                    if !slot.contains(&name) {
                        slot.push(name);
                    }
                }
            }
        }
        (all, mentions)
    }

    /// Runs on the blocking pool; the writes are visible once this returns.
    async fn persist_analysis(&self, writes: AnalysisWrites) {
        let topics = Arc::clone(&self.topics);
        let entities = Arc::clone(&self.entities);
        let clusters = Arc::clone(&self.stores.clusters);
        let profiles = Arc::clone(&self.profiles);

        let task = tokio::task::spawn_blocking(move || {
            let session_id = writes.session_id.as_str();
            for mention in &writes.mentions {
                entities.track(session_id, &mention.entity_type, &mention.name, &mention.snippet);
            }
            topics.record(session_id, &writes.topic);
            if let Some(persisted) = &writes.clusters {
                if let Err(e) = clusters.replace_clusters(session_id, persisted) {
                    warn!("Failed to save clusters for {}: {}", session_id, e);
                    crate::metrics::inc_store_failure("clusters");
                }
            }
            if let Some(user_id) = &writes.user_id {
                profiles.update_domain_interest(user_id, &writes.topic.label, 1.0);
            }
        });
        if let Err(e) = task.await {
            warn!("Context analysis writes failed: {}", e);
        }
    }

    fn format_speakers(messages: &[Message], current_user: Option<&str>, recipient: Option<&str>) -> Vec<String> {
        let mut lines = Vec::with_capacity(messages.len());
        for message in messages {
            let speaker = if Some(message.sender_id.as_str()) == current_user {
                "Speaker A"
            } else if Some(message.sender_id.as_str()) == recipient {
                "Speaker B"
            } else if lines.len() % 2 == 0 {
                "Speaker A"
            } else {
                "Speaker B"
            };
            lines.push(format!("{}: {}", speaker, message.text));
        }
        lines
    }

    async fn translate_once(&self, text: &str, instruction: &str, model: &str) -> EngineResult<String> {
        let translator = self.clients.translator();
        match tokio::time::timeout(self.config.translate_timeout, translator.translate(text, instruction, model)).await
        {
            Ok(Ok(raw)) => {
                let cleaned = TextUtils::clean_translation_response(&raw, text);
                if cleaned.is_empty() {
                    Err(EngineError::TranslatorUnavailable("empty translation".to_string()))
                } else {
                    Ok(cleaned)
                }
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::Timeout(format!(
                "translation exceeded {:?}",
                self.config.translate_timeout
            ))),
        }
    }

    /// Memory first, then a contextual translation, then a plain one. Fails
    /// only when the plain translation fails too.
    pub async fn translate_with_context(&self, request: &TranslationRequest) -> EngineResult<String> {
        require(&request.text, "text")?;
        require(&request.target_lang, "target_lang")?;

        let text = TextUtils::strip_quotes(&request.text).to_string();
        let source_lang = if request.source_lang.trim().is_empty() {
            "auto"
        } else {
            request.source_lang.as_str()
        };
        if source_lang != "auto" && source_lang.eq_ignore_ascii_case(&request.target_lang) {
            crate::metrics::inc_translation("passthrough");
            return Ok(text);
        }

        let topic = request.metadata.as_ref().map(|m| m.topic.clone());
        let (cached, preferences) = tokio::join!(
            self.lookup_memory(request.metadata.is_some(), &text, source_lang, request, topic.clone()),
            self.lookup_preferences(request.user_id.clone(), topic.clone()),
        );
        if let Some(cached) = cached {
            crate::metrics::inc_translation("memory");
            return Ok(cached);
        }

        let base = self.enhancer.base_instruction(source_lang, &request.target_lang, request.mode);
        let glossary = UserProfileManager::glossary_for_pair(&preferences.glossary, source_lang, &request.target_lang);
        let domain_prompt = match &request.metadata {
            Some(metadata) => self.enhancer.enhance(
                &self.enhancer.domain_prompt(&metadata.topic),
                &metadata.entities,
                Some(&glossary),
            ),
            None => self.enhancer.enhance("", &EntityMap::new(), Some(&glossary)).trim().to_string(),
        };

        let context_text = if request.context.len() > self.config.summarize_above {
            self.summarizer.summarize(
                &request.context,
                topic.as_deref().unwrap_or(GENERAL_TOPIC),
                PROMPT_SUMMARY_CHARS,
            )
        } else {
            request.context.join("\n")
        };
        let instruction = self.enhancer.context_instruction(
            &base,
            &domain_prompt,
            &context_text,
            source_lang,
            &request.target_lang,
        );

        match self.translate_once(&text, &instruction, &request.model).await {
            Ok(translated) => {
                let memory = Arc::clone(&self.memory);
                let profiles = Arc::clone(&self.profiles);
                let entities: Option<Vec<String>> = request
                    .metadata
                    .as_ref()
                    .map(|m| m.entities.iter().flat_map(|(_, names)| names.clone()).collect());
                let user_id = request.user_id.clone().filter(|u| !u.is_empty());
                let (source_text, source_lang, target_lang, context, stored) = (
                    text.clone(),
                    source_lang.to_string(),
                    request.target_lang.clone(),
                    request.context.clone(),
                    translated.clone(),
                );
                let writes = tokio::task::spawn_blocking(move || {
                    if let Some(entities) = entities {
                        memory.store(
                            &MemoryRequest {
                                source_text: &source_text,
                                source_lang: &source_lang,
                                target_lang: &target_lang,
                                context: &context,
                                topic: topic.as_deref(),
                            },
                            &stored,
                            &entities,
                        );
                    }
                    if let Some(user_id) = user_id {
                        profiles.record_language_pair(&user_id, &source_lang, &target_lang);
                    }
                });
                if let Err(e) = writes.await {
                    warn!("Translation bookkeeping failed: {}", e);
                }
                crate::metrics::inc_translation("context");
                Ok(translated)
            }
            Err(e) => {
                warn!("Contextual translation failed, retrying without context: {}", e);
                match self.translate_once(&text, &base, &request.model).await {
                    Ok(translated) => {
                        crate::metrics::inc_translation("basic");
                        Ok(translated)
                    }
                    Err(e) => {
                        crate::metrics::inc_translation("failed");
                        Err(e)
                    }
                }
            }
        }
    }

    async fn lookup_memory(
        &self,
        enabled: bool,
        text: &str,
        source_lang: &str,
        request: &TranslationRequest,
        topic: Option<String>,
    ) -> Option<String> {
        if !enabled {
            return None;
        }
        let memory = Arc::clone(&self.memory);
        let (text, source_lang, target_lang, context) = (
            text.to_string(),
            source_lang.to_string(),
            request.target_lang.clone(),
            request.context.clone(),
        );
        let lookup = tokio::task::spawn_blocking(move || {
            memory.retrieve(&MemoryRequest {
                source_text: &text,
                source_lang: &source_lang,
                target_lang: &target_lang,
                context: &context,
                topic: topic.as_deref(),
            })
        });
        lookup.await.unwrap_or_else(|e| {
            warn!("Translation memory lookup task failed: {}", e);
            None
        })
    }

    async fn lookup_preferences(&self, user_id: Option<String>, topic: Option<String>) -> UserPreferences {
        let Some(user_id) = user_id.filter(|u| !u.is_empty()) else {
            return UserPreferences::default();
        };
        let profiles = Arc::clone(&self.profiles);
        let lookup =
            tokio::task::spawn_blocking(move || profiles.get_user_preferences(&user_id, topic.as_deref()));
        lookup.await.unwrap_or_else(|e| {
            warn!("Preference lookup task failed: {}", e);
            UserPreferences::default()
        })
    }

    /// Records a correction. Missing fields are a client error; persistence
    /// problems yield `Ok(None)`.
    pub fn record_feedback(&self, input: FeedbackInput) -> EngineResult<Option<FeedbackRecord>> {
        require(&input.user_id, "user_id")?;
        require(&input.original_text, "original_text")?;
        require(&input.corrected_translation, "corrected_translation")?;
        require(&input.source_lang, "source_lang")?;
        require(&input.target_lang, "target_lang")?;
        Ok(self.feedback.record(input))
    }

    pub fn user_corrections(&self, user_id: &str, limit: usize) -> Vec<FeedbackRecord> {
        self.feedback.get_user_corrections(user_id, limit)
    }

    pub fn memory_stats(&self) -> anyhow::Result<MemoryStats> {
        self.memory.stats()
    }

    /// Full pipeline for a stored chat message: context, translation and the
    /// write-back into the message's first translation slot.
    pub async fn translate_message(&self, request: &MessageTranslationRequest) -> EngineResult<MessageTranslation> {
        require(&request.session_id, "session_id")?;
        require(&request.message_id, "message_id")?;
        require(&request.text, "text")?;
        require(&request.target_lang, "target_lang")?;
        require(&request.current_user_id, "current_user_id")?;

        let context = if TextUtils::count_words(&request.text) >= self.config.min_words_for_context {
            self.get_enhanced_context(&ContextRequest {
                session_id: request.session_id.clone(),
                message_id: request.message_id.clone(),
                max_messages: request.max_messages,
                current_user_id: Some(request.current_user_id.clone()),
                recipient_id: request.recipient_id.clone(),
                session_start_time: request.session_start_time,
            })
            .await?
        } else {
            debug!("Message {} too short for context", request.message_id);
            EnhancedContext::default()
        };

        let translation = self
            .translate_with_context(&TranslationRequest {
                text: request.text.clone(),
                source_lang: request.source_lang.clone(),
                target_lang: request.target_lang.clone(),
                context: context.lines.clone(),
                model: request.model.clone(),
                mode: request.mode,
                metadata: context.metadata.clone(),
                user_id: Some(request.current_user_id.clone()),
            })
            .await?;

        let mut slots = HashMap::new();
        slots.insert(TRANSLATION_SLOT.to_string(), translation.clone());
        let metadata = serde_json::json!({
            "source_lang": request.source_lang,
            "target_lang": request.target_lang,
            "mode": request.mode,
            "topic": context.metadata.as_ref().map(|m| m.topic.as_str()),
        });
        if let Err(e) = self
            .messages
            .write_translation(&request.session_id, &request.message_id, slots, metadata)
            .await
        {
            warn!("Failed to write translation for {}: {}", request.message_id, e);
        }

        Ok(MessageTranslation {
            translation,
            context_used: !context.lines.is_empty(),
            metadata: context.metadata,
        })
    }

    pub async fn close(&self) {
        self.clients.close().await;
    }
}
