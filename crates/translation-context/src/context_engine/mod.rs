//! Context engine module - conversation analysis and the translation orchestrator

pub mod complexity;
pub mod entity_extractor;
pub mod feedback;
pub mod orchestrator;
pub mod prompt_enhancer;
pub mod semantic_clusterer;
pub mod summarizer;
pub mod topic_analyzer;
pub mod user_profiles;
pub mod window_manager;

pub use complexity::ComplexityAssessor;
pub use entity_extractor::{EntityExtractor, EntityExtractorConfig};
pub use feedback::{FeedbackInput, FeedbackProcessor};
pub use orchestrator::{
    ContextMetadata, ContextOrchestrator, ContextRequest, EnhancedContext, MessageTranslation,
    MessageTranslationRequest, OrchestratorConfig, TranslationRequest,
};
pub use prompt_enhancer::{DomainPromptEnhancer, TranslationMode};
pub use semantic_clusterer::{ClusterSegment, SemanticClusterer};
pub use summarizer::{ContextSummarizer, SummarizerConfig};
pub use topic_analyzer::{TopicAnalysis, TopicAnalyzer, TopicAnalyzerConfig, TopicStrategy};
pub use user_profiles::{UserPreferences, UserProfileManager};
pub use window_manager::{ContextWindowManager, WindowConfig};

use std::sync::Arc;

use crate::clients::ClientRegistry;
use crate::config::Config;
use crate::memory::MessageStore;
use crate::memory_db::MemoryDatabase;
use crate::stores::EngineStores;

/// Orchestrator wired from configuration. The database handle, if any, is
/// returned so the host can report stats.
pub fn create_orchestrator(
    config: &Config,
    messages: Arc<dyn MessageStore>,
) -> anyhow::Result<(ContextOrchestrator, Option<Arc<MemoryDatabase>>)> {
    let (stores, database) = EngineStores::from_backend(config.store_backend, &config.database_path)?;
    let orchestrator = ContextOrchestrator::new(
        ClientRegistry::from_config(config),
        messages,
        stores,
        config.orchestrator_config(),
    );
    Ok((orchestrator, database))
}

/// Offline orchestrator over in-memory stores
pub fn create_offline_orchestrator(messages: Arc<dyn MessageStore>) -> ContextOrchestrator {
    ContextOrchestrator::new(
        ClientRegistry::offline(),
        messages,
        EngineStores::in_memory(),
        OrchestratorConfig::default(),
    )
}
