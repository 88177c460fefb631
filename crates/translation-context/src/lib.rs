// translation-context/src/lib.rs

pub mod cache_management;
pub mod clients;
pub mod config;
pub mod context_engine;
pub mod error;
pub mod memory;
pub mod memory_db;
pub mod metrics;
pub mod stores;
pub mod telemetry;
pub mod utils;

// Public API exports
pub use config::{Config, StoreBackend};
pub use error::{EngineError, EngineResult};
pub use memory::{InMemoryMessageStore, Message, MessageStore};
pub use clients::{ClientRegistry, Classifier, Translator};
pub use stores::EngineStores;
pub use cache_management::{TranslationMemory, TranslationMemoryConfig};
pub use context_engine::{
    create_offline_orchestrator, create_orchestrator, ContextMetadata, ContextOrchestrator,
    ContextRequest, EnhancedContext, FeedbackInput, MessageTranslation, MessageTranslationRequest,
    OrchestratorConfig, TopicStrategy, TranslationMode, TranslationRequest,
};
