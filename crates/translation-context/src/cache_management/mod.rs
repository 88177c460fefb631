// src/cache_management/mod.rs

//! Context-addressed translation memory

pub mod cache_config;
pub mod translation_memory;

pub use cache_config::TranslationMemoryConfig;
pub use translation_memory::{fingerprint, MemoryRequest, TranslationMemory};
