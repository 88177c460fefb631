use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationMemoryConfig {
    /// Entries are served only when their confidence is strictly above this.
    pub confidence_gate: f32,

    /// Confidence added each time the same key is stored again.
    pub reinforce_step: f32,

    /// Number of trailing context lines that make up the fingerprint.
    pub context_tail: usize,

    pub summary_max_chars: usize,

    /// Entities kept with an entry.
    pub max_entities: usize,
}

impl Default for TranslationMemoryConfig {
    fn default() -> Self {
        Self {
            confidence_gate: 0.7,
            reinforce_step: 0.05,
            context_tail: 10,
            summary_max_chars: 200,
            max_entities: 10,
        }
    }
}
