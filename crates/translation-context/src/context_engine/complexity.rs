//! Structural complexity score of a block of text.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ACRONYM: Regex = Regex::new(r"\b[A-Z]{2,}\b").unwrap();
    static ref NUMBER: Regex = Regex::new(r"\b\d+\b").unwrap();
    static ref SYMBOL: Regex = Regex::new(r"[^a-zA-Z0-9\s]").unwrap();
}

const LONG_WORD_CHARS: usize = 10;
const NORMALIZATION_FACTOR: f32 = 0.2;

/// Returned for text without words so an empty request does not shrink the window.
pub const NEUTRAL_COMPLEXITY: f32 = 0.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityAssessor;

impl ComplexityAssessor {
    pub fn new() -> Self {
        Self
    }

    /// Counts acronyms, long words, numbers, symbols and sentences, normalized
    /// by a fifth of the word count and clamped to `[0, 1]`.
    pub fn assess(&self, text: &str) -> f32 {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return NEUTRAL_COMPLEXITY;
        }

        let acronyms = ACRONYM.find_iter(text).count();
        let long_words = words
            .iter()
            .filter(|w| w.chars().count() > LONG_WORD_CHARS)
            .count();
        let numbers = NUMBER.find_iter(text).count();
        let symbols = SYMBOL.find_iter(text).count();
        let sentences = text.split('.').count();

        let indicators = (acronyms + long_words + numbers + symbols + sentences) as f32;
        (indicators / (words.len() as f32 * NORMALIZATION_FACTOR)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_is_neutral() {
        let assessor = ComplexityAssessor::new();
        assert_eq!(assessor.assess(""), 0.5);
        assert_eq!(assessor.assess("   \n\t"), 0.5);
    }

    #[test]
    fn test_plain_chat_scores_low() {
        let assessor = ComplexityAssessor::new();
        let text = "hey how are you doing today my friend I hope you are well and happy";
        let score = assessor.assess(text);
        // 15 words, only the single implicit sentence counts
        assert!((score - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn test_technical_text_saturates() {
        let assessor = ComplexityAssessor::new();
        let text = "The API returned HTTP 503 after 30s; reconfigure the loadbalancer's healthcheck.";
        assert_eq!(assessor.assess(text), 1.0);
    }

    #[test]
    fn test_score_is_bounded() {
        let assessor = ComplexityAssessor::new();
        for text in ["a", "!!!", "NASA ESA JAXA", "word. word. word. word."] {
            let score = assessor.assess(text);
            assert!((0.0..=1.0).contains(&score), "{} -> {}", text, score);
        }
    }
}
