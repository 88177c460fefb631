//! Text helpers shared by the analysis components

use lazy_static::lazy_static;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashSet;

lazy_static! {
    static ref WHITESPACE_REGEX: Regex = Regex::new(r"\s+").unwrap();
    static ref THINK_TAG_REGEX: Regex = Regex::new(r"(?s)<think>.*?</think>").unwrap();
}

/// Markers of instruction text leaking into a model response.
const LEAK_INDICATORS: &[&str] = &[
    "You are a direct translator",
    "Human:",
    "CONVERSATION CONTEXT:",
    "IMPORTANT TRANSLATION GUIDELINES:",
    "Now translate the following text",
    "Translate the following text from",
    "Output ONLY the translation",
    "Speaker A:",
    "Speaker B:",
];

/// Endings accepted after a word by `contains_word_form`; empty is the bare word.
const INFLECTION_SUFFIXES: &[&str] = &["", "s", "es", "d", "ed", "ing"];

const GUIDELINE_PREFIXES: &[&str] = &["- If", "- Consider", "- Maintain", "- Preserve"];

pub struct TextUtils;

impl TextUtils {
    /// Lowercased whitespace-separated word set.
    pub fn word_set(text: &str) -> HashSet<String> {
        text.split_whitespace().map(|w| w.to_lowercase()).collect()
    }

    /// Jaccard similarity of two word sets; two empty sets score 0.
    pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
        let union = a.union(b).count();
        if union == 0 {
            return 0.0;
        }
        a.intersection(b).count() as f32 / union as f32
    }

    pub fn count_words(text: &str) -> usize {
        text.split_whitespace().count()
    }

    pub fn normalize_whitespace(text: &str) -> Cow<'_, str> {
        if WHITESPACE_REGEX.is_match(text) {
            Cow::Owned(WHITESPACE_REGEX.replace_all(text, " ").trim().to_string())
        } else {
            Cow::Borrowed(text)
        }
    }

    /// Uppercases the first letter of every alphabetic run and lowercases the rest,
    /// so `anime_character` becomes `Anime_Character`.
    pub fn title_case(text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut prev_alpha = false;
        for c in text.chars() {
            if c.is_alphabetic() {
                if prev_alpha {
                    out.extend(c.to_lowercase());
                } else {
                    out.extend(c.to_uppercase());
                }
                prev_alpha = true;
            } else {
                out.push(c);
                prev_alpha = false;
            }
        }
        out
    }

    /// First `max_chars` characters, never splitting a code point.
    pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
        match text.char_indices().nth(max_chars) {
            Some((idx, _)) => &text[..idx],
            None => text,
        }
    }

    /// Last `max_chars` characters, never splitting a code point.
    pub fn keep_tail(text: &str, max_chars: usize) -> &str {
        let total = text.chars().count();
        if total <= max_chars {
            return text;
        }
        match text.char_indices().nth(total - max_chars) {
            Some((idx, _)) => &text[idx..],
            None => "",
        }
    }

    /// Trims whitespace and any surrounding double quotes.
    pub fn strip_quotes(text: &str) -> &str {
        text.trim().trim_matches('"').trim()
    }

    /// Byte offset of the first occurrence of `word` in `haystack` that is not
    /// part of a longer alphanumeric run. Both sides are expected lowercased.
    pub fn find_word(haystack: &str, word: &str) -> Option<usize> {
        if word.is_empty() {
            return None;
        }
        let mut from = 0;
        while let Some(rel) = haystack[from..].find(word) {
            let start = from + rel;
            let end = start + word.len();
            let before_ok = haystack[..start]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric());
            let after_ok = haystack[end..]
                .chars()
                .next()
                .map_or(true, |c| !c.is_alphanumeric());
            if before_ok && after_ok {
                return Some(start);
            }
            from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
        }
        None
    }

    pub fn contains_word(haystack: &str, word: &str) -> bool {
        Self::find_word(haystack, word).is_some()
    }

    /// Whether `word` appears as a whole word or with a plain inflection
    /// (`episodes`, `functions`, `coded`). Both sides are expected lowercased.
    pub fn contains_word_form(haystack: &str, word: &str) -> bool {
        if word.is_empty() {
            return false;
        }
        haystack.match_indices(word).any(|(start, _)| {
            let starts_word = haystack[..start]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric());
            let rest = &haystack[start + word.len()..];
            let suffix_len = rest.find(|c: char| !c.is_alphanumeric()).unwrap_or(rest.len());
            starts_word && INFLECTION_SUFFIXES.contains(&&rest[..suffix_len])
        })
    }

    pub fn strip_think_tags(text: &str) -> String {
        THINK_TAG_REGEX
            .replace_all(text, "")
            .replace("<think>", "")
            .replace("</think>", "")
            .trim()
            .to_string()
    }

    /// Removes instruction fragments a model echoed back around its translation.
    pub fn clean_translation_response(response: &str, original: &str) -> String {
        let cleaned = Self::strip_think_tags(response);
        let leaked = LEAK_INDICATORS.iter().any(|marker| cleaned.contains(marker));

        let mut result = if leaked {
            let kept: Vec<&str> = cleaned
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .filter(|line| !LEAK_INDICATORS.iter().any(|marker| line.contains(marker)))
                .filter(|line| !GUIDELINE_PREFIXES.iter().any(|prefix| line.starts_with(prefix)))
                .collect();
            if kept.is_empty() {
                cleaned.clone()
            } else {
                kept.join("\n")
            }
        } else {
            cleaned.clone()
        };

        let original_len = original.trim().chars().count();
        if original_len > 0 && result.chars().count() > original_len * 5 {
            if let Some(shortest) = result
                .lines()
                .map(str::trim)
                .filter(|line| line.chars().count() > 1)
                .min_by_key(|line| line.chars().count())
            {
                result = shortest.to_string();
            }
        }

        Self::strip_quotes(&result).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_case_matches_word_runs() {
        assert_eq!(TextUtils::title_case("tanjiro"), "Tanjiro");
        assert_eq!(TextUtils::title_case("demon slayer"), "Demon Slayer");
        assert_eq!(TextUtils::title_case("anime_character"), "Anime_Character");
        assert_eq!(TextUtils::title_case("ATTACK on titan"), "Attack On Titan");
    }

    #[test]
    fn test_jaccard() {
        let a = TextUtils::word_set("the cat sat");
        let b = TextUtils::word_set("The cat ran");
        assert!((TextUtils::jaccard(&a, &b) - 0.5).abs() < 1e-6);
        assert_eq!(TextUtils::jaccard(&HashSet::new(), &HashSet::new()), 0.0);
    }

    #[test]
    fn test_truncate_and_tail_respect_char_boundaries() {
        assert_eq!(TextUtils::truncate_chars("héllo", 2), "hé");
        assert_eq!(TextUtils::truncate_chars("abc", 10), "abc");
        assert_eq!(TextUtils::keep_tail("héllo wörld", 5), "wörld");
        assert_eq!(TextUtils::keep_tail("abc", 5), "abc");
    }

    #[test]
    fn test_find_word_requires_boundaries() {
        assert_eq!(TextUtils::find_word("i love naruto!", "naruto"), Some(7));
        assert!(TextUtils::find_word("maintain the app", "ai").is_none());
        assert!(TextUtils::contains_word("ai is everywhere", "ai"));
        assert!(TextUtils::contains_word("see: api, code", "api"));
    }

    #[test]
    fn test_word_form_accepts_inflections() {
        assert!(TextUtils::contains_word_form("the new episodes were great", "episode"));
        assert!(TextUtils::contains_word_form("(functions) return errors", "function"));
        assert!(TextUtils::contains_word_form("code", "code"));
        assert!(!TextUtils::contains_word_form("the capital city", "api"));
        assert!(!TextUtils::contains_word_form("the whole anime", "who"));
        assert!(!TextUtils::contains_word_form("however it ends", "how"));
        assert!(!TextUtils::contains_word_form("anything", ""));
    }

    #[test]
    fn test_strip_quotes() {
        assert_eq!(TextUtils::strip_quotes("  \"hola\" "), "hola");
        assert_eq!(TextUtils::strip_quotes("plain"), "plain");
    }

    #[test]
    fn test_clean_translation_response_removes_leaked_prompt() {
        let response = "CONVERSATION CONTEXT:\nSpeaker A: hi\n- Maintain the tone\n\"Kumusta ka?\"";
        assert_eq!(
            TextUtils::clean_translation_response(response, "How are you?"),
            "Kumusta ka?"
        );
    }

    #[test]
    fn test_clean_translation_response_strips_think_tags() {
        let response = "<think>the user wants tagalog</think>Salamat";
        assert_eq!(TextUtils::clean_translation_response(response, "Thanks"), "Salamat");
    }

    #[test]
    fn test_clean_translation_response_picks_shortest_line_when_verbose() {
        let response = "Here is the translation you asked for, with some notes\nOi\nNote: informal register was kept";
        assert_eq!(TextUtils::clean_translation_response(response, "Hi"), "Oi");
    }
}
