//! Translation instruction assembly: base instruction, domain guidelines,
//! entity and glossary blocks, conversation context.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::memory_db::schema::{EntityMap, Glossary};
use crate::utils::TextUtils;

const MAX_ENTITIES_PER_TYPE: usize = 5;
const MAX_GLOSSARY_ENTRIES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationMode {
    #[default]
    Casual,
    Formal,
}

impl FromStr for TranslationMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "casual" | "" => Ok(TranslationMode::Casual),
            "formal" => Ok(TranslationMode::Formal),
            other => Err(anyhow::anyhow!("Unknown translation mode '{}'", other)),
        }
    }
}

impl fmt::Display for TranslationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationMode::Casual => write!(f, "casual"),
            TranslationMode::Formal => write!(f, "formal"),
        }
    }
}

const DOMAIN_TEMPLATES: &[(&str, &str)] = &[
    (
        "anime",
        "You are translating anime-related content. Key guidelines:\n\
         - Preserve Japanese honorifics (-san, -chan, -kun, -sama, -sensei)\n\
         - Keep common anime terms such as nakama, senpai and kawaii untranslated\n\
         - Keep character names in their original form\n\
         - Keep attack and technique names romanized\n\
         - Carry over the emotional intensity of the dialogue",
    ),
    (
        "technology",
        "You are translating technical content. Key guidelines:\n\
         - Keep programming terms, APIs and acronyms unchanged\n\
         - Reproduce code snippets and command syntax exactly\n\
         - Use the established technical terminology of the target language\n\
         - Prefer precision over fluency",
    ),
    (
        "business",
        "You are translating business communication. Key guidelines:\n\
         - Use professional language\n\
         - Keep titles, company names and brand references intact\n\
         - Be exact with financial and legal terms\n\
         - Follow the business etiquette of the target culture",
    ),
    (
        "gaming",
        "You are translating gaming content. Key guidelines:\n\
         - Keep game titles and character names unchanged\n\
         - Keep gaming slang where players of the target language use it\n\
         - Keep platform names such as PC and console brands\n\
         - Carry over the energy of the conversation",
    ),
    (
        "casual",
        "You are translating casual conversation. Key guidelines:\n\
         - Keep the informal, friendly tone\n\
         - Render idioms and slang with natural equivalents\n\
         - Keep humor and emotional context\n\
         - Adapt cultural references when needed",
    ),
    (
        "academic",
        "You are translating academic content. Key guidelines:\n\
         - Use precise, scholarly language\n\
         - Keep citations and references exact\n\
         - Keep field-specific terminology\n\
         - Favor conceptual accuracy over literal translation",
    ),
    (
        "general",
        "You are translating general conversation. Key guidelines:\n\
         - Keep a natural conversational tone\n\
         - Keep the speaker's intent and emotion\n\
         - Keep proper names unchanged\n\
         - Render idioms with culturally appropriate equivalents",
    ),
];

/// Topic substrings that select a domain template, checked in order.
const DOMAIN_MARKERS: &[(&str, &[&str])] = &[
    ("anime", &["anime", "manga", "character", "episode"]),
    ("technology", &["code", "tech", "programming", "app", "software"]),
    ("gaming", &["game", "gaming", "play"]),
    ("business", &["business", "meeting", "work", "job"]),
    ("academic", &["school", "study", "class", "student"]),
    ("casual", &["greet", "hello", "kamusta", "morning", "evening"]),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct DomainPromptEnhancer;

impl DomainPromptEnhancer {
    pub fn new() -> Self {
        Self
    }

    /// Template for a domain name; unknown domains get `general`.
    pub fn domain_template(domain: &str) -> &'static str {
        DOMAIN_TEMPLATES
            .iter()
            .find(|(name, _)| *name == domain)
            .or_else(|| DOMAIN_TEMPLATES.iter().find(|(name, _)| *name == "general"))
            .map_or("", |(_, template)| template)
    }

    /// Maps a free-form topic label to a domain template name.
    pub fn domain_for_topic(topic: &str) -> &'static str {
        let topic = topic.to_lowercase();
        DOMAIN_MARKERS
            .iter()
            .find(|(_, markers)| markers.iter().any(|m| topic.contains(m)))
            .map_or("general", |(domain, _)| domain)
    }

    /// Topic header plus the matched domain guidelines, if any.
    pub fn domain_prompt(&self, topic: &str) -> String {
        let mut prompt = format!(
            "CONTEXT: The current conversation topic is '{}'. Adjust tone and vocabulary accordingly.",
            topic
        );
        let domain = Self::domain_for_topic(topic);
        if domain != "general" {
            prompt.push_str("\n\n");
            prompt.push_str(Self::domain_template(domain));
        }
        prompt
    }

    /// Appends entity and glossary blocks. Pure; keeps input insertion order.
    pub fn enhance(&self, base_prompt: &str, entities: &EntityMap, glossary: Option<&Glossary>) -> String {
        let mut prompt = base_prompt.to_string();

        let groups: Vec<(&str, &Vec<String>)> = entities.iter().filter(|(_, names)| !names.is_empty()).collect();
        if !groups.is_empty() {
            prompt.push_str("\n\nImportant entities in this conversation:");
            for (entity_type, names) in groups {
                let shown: Vec<&str> = names.iter().take(MAX_ENTITIES_PER_TYPE).map(String::as_str).collect();
                prompt.push_str(&format!("\n- {}: {}", TextUtils::title_case(entity_type), shown.join(", ")));
            }
        }

        if let Some(glossary) = glossary.filter(|g| !g.is_empty()) {
            prompt.push_str("\n\nUser-specific translation preferences:");
            for (original, preferred) in glossary.iter().take(MAX_GLOSSARY_ENTRIES) {
                prompt.push_str(&format!("\n- \"{}\" should be translated as \"{}\"", original, preferred));
            }
        }

        prompt
    }

    /// Instruction used when no conversation context is available.
    pub fn base_instruction(&self, source_lang: &str, target_lang: &str, mode: TranslationMode) -> String {
        let mut instruction = String::from("You are a direct translator. ");
        if source_lang != "auto" {
            instruction.push_str(&format!("Translate from {} ", source_lang));
        }
        instruction.push_str(&format!("to {}. ", target_lang));
        if mode == TranslationMode::Formal {
            instruction.push_str(
                "Use formal language appropriate for academic or professional contexts. \
                 Rephrase profanity or inappropriate language respectfully instead of \
                 leaving placeholders. ",
            );
        }
        instruction.push_str(
            "Output ONLY the translation itself - no explanations, no language detection notes, no additional text. ",
        );
        if mode == TranslationMode::Casual {
            instruction.push_str("Preserve any slang or explicit words from the original text.");
        }
        instruction.trim_end().to_string()
    }

    /// Full instruction for a contextual translation. `context_text` is the
    /// (possibly summarized) conversation; `domain_prompt` may be empty.
    pub fn context_instruction(
        &self,
        base_instruction: &str,
        domain_prompt: &str,
        context_text: &str,
        source_lang: &str,
        target_lang: &str,
    ) -> String {
        let instruction = if domain_prompt.is_empty() {
            base_instruction.to_string()
        } else {
            format!("{}\n\n{}", base_instruction, domain_prompt)
        };

        if context_text.trim().is_empty() {
            return instruction;
        }

        format!(
            "You are translating a conversation between speakers. \
             Use the context to resolve references and keep terminology consistent.\n\n\
             CONVERSATION CONTEXT:\n{}\n\n\
             {}\n\n\
             Translate the following text from {} to {}:",
            context_text, instruction, source_lang, target_lang
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhance_renders_blocks_in_insertion_order() {
        let mut entities = EntityMap::new();
        entities.insert("anime_character", vec!["Tanjiro".to_string(), "Akaza".to_string()]);
        entities.insert("tech_term", Vec::new());
        entities.insert("anime_title", vec!["Demon Slayer".to_string()]);
        let mut glossary = Glossary::new();
        glossary.insert("nakama", "kasama".to_string());

        let prompt = DomainPromptEnhancer::new().enhance("BASE", &entities, Some(&glossary));
        assert_eq!(
            prompt,
            "BASE\n\nImportant entities in this conversation:\n\
             - Anime_Character: Tanjiro, Akaza\n\
             - Anime_Title: Demon Slayer\n\n\
             User-specific translation preferences:\n\
             - \"nakama\" should be translated as \"kasama\""
        );
    }

    #[test]
    fn test_enhance_caps_blocks() {
        let mut entities = EntityMap::new();
        entities.insert("person", (0..8).map(|i| format!("p{}", i)).collect());
        let glossary: Glossary = (0..15).map(|i| (format!("k{}", i), format!("v{}", i))).collect();

        let prompt = DomainPromptEnhancer::new().enhance("", &entities, Some(&glossary));
        assert!(prompt.contains("- Person: p0, p1, p2, p3, p4\n"));
        assert!(prompt.contains("\"k9\""));
        assert!(!prompt.contains("\"k10\""));
    }

    #[test]
    fn test_enhance_without_extras_is_identity() {
        let prompt = DomainPromptEnhancer::new().enhance("BASE", &EntityMap::new(), Some(&Glossary::new()));
        assert_eq!(prompt, "BASE");
    }

    #[test]
    fn test_domain_mapping() {
        assert_eq!(DomainPromptEnhancer::domain_for_topic("Discussing Anime Characters"), "anime");
        assert_eq!(DomainPromptEnhancer::domain_for_topic("Debugging Python Code"), "technology");
        assert_eq!(DomainPromptEnhancer::domain_for_topic("Weekend Plans"), "general");
        assert!(DomainPromptEnhancer::domain_template("unknown").starts_with("You are translating general"));
    }

    #[test]
    fn test_domain_prompt() {
        let enhancer = DomainPromptEnhancer::new();
        assert_eq!(
            enhancer.domain_prompt("Weekend Plans"),
            "CONTEXT: The current conversation topic is 'Weekend Plans'. Adjust tone and vocabulary accordingly."
        );
        assert!(enhancer.domain_prompt("anime").contains("honorifics"));
    }

    #[test]
    fn test_base_instruction() {
        let enhancer = DomainPromptEnhancer::new();
        let casual = enhancer.base_instruction("auto", "Tagalog", TranslationMode::Casual);
        assert!(casual.starts_with("You are a direct translator. to Tagalog. Output ONLY"));
        assert!(casual.ends_with("Preserve any slang or explicit words from the original text."));

        let formal = enhancer.base_instruction("English", "Tagalog", TranslationMode::Formal);
        assert!(formal.starts_with("You are a direct translator. Translate from English to Tagalog. Use formal"));
        assert!(!formal.contains("slang"));
    }

    #[test]
    fn test_context_instruction() {
        let enhancer = DomainPromptEnhancer::new();
        assert_eq!(enhancer.context_instruction("BASE", "", "  ", "en", "tl"), "BASE");

        let full = enhancer.context_instruction("BASE", "DOMAIN", "Speaker A: hi", "en", "tl");
        assert!(full.contains("CONVERSATION CONTEXT:\nSpeaker A: hi\n\nBASE\n\nDOMAIN\n\n"));
        assert!(full.ends_with("Translate the following text from en to tl:"));
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("Formal".parse::<TranslationMode>().unwrap(), TranslationMode::Formal);
        assert_eq!("".parse::<TranslationMode>().unwrap(), TranslationMode::Casual);
        assert!("pirate".parse::<TranslationMode>().is_err());
        assert_eq!(TranslationMode::Formal.to_string(), "formal");
    }
}
