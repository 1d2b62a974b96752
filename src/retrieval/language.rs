//! Offline language handling: detection, greetings and the fixed phrases
//! the composer answers with.

use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use whatlang::{Detector, Lang};

pub const NOT_FOUND_ANSWER: &str = "I couldn’t find this in the knowledge base.";
pub const GREETING_ANSWER: &str = "Hello! How can I help you today?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    En,
    Fr,
    Ar,
    Es,
    De,
    It,
    Pt,
    Nl,
}

impl Language {
    pub const ALL: [Language; 8] = [
        Language::En,
        Language::Fr,
        Language::Ar,
        Language::Es,
        Language::De,
        Language::It,
        Language::Pt,
        Language::Nl,
    ];

    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Fr => "fr",
            Language::Ar => "ar",
            Language::Es => "es",
            Language::De => "de",
            Language::It => "it",
            Language::Pt => "pt",
            Language::Nl => "nl",
        }
    }

    fn lang(&self) -> Lang {
        match self {
            Language::En => Lang::Eng,
            Language::Fr => Lang::Fra,
            Language::Ar => Lang::Ara,
            Language::Es => Lang::Spa,
            Language::De => Lang::Deu,
            Language::It => Lang::Ita,
            Language::Pt => Lang::Por,
            Language::Nl => Lang::Nld,
        }
    }

    fn from_lang(lang: Lang) -> Option<Language> {
        Language::ALL.into_iter().find(|language| language.lang() == lang)
    }

    fn greetings(&self) -> &'static [&'static str] {
        match self {
            Language::En => &[
                "hello",
                "hi",
                "hey",
                "good morning",
                "good afternoon",
                "good evening",
            ],
            Language::Fr => &["bonjour", "salut", "coucou"],
            Language::Ar => &["مرحبا", "اهلا", "أهلا", "السلام عليكم"],
            Language::Es => &[
                "hola",
                "buenos dias",
                "buenos días",
                "buenas tardes",
                "buenas noches",
            ],
            Language::De => &["hallo", "guten tag", "guten morgen", "guten abend"],
            Language::It => &["ciao", "salve", "buongiorno", "buonasera"],
            Language::Pt => &["olá", "ola", "bom dia", "boa tarde", "boa noite"],
            Language::Nl => &["hoi", "goedemorgen", "goedemiddag", "goedenavond"],
        }
    }

    pub fn greeting_response(&self) -> &'static str {
        match self {
            Language::En => GREETING_ANSWER,
            Language::Fr => "Bonjour ! Comment puis-je vous aider aujourd’hui ?",
            Language::Ar => "مرحبا! كيف يمكنني مساعدتك اليوم؟",
            Language::Es => "¡Hola! ¿En qué puedo ayudarte hoy?",
            Language::De => "Hallo! Wie kann ich Ihnen heute helfen?",
            Language::It => "Ciao! Come posso aiutarti oggi?",
            Language::Pt => "Olá! Como posso ajudar você hoje?",
            Language::Nl => "Hallo! Hoe kan ik je vandaag helpen?",
        }
    }

    pub fn not_found(&self) -> &'static str {
        match self {
            Language::En => NOT_FOUND_ANSWER,
            Language::Fr => "Je n’ai pas trouvé cela dans la base de connaissances.",
            Language::Ar => "لم أتمكن من العثور على هذا في قاعدة المعرفة.",
            Language::Es => "No pude encontrar esto en la base de conocimientos.",
            Language::De => "Ich konnte dies nicht in der Wissensdatenbank finden.",
            Language::It => "Non sono riuscito a trovarlo nella base di conoscenza.",
            Language::Pt => "Não consegui encontrar isso na base de conhecimento.",
            Language::Nl => "Ik kon dit niet vinden in de kennisbank.",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_lowercase())
        .collect()
}

/// Guesses below this confidence are treated as unknown and answered in English.
const MIN_CONFIDENCE: f64 = 0.2;

fn detector() -> &'static Detector {
    static DETECTOR: OnceLock<Detector> = OnceLock::new();
    DETECTOR.get_or_init(|| {
        Detector::with_allowlist(Language::ALL.iter().map(Language::lang).collect())
    })
}

/// Trigram detection restricted to the supported languages. `None` when the
/// text carries no letters or the best guess is too weak to act on.
pub fn detect_language(text: &str) -> Option<Language> {
    if !text.chars().any(char::is_alphabetic) {
        return None;
    }
    let info = detector().detect(text)?;
    if info.confidence() < MIN_CONFIDENCE {
        return None;
    }
    Language::from_lang(info.lang())
}

fn contains_phrase(words: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    !needle.is_empty()
        && words
            .windows(needle.len())
            .any(|window| window.iter().zip(&needle).all(|(a, b)| a == b))
}

fn starts_with_phrase(words: &[String], phrase: &str) -> bool {
    let needle: Vec<&str> = phrase.split_whitespace().collect();
    words.len() >= needle.len() && words.iter().zip(&needle).all(|(a, b)| a == b)
}

/// Language of the greeting `text` is, if it is one.
///
/// A message counts when it is a greeting, starts with one, or contains one
/// in at most four words. Matching is on whole words.
pub fn is_greeting(text: &str) -> Option<Language> {
    let words = words(text);
    if words.is_empty() {
        return None;
    }
    Language::ALL.into_iter().find(|language| {
        language.greetings().iter().any(|greeting| {
            starts_with_phrase(&words, greeting)
                || (words.len() <= 4 && contains_phrase(&words, greeting))
        })
    })
}

pub fn greeting_response(language: Option<Language>) -> &'static str {
    language.unwrap_or(Language::En).greeting_response()
}

pub fn localized_not_found(language: Option<Language>) -> &'static str {
    language.unwrap_or(Language::En).not_found()
}
