//! Language resolution
//!
//! Supported languages, loose hints from headers or query strings, heuristic
//! detection from the utterance itself, and explicit switch commands
//! ("switch to English", "byt språk till svenska", "/lang da").

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Languages the assistant answers in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Swedish (default)
    #[default]
    Sv,
    /// English
    En,
    /// Norwegian
    No,
    /// Danish
    Da,
}

impl Language {
    /// Every supported language, default first
    pub const ALL: [Language; 4] = [Language::Sv, Language::En, Language::No, Language::Da];

    /// Two-letter code used in storage and on the wire
    pub fn code(&self) -> &'static str {
        match self {
            Language::Sv => "sv",
            Language::En => "en",
            Language::No => "no",
            Language::Da => "da",
        }
    }

    /// Parse an exact code (`sv`, `en`, `no`/`nb`/`nn`, `da`)
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "sv" => Some(Language::Sv),
            "en" => Some(Language::En),
            "no" | "nb" | "nn" => Some(Language::No),
            "da" => Some(Language::Da),
            _ => None,
        }
    }

    /// English name, used when instructing the completion provider
    pub fn english_name(&self) -> &'static str {
        match self {
            Language::Sv => "Swedish",
            Language::En => "English",
            Language::No => "Norwegian",
            Language::Da => "Danish",
        }
    }

    /// Name of the language in the language itself
    pub fn native_name(&self) -> &'static str {
        match self {
            Language::Sv => "svenska",
            Language::En => "English",
            Language::No => "norsk",
            Language::Da => "dansk",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::from_code(s).ok_or_else(|| format!("unsupported language: {s}"))
    }
}

lazy_static! {
    static ref SLASH_LANG: Regex = Regex::new(r"(?i)^\s*/lang\s+([a-z]{2})\s*$").unwrap();
    static ref BARE_NAME: Regex = Regex::new(
        r"(?i)^\s*(?:(?:in|på|pa)\s+)?(english|engelska|engelsk|svenska|swedish|svensk|norsk|norwegian|norska|dansk|danish|danska)\s*(?:please|tack|takk|tak)?\s*[.!]?\s*$"
    )
    .unwrap();
    static ref SWITCH_VERB: Regex = Regex::new(
        r"(?i)\b(switch|change|speak|byt|byta|ändra|prata|bytt|bytte|endre|snakk|snakke|skift|skifte|tal|tale)\b"
    )
    .unwrap();
    static ref LANGUAGE_NAME: Regex = Regex::new(
        r"(?i)\b(english|engelska|engelsk|svenska|swedish|svensk|norsk|norwegian|norska|dansk|danish|danska)\b"
    )
    .unwrap();
    static ref WORD: Regex = Regex::new(r"\p{L}+").unwrap();
}

const SWITCH_COMMAND_MAX_CHARS: usize = 80;

fn language_from_name(name: &str) -> Option<Language> {
    match name.to_lowercase().as_str() {
        "english" | "engelska" | "engelsk" => Some(Language::En),
        "svenska" | "swedish" | "svensk" => Some(Language::Sv),
        "norsk" | "norwegian" | "norska" => Some(Language::No),
        "dansk" | "danish" | "danska" => Some(Language::Da),
        _ => None,
    }
}

/// Recognize an explicit language-switch command.
///
/// Only short utterances qualify; a long question that happens to mention a
/// language name is not a command.
pub fn parse_switch_command(text: &str) -> Option<Language> {
    let text = text.trim();
    if text.is_empty() || text.chars().count() > SWITCH_COMMAND_MAX_CHARS {
        return None;
    }

    if let Some(caps) = SLASH_LANG.captures(text) {
        return Language::from_code(&caps[1]);
    }

    if let Some(caps) = BARE_NAME.captures(text) {
        return language_from_name(&caps[1]);
    }

    if SWITCH_VERB.is_match(text) {
        if let Some(m) = LANGUAGE_NAME.find(text) {
            return language_from_name(m.as_str());
        }
    }

    None
}

/// Parse a loose language hint such as an `Accept-Language` header,
/// a `?lang=` query value or a cookie.
///
/// Comma-separated candidates are tried in order; the first recognized one
/// wins.
pub fn parse_hint(hint: &str) -> Option<Language> {
    for candidate in hint.split(',') {
        let tag = candidate
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if tag.is_empty() {
            continue;
        }

        let primary = tag.split(['-', '_']).next().unwrap_or_default();
        if let Some(lang) = Language::from_code(primary) {
            return Some(lang);
        }

        let found = match primary {
            "se" | "swedish" | "svenska" => Some(Language::Sv),
            "english" | "gb" | "us" | "uk" => Some(Language::En),
            "norsk" | "norwegian" | "bokmål" | "bokmal" | "nynorsk" => Some(Language::No),
            "danish" | "dansk" | "dk" => Some(Language::Da),
            _ => None,
        };
        if found.is_some() {
            return found;
        }
    }
    None
}

const SV_MARKERS: &[&str] = &[
    "hur", "vad", "jag", "inte", "kostar", "uppdrag", "lön", "när", "och", "är", "mig", "får",
    "vårdgivare", "betalt",
];
const EN_MARKERS: &[&str] = &[
    "what", "how", "the", "is", "do", "does", "cost", "can", "my", "you", "price", "when", "paid",
    "work", "get",
];
const NO_MARKERS: &[&str] = &[
    "hva", "oppdrag", "lønn", "meg", "ikke", "hvordan", "koster", "jeg", "betalt", "når",
];
const DA_MARKERS: &[&str] = &[
    "hvad", "opgave", "opgaver", "løn", "mig", "ikke", "hvordan", "koster", "jeg", "hvornår",
    "udbetalt", "gerne",
];

/// Guess the language of an utterance from marker words.
///
/// Returns `None` when nothing matches or when two languages tie, so that the
/// caller can fall back to the default.
pub fn detect_language(text: &str) -> Option<Language> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = WORD.find_iter(&lowered).map(|m| m.as_str()).collect();
    if words.is_empty() {
        return None;
    }

    let score = |markers: &[&str]| words.iter().filter(|w| markers.contains(w)).count();
    let mut scores = [
        (Language::Sv, score(SV_MARKERS)),
        (Language::En, score(EN_MARKERS)),
        (Language::No, score(NO_MARKERS)),
        (Language::Da, score(DA_MARKERS)),
    ];

    // Letters only one side of the Øresund uses
    if lowered.contains(['ä', 'ö']) {
        scores[0].1 += 2;
    }
    if lowered.contains(['æ', 'ø']) {
        scores[2].1 += 1;
        scores[3].1 += 1;
    }

    scores.sort_by(|a, b| b.1.cmp(&a.1));
    let (best, best_score) = scores[0];
    if best_score == 0 || scores[1].1 == best_score {
        return None;
    }
    Some(best)
}

/// Per-turn inputs for language resolution
#[derive(Debug, Clone, Copy, Default)]
pub struct LanguageSignals<'a> {
    /// Language stored in the session, if any
    pub session: Option<Language>,
    /// Request hint (query parameter, header or cookie)
    pub hint: Option<&'a str>,
    /// The utterance
    pub utterance: &'a str,
}

/// How the language of a turn was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageDecision {
    /// Explicit in-text command; must be persisted and short-circuits the turn
    Switched(Language),
    /// Resolved from the remaining signals
    Resolved(Language),
}

impl LanguageDecision {
    /// The language that applies to this turn
    pub fn language(&self) -> Language {
        match self {
            LanguageDecision::Switched(lang) | LanguageDecision::Resolved(lang) => *lang,
        }
    }
}

/// Apply the precedence: switch command > session > hint > detection > default
pub fn resolve_language(signals: LanguageSignals<'_>) -> LanguageDecision {
    if let Some(lang) = parse_switch_command(signals.utterance) {
        return LanguageDecision::Switched(lang);
    }

    let lang = signals
        .session
        .or_else(|| signals.hint.and_then(parse_hint))
        .or_else(|| detect_language(signals.utterance))
        .unwrap_or_default();
    LanguageDecision::Resolved(lang)
}
