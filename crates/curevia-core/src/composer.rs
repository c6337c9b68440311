//! Response composer
//!
//! Normalizes model output before it is returned or cached: a sentence
//! budget and at most one call-to-action line.

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::Links;
use crate::intent::{CtaKind, Intent};
use crate::language::Language;

lazy_static! {
    static ref LINK_OR_CTA: Regex = Regex::new(
        r"(?i)https?://|www\.|👉|boka (en )?demo|book (a )?demo|booke (en )?demo|registrera|registrer|register"
    )
    .unwrap();
}

pub const DEFAULT_MAX_SENTENCES: usize = 3;

/// Keep at most `max` sentences. A boundary is `.`, `!` or `?` followed by
/// whitespace.
pub fn trim_sentences(text: &str, max: usize) -> String {
    let text = text.trim();
    if max == 0 {
        return String::new();
    }

    let mut count = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, ch)) = chars.next() {
        if matches!(ch, '.' | '!' | '?') {
            if let Some((_, next)) = chars.peek() {
                if next.is_whitespace() {
                    count += 1;
                    if count == max {
                        return text[..i + ch.len_utf8()].to_string();
                    }
                }
            }
        }
    }
    text.to_string()
}

/// Whether the text already carries a link or a call to action
pub fn has_link_or_cta(text: &str) -> bool {
    LINK_OR_CTA.is_match(text)
}

#[derive(Debug, Clone)]
pub struct Composer {
    links: Links,
    max_sentences: usize,
}

impl Composer {
    pub fn new(links: Links) -> Self {
        Self {
            links,
            max_sentences: DEFAULT_MAX_SENTENCES,
        }
    }

    pub fn with_max_sentences(mut self, max: usize) -> Self {
        self.max_sentences = max;
        self
    }

    /// Closing line for an intent flavor
    pub fn cta_line(&self, kind: CtaKind, lang: Language) -> String {
        let l = &self.links;
        match (kind, lang) {
            (CtaKind::Provider, Language::Sv) => format!("👉 Boka en demo: {}", l.demo),
            (CtaKind::Provider, Language::En) => format!("👉 Book a demo: {}", l.demo),
            (CtaKind::Provider, Language::No) => format!("👉 Book en demo: {}", l.demo),
            (CtaKind::Provider, Language::Da) => format!("👉 Book en demo: {}", l.demo),
            (CtaKind::Consultant, Language::Sv) => {
                format!("👉 Skapa din konsultprofil: {}", l.register_consultant)
            }
            (CtaKind::Consultant, Language::En) => {
                format!("👉 Create your consultant profile: {}", l.register_consultant)
            }
            (CtaKind::Consultant, Language::No) => {
                format!("👉 Opprett konsulentprofilen din: {}", l.register_consultant)
            }
            (CtaKind::Consultant, Language::Da) => {
                format!("👉 Opret din konsulentprofil: {}", l.register_consultant)
            }
            (CtaKind::Generic, Language::Sv) => format!("👉 Vill du veta mer? Boka en demo: {}", l.demo),
            (CtaKind::Generic, Language::En) => format!("👉 Want to know more? Book a demo: {}", l.demo),
            (CtaKind::Generic, Language::No) => format!("👉 Vil du vite mer? Book en demo: {}", l.demo),
            (CtaKind::Generic, Language::Da) => format!("👉 Vil du vide mere? Book en demo: {}", l.demo),
        }
    }

    /// Trim to the sentence budget and append a CTA when the intent's policy
    /// asks for one and the text has none.
    pub fn compose(&self, text: &str, intent: Intent, utterance: &str, lang: Language) -> String {
        let mut out = trim_sentences(text, self.max_sentences);
        if intent.wants_cta(utterance) && !has_link_or_cta(&out) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&self.cta_line(intent.cta_kind(), lang));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentence_budget() {
        let text = "One. Two! Three? Four. Five.";
        assert_eq!(trim_sentences(text, 3), "One. Two! Three?");
        assert_eq!(trim_sentences("Short answer.", 3), "Short answer.");
        assert_eq!(trim_sentences("  Version 2.5 is out. Yes.  ", 1), "Version 2.5 is out.");
    }

    #[test]
    fn test_cta_added_for_demo_intent() {
        let composer = Composer::new(Links::default());
        let out = composer.compose("Vi visar gärna plattformen.", Intent::BookDemo, "demo", Language::Sv);
        assert!(out.ends_with(&Links::default().demo));
        assert_eq!(out.lines().count(), 2);
    }

    #[test]
    fn test_no_cta_when_link_present() {
        let composer = Composer::new(Links::default());
        let text = "Registrera dig här: https://example.com.";
        let out = composer.compose(text, Intent::RegisterConsultant, "registrera", Language::Sv);
        assert_eq!(out, text);
    }

    #[test]
    fn test_topic_needs_buying_signal() {
        let composer = Composer::new(Links::default());
        let plain = composer.compose(
            "Integrationen är enkel.",
            Intent::ProviderTopic,
            "Hur fungerar integrationen?",
            Language::Sv,
        );
        assert_eq!(plain, "Integrationen är enkel.");

        let with_cta = composer.compose(
            "Det är gratis att testa.",
            Intent::ProviderTopic,
            "Vad är priset för kliniker?",
            Language::Sv,
        );
        assert!(with_cta.contains("👉"));
    }

    #[test]
    fn test_general_never_gets_cta() {
        let composer = Composer::new(Links::default());
        let out = composer.compose("Hej! Hur kan jag hjälpa dig?", Intent::General, "Vad kostar det?", Language::Sv);
        assert!(!out.contains("👉"));
    }
}
