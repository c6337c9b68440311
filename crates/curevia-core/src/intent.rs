//! Intent classification
//!
//! A pure function from utterance to [`Intent`]. The pattern tables cover
//! all four supported languages.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::language::{parse_switch_command, Language};

/// What the visitor is after
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    RegisterProvider,
    RegisterConsultant,
    BookDemo,
    Contact,
    SwitchLanguage(Language),
    ProviderTopic,
    ConsultantTopic,
    General,
}

/// Visitor role, recorded as a session slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Provider,
    Consultant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Provider => "provider",
            Role::Consultant => "consultant",
        }
    }

    pub fn from_slot(value: &str) -> Option<Self> {
        match value {
            "provider" => Some(Role::Provider),
            "consultant" => Some(Role::Consultant),
            _ => None,
        }
    }
}

/// Which closing line the composer may append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtaKind {
    Provider,
    Consultant,
    Generic,
}

lazy_static! {
    static ref PROVIDER: Regex = Regex::new(
        r"(?i)vårdgivar|klinik|mottag|region|upphandl|integration|pris|avgift|pilot|provider|clinic|employer|pricing|leverandør|udbyder|helseforetak"
    )
    .unwrap();
    static ref CONSULTANT: Regex = Regex::new(
        r"(?i)konsult|konsulent|consultant|uppdrag|oppdrag|opgave|ersättn|timlön|bemann|legitimation|profil|sjuksköters|sykepleier|sygeplejer|nurse|läkar|\blege\b|læge|doctor|physician"
    )
    .unwrap();
    static ref DEMO: Regex = Regex::new(r"(?i)\bdemo|\bboka\b|\bbook\b|\bbooke\b|möte|meeting|møte|møde").unwrap();
    static ref CONTACT: Regex = Regex::new(
        r"(?i)kontakta (mig|oss)|contact me|get in touch|ring mig|call me|ring meg|kontakt meg|kontakt mig|ringe meg|talk to (a|someone|sales)|prata med (någon|en)|snakke med"
    )
    .unwrap();
    static ref REGISTER: Regex = Regex::new(
        r"(?i)registrera|registrer|register|sign ?up|skapa konto|create an? account|opprett|oprett|ansök|signa"
    )
    .unwrap();
    static ref BUYING_SIGNAL: Regex = Regex::new(
        r"(?i)pris|price|kostar|cost|koster|avgift|\bfee|offert|quote|tilbud|köpa|\bbuy|komma igång|get started|kom i gang|komme i gang|avtal|contract|testa|\btrial|prøve|starta|anlita|hire|ansätt|behöver personal|need staff"
    )
    .unwrap();
}

/// Classify an utterance. Switch commands win, then registration with a
/// known role, then demo and contact requests, then topics.
pub fn classify_intent(text: &str) -> Intent {
    if let Some(lang) = parse_switch_command(text) {
        return Intent::SwitchLanguage(lang);
    }

    let provider = PROVIDER.is_match(text);
    let consultant = CONSULTANT.is_match(text);
    let wants_registration = REGISTER.is_match(text);

    if wants_registration && provider {
        return Intent::RegisterProvider;
    }
    if wants_registration && consultant {
        return Intent::RegisterConsultant;
    }
    if DEMO.is_match(text) {
        return Intent::BookDemo;
    }
    if CONTACT.is_match(text) {
        return Intent::Contact;
    }
    if provider {
        return Intent::ProviderTopic;
    }
    if consultant {
        return Intent::ConsultantTopic;
    }
    Intent::General
}

/// Whether the utterance hints at a purchase decision
pub fn has_buying_signal(text: &str) -> bool {
    BUYING_SIGNAL.is_match(text)
}

impl Intent {
    /// Role revealed by this intent, if any
    pub fn role(&self) -> Option<Role> {
        match self {
            Intent::RegisterProvider | Intent::ProviderTopic => Some(Role::Provider),
            Intent::RegisterConsultant | Intent::ConsultantTopic => Some(Role::Consultant),
            _ => None,
        }
    }

    /// Closing line flavor for this intent
    pub fn cta_kind(&self) -> CtaKind {
        match self {
            Intent::RegisterProvider | Intent::ProviderTopic | Intent::BookDemo => {
                CtaKind::Provider
            }
            Intent::RegisterConsultant | Intent::ConsultantTopic => CtaKind::Consultant,
            _ => CtaKind::Generic,
        }
    }

    /// CTA policy: always for explicit demo or registration intents, on a
    /// buying signal for topic intents, never otherwise.
    pub fn wants_cta(&self, utterance: &str) -> bool {
        match self {
            Intent::BookDemo | Intent::RegisterProvider | Intent::RegisterConsultant => true,
            Intent::ProviderTopic | Intent::ConsultantTopic => has_buying_signal(utterance),
            Intent::Contact | Intent::SwitchLanguage(_) | Intent::General => false,
        }
    }

    /// Short label for logs
    pub fn label(&self) -> &'static str {
        match self {
            Intent::RegisterProvider => "register_provider",
            Intent::RegisterConsultant => "register_consultant",
            Intent::BookDemo => "book_demo",
            Intent::Contact => "contact",
            Intent::SwitchLanguage(_) => "switch_language",
            Intent::ProviderTopic => "provider_topic",
            Intent::ConsultantTopic => "consultant_topic",
            Intent::General => "general",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_needs_role() {
        assert_eq!(
            classify_intent("Jag vill registrera min klinik"),
            Intent::RegisterProvider
        );
        assert_eq!(
            classify_intent("How do I register as a nurse?"),
            Intent::RegisterConsultant
        );
        assert_eq!(
            classify_intent("Hvordan registrerer jeg meg som konsulent?"),
            Intent::RegisterConsultant
        );
    }

    #[test]
    fn test_demo_and_contact() {
        assert_eq!(classify_intent("Kan jag boka en demo?"), Intent::BookDemo);
        assert_eq!(classify_intent("Please call me tomorrow"), Intent::Contact);
    }

    #[test]
    fn test_topics() {
        assert_eq!(classify_intent("Vad kostar det för vårdgivare?"), Intent::ProviderTopic);
        assert_eq!(classify_intent("Hur hittar jag uppdrag?"), Intent::ConsultantTopic);
        assert_eq!(classify_intent("Hej!"), Intent::General);
    }

    #[test]
    fn test_switch_wins() {
        assert_eq!(
            classify_intent("switch to english"),
            Intent::SwitchLanguage(Language::En)
        );
    }

    #[test]
    fn test_cta_policy() {
        assert!(Intent::BookDemo.wants_cta("anything"));
        assert!(Intent::ProviderTopic.wants_cta("Vad är priset?"));
        assert!(!Intent::ProviderTopic.wants_cta("Hur fungerar integrationen?"));
        assert!(!Intent::General.wants_cta("Vad kostar det?"));
        assert_eq!(Intent::ConsultantTopic.cta_kind(), CtaKind::Consultant);
        assert_eq!(Intent::ProviderTopic.role(), Some(Role::Provider));
    }
}
