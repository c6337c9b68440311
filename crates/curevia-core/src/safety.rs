//! Safety filter
//!
//! Rejects utterances carrying personal identity numbers or clinical record
//! content before any other stage sees them, and redacts personal
//! identifiers from anything that is written to the query log.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PERSONAL_NUMBER: Regex = Regex::new(r"\b(\d{6}|\d{8})[-+]?\d{4}\b").unwrap();
    static ref CLINICAL: Regex = Regex::new(r"(?i)journal|anamnes|diagnos|patient").unwrap();
    static ref EMAIL: Regex = Regex::new(r"[\w.+-]+@[\w-]+(?:\.[\w-]+)+").unwrap();
    static ref PHONE: Regex = Regex::new(r"(?:\+\d{1,3}[\s-]?|\b0)\d[\d\s-]{5,14}\d\b").unwrap();
}

/// Why an utterance was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensitiveKind {
    /// Something shaped like a Swedish personal identity number
    PersonalNumber,
    /// Keywords indicating clinical or medical-record content
    ClinicalContent,
}

impl std::fmt::Display for SensitiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SensitiveKind::PersonalNumber => write!(f, "personal_number"),
            SensitiveKind::ClinicalContent => write!(f, "clinical_content"),
        }
    }
}

/// Classify an utterance; `None` means it may proceed
pub fn classify(text: &str) -> Option<SensitiveKind> {
    if PERSONAL_NUMBER.is_match(text) {
        Some(SensitiveKind::PersonalNumber)
    } else if CLINICAL.is_match(text) {
        Some(SensitiveKind::ClinicalContent)
    } else {
        None
    }
}

/// Whether the utterance must be refused
pub fn is_sensitive(text: &str) -> bool {
    classify(text).is_some()
}

const PNR_TAG: &str = "[pnr]";
const EMAIL_TAG: &str = "[email]";
const PHONE_TAG: &str = "[phone]";

/// Whether the text carries a personal identifier, raw or already redacted
pub fn contains_identifier(text: &str) -> bool {
    PERSONAL_NUMBER.is_match(text)
        || EMAIL.is_match(text)
        || PHONE.is_match(text)
        || [PNR_TAG, EMAIL_TAG, PHONE_TAG].iter().any(|tag| text.contains(tag))
}

/// Replace personal identity numbers, e-mail addresses and phone numbers
/// with placeholders.
pub fn redact(text: &str) -> String {
    let text = PERSONAL_NUMBER.replace_all(text, PNR_TAG);
    let text = EMAIL.replace_all(&text, EMAIL_TAG);
    let text = PHONE.replace_all(&text, PHONE_TAG);
    text.into_owned()
}
