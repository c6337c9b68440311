//! Localized fixed texts

use crate::language::Language;

/// Refusal shown when an utterance carries personal or clinical data
pub fn sensitive_refusal(lang: Language) -> &'static str {
    match lang {
        Language::Sv => "Jag kan inte ta emot person- eller journaluppgifter här. Mejla oss via en säker kanal så hjälper vi dig.",
        Language::En => "I can't accept personal identity numbers or medical record details here. Please contact us through a secure channel and we'll help you.",
        Language::No => "Jeg kan ikke ta imot personnummer eller journalopplysninger her. Kontakt oss via en sikker kanal, så hjelper vi deg.",
        Language::Da => "Jeg kan ikke modtage CPR-numre eller journaloplysninger her. Kontakt os via en sikker kanal, så hjælper vi dig.",
    }
}

/// Confirmation after an explicit language switch, written in the new language
pub fn switch_confirmation(lang: Language) -> &'static str {
    match lang {
        Language::Sv => "Okej! Jag svarar på svenska från och med nu.",
        Language::En => "Sure! I'll answer in English from now on.",
        Language::No => "Greit! Jeg svarer på norsk fra nå av.",
        Language::Da => "Selvfølgelig! Jeg svarer på dansk fra nu af.",
    }
}

/// Generic message when the completion provider failed or timed out
pub fn upstream_failure(lang: Language) -> &'static str {
    match lang {
        Language::Sv => "Tekniskt fel – prova igen om en stund.",
        Language::En => "Something went wrong on our side – please try again shortly.",
        Language::No => "Teknisk feil – prøv igjen om litt.",
        Language::Da => "Teknisk fejl – prøv igen om lidt.",
    }
}

/// Message for rate-limited callers
pub fn rate_limited(lang: Language) -> &'static str {
    match lang {
        Language::Sv => "Du skickar många meddelanden just nu. Vänta en minut och försök igen.",
        Language::En => "You're sending a lot of messages right now. Please wait a minute and try again.",
        Language::No => "Du sender mange meldinger akkurat nå. Vent et minutt og prøv igjen.",
        Language::Da => "Du sender mange beskeder lige nu. Vent et minut og prøv igen.",
    }
}

/// Message for malformed or missing input
pub fn invalid_request(lang: Language) -> &'static str {
    match lang {
        Language::Sv => "Jag förstod inte förfrågan. Skriv ett meddelande och försök igen.",
        Language::En => "I couldn't read that request. Please type a message and try again.",
        Language::No => "Jeg forsto ikke forespørselen. Skriv en melding og prøv igjen.",
        Language::Da => "Jeg forstod ikke forespørgslen. Skriv en besked og prøv igen.",
    }
}

/// Message for oversized request bodies
pub fn payload_too_large(lang: Language) -> &'static str {
    match lang {
        Language::Sv => "Meddelandet är för långt.",
        Language::En => "The message is too long.",
        Language::No => "Meldingen er for lang.",
        Language::Da => "Beskeden er for lang.",
    }
}

/// Message for internal errors and misconfiguration
pub fn internal_error(lang: Language) -> &'static str {
    match lang {
        Language::Sv => "Tjänsten är inte tillgänglig just nu. Prova igen senare.",
        Language::En => "The service is unavailable right now. Please try again later.",
        Language::No => "Tjenesten er ikke tilgjengelig akkurat nå. Prøv igjen senere.",
        Language::Da => "Tjenesten er ikke tilgængelig lige nu. Prøv igen senere.",
    }
}

/// Acknowledgement for a captured lead
pub fn contact_thanks(lang: Language) -> &'static str {
    match lang {
        Language::Sv => "Tack! Vi hör av oss inom kort.",
        Language::En => "Thanks! We'll be in touch shortly.",
        Language::No => "Takk! Vi tar kontakt snart.",
        Language::Da => "Tak! Vi kontakter dig snarest.",
    }
}

/// Suggested questions shown before the cache has any trending entries
pub fn default_suggestions(lang: Language) -> &'static [&'static str] {
    match lang {
        Language::Sv => &[
            "Hur fungerar Curevia för vårdgivare?",
            "Vad kostar det?",
            "Hur registrerar jag mig som konsult?",
            "När får jag betalt?",
        ],
        Language::En => &[
            "How does Curevia work for providers?",
            "What does it cost?",
            "How do I sign up as a consultant?",
            "When do I get paid?",
        ],
        Language::No => &[
            "Hvordan fungerer Curevia for leverandører?",
            "Hva koster det?",
            "Hvordan registrerer jeg meg som konsulent?",
            "Når får jeg betalt?",
        ],
        Language::Da => &[
            "Hvordan fungerer Curevia for udbydere?",
            "Hvad koster det?",
            "Hvordan registrerer jeg mig som konsulent?",
            "Hvornår får jeg udbetalt?",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_language_has_texts() {
        for lang in Language::ALL {
            assert!(!sensitive_refusal(lang).is_empty());
            assert!(!switch_confirmation(lang).is_empty());
            assert_eq!(default_suggestions(lang).len(), 4);
        }
    }
}
