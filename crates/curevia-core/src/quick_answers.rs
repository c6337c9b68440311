//! Quick-answer matcher
//!
//! Ordered `(pattern, reply)` rules, first match wins. The built-in set can
//! be extended once at startup from an external JSON list of
//! `{ "pattern": "...", "reply": "...", "lang": "sv" }` objects.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::Links;
use crate::language::Language;

const PATTERN_SIZE_LIMIT: usize = 1 << 20;
const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// One compiled rule
#[derive(Debug, Clone)]
pub struct QuickAnswer {
    pattern: Regex,
    reply: String,
    lang: Option<Language>,
}

impl QuickAnswer {
    pub fn reply(&self) -> &str {
        &self.reply
    }

    pub fn applies_to(&self, lang: Language) -> bool {
        self.lang.map_or(true, |l| l == lang)
    }
}

/// Uncompiled rule as it appears in the external list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickAnswerSpec {
    pub pattern: String,
    pub reply: String,
    #[serde(default)]
    pub lang: Option<String>,
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .size_limit(PATTERN_SIZE_LIMIT)
        .build()
}

/// The ordered rule table
#[derive(Debug, Clone, Default)]
pub struct QuickAnswers {
    rules: Vec<QuickAnswer>,
}

impl QuickAnswers {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Built-in rules
    pub fn builtin(links: &Links) -> Self {
        let sv = Some(Language::Sv);
        let en = Some(Language::En);
        let specs: Vec<(&str, String, Option<Language>)> = vec![
            (
                "eget bolag|företag",
                format!("Nej, du kan få betalt direkt via Curevia eller genom ditt eget bolag – välj det som passar dig bäst.\n👉 Registrera konsultprofil: {}", links.register_consultant),
                sv,
            ),
            (
                "utbetal",
                "Utbetalning via Curevia sker automatiskt när vårdgivaren har betalat Curevia. Har du eget bolag fakturerar du själv (oftast 30 dagars villkor).".to_string(),
                sv,
            ),
            (
                "inte betalar|försenad betal|betalningspåminnel",
                "Om en vårdgivare inte betalar i tid driver Curevia ärendet vidare till inkasso och därefter Kronofogden. Du ska kunna känna dig trygg att arbetet ersätts.".to_string(),
                sv,
            ),
            (
                "kostnad|pris|avgift",
                format!("Att testa Curevia är gratis och de tre första uppdragen per år är kostnadsfria. Därefter gäller en låg avgift.\n👉 Prisöversikt för vårdgivare: {}", links.pricing),
                sv,
            ),
            (
                "onboard|komma igång|hur börjar|hur kommer",
                "Enkelt att komma igång: skapa ett uppdrag och välj bland intresserade konsulter. Du får en dedikerad kundansvarig som säkerställer att du blir nöjd.".to_string(),
                sv,
            ),
            (
                "own company|limited company|sole trader",
                format!("No, you can be paid directly through Curevia or through your own company, whichever suits you best.\n👉 Create a consultant profile: {}", links.register_consultant),
                en,
            ),
            (
                "doesn'?t pay|late payment|payment reminder",
                "If a provider doesn't pay on time, Curevia takes the matter to debt collection. You can rest assured that your work gets paid.".to_string(),
                en,
            ),
            (
                "pricing|\\bfees?\\b",
                format!("Trying Curevia is free and the first three assignments each year cost nothing. After that a low fee applies.\n👉 Pricing for providers: {}", links.pricing),
                en,
            ),
        ];

        let rules = specs
            .into_iter()
            .filter_map(|(pattern, reply, lang)| {
                compile(pattern).ok().map(|pattern| QuickAnswer {
                    pattern,
                    reply,
                    lang,
                })
            })
            .collect();
        Self { rules }
    }

    /// Append external rules after the current ones. Invalid patterns,
    /// empty replies and unknown languages are skipped with a warning.
    /// Returns how many rules were added.
    pub fn extend(&mut self, specs: impl IntoIterator<Item = QuickAnswerSpec>) -> usize {
        let mut added = 0;
        for spec in specs {
            if spec.pattern.trim().is_empty() || spec.reply.trim().is_empty() {
                warn!("Skipping quick answer with empty pattern or reply");
                continue;
            }
            let lang = match spec.lang.as_deref() {
                None | Some("") => None,
                Some(code) => match Language::from_code(code) {
                    Some(lang) => Some(lang),
                    None => {
                        warn!(lang = %code, "Skipping quick answer for unsupported language");
                        continue;
                    }
                },
            };
            match compile(&spec.pattern) {
                Ok(pattern) => {
                    self.rules.push(QuickAnswer {
                        pattern,
                        reply: spec.reply,
                        lang,
                    });
                    added += 1;
                }
                Err(e) => warn!(error = %e, "Skipping quick answer with invalid pattern"),
            }
        }
        added
    }

    /// Parse and append an external JSON list
    pub fn extend_from_json(&mut self, json: &str) -> serde_json::Result<usize> {
        let specs: Vec<QuickAnswerSpec> = serde_json::from_str(json)?;
        Ok(self.extend(specs))
    }

    /// Built-in rules plus, when `url` is set, the external list. Fetch
    /// failures leave the built-in set in place.
    pub async fn load(links: &Links, url: Option<&str>, client: &reqwest::Client) -> Self {
        let mut answers = Self::builtin(links);
        if let Some(url) = url {
            match fetch_specs(client, url).await {
                Ok(specs) => {
                    let added = answers.extend(specs);
                    debug!(added, "Loaded external quick answers");
                }
                Err(e) => warn!(error = %e, "Could not load external quick answers"),
            }
        }
        answers
    }

    /// First rule that matches and applies to `lang`
    pub fn find(&self, text: &str, lang: Language) -> Option<&QuickAnswer> {
        self.rules
            .iter()
            .find(|rule| rule.applies_to(lang) && rule.pattern.is_match(text))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

async fn fetch_specs(client: &reqwest::Client, url: &str) -> anyhow::Result<Vec<QuickAnswerSpec>> {
    let response = client.get(url).timeout(FETCH_TIMEOUT).send().await?;
    if !response.status().is_success() {
        anyhow::bail!("quick answer source returned {}", response.status());
    }
    Ok(response.json().await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_first_match_wins() {
        let qa = QuickAnswers::builtin(&Links::default());
        let hit = qa.find("Behöver jag eget bolag?", Language::Sv).unwrap();
        assert!(hit.reply().starts_with("Nej, du kan få betalt"));

        let hit = qa.find("Hur sker utbetalningen?", Language::Sv).unwrap();
        assert!(hit.reply().starts_with("Utbetalning via Curevia"));
    }

    #[test]
    fn test_language_scope() {
        let qa = QuickAnswers::builtin(&Links::default());
        assert!(qa.find("Vad är priset?", Language::Sv).is_some());
        assert!(qa.find("Vad är priset?", Language::En).is_none());
        assert!(qa.find("What are your fees?", Language::En).is_some());
    }

    #[test]
    fn test_external_rules_are_validated() {
        let mut qa = QuickAnswers::empty();
        let added = qa
            .extend_from_json(
                r#"[
                    {"pattern": "parkering", "reply": "Parkering finns."},
                    {"pattern": "(unclosed", "reply": "never"},
                    {"pattern": "moms", "reply": ""},
                    {"pattern": "tolk", "reply": "Vi har tolkar.", "lang": "xx"},
                    {"pattern": "PARKING", "reply": "Parking is available.", "lang": "en"}
                ]"#,
            )
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(qa.len(), 2);
        assert_eq!(
            qa.find("Finns det Parkering?", Language::Da).unwrap().reply(),
            "Parkering finns."
        );
        assert_eq!(
            qa.find("is there parking", Language::En).unwrap().reply(),
            "Parking is available."
        );
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let mut qa = QuickAnswers::empty();
        assert!(qa.extend_from_json("{not json").is_err());
        assert!(qa.is_empty());
    }
}
