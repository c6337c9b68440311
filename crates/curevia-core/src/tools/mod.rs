//! Deterministic tool router
//!
//! Closed-form requests answered without any model call: the net income
//! calculator and fixed templates for explicit navigation intents.

pub mod amount;
pub mod net_salary;

use lazy_static::lazy_static;
use regex::Regex;

use crate::config::Links;
use crate::intent::Intent;
use crate::language::Language;
use crate::reply::{Action, Reply, ReplySource};

pub use amount::{find_amount, format_amount, parse_amount};
pub use net_salary::{
    calculate, format_breakdown, AssumptionOverrides, NetSalaryBreakdown, SalaryAssumptions,
};

lazy_static! {
    static ref INVOICE: Regex = Regex::new(
        r"(?i)faktur|invoic|fakturer|nettolön|nettolønn|nettoløn|net salary|take[- ]home|räkna.*lön|beräkna.*lön"
    )
    .unwrap();
}

/// What the router produced
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub reply: Reply,
    /// Invoice amount the calculator ran on, for the session slot
    pub invoice: Option<f64>,
}

/// Routes closed-form requests to fixed handlers
#[derive(Debug, Clone)]
pub struct ToolRouter {
    links: Links,
    defaults: SalaryAssumptions,
}

impl ToolRouter {
    pub fn new(links: Links) -> Self {
        Self {
            links,
            defaults: SalaryAssumptions::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: SalaryAssumptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Answer the utterance if it is a closed-form request
    pub fn route(
        &self,
        utterance: &str,
        intent: Intent,
        lang: Language,
        overrides: Option<&AssumptionOverrides>,
    ) -> Option<ToolOutcome> {
        if INVOICE.is_match(utterance) {
            if let Some(invoice) = find_amount(utterance) {
                let assumptions = match overrides {
                    Some(o) => self.defaults.with_overrides(o),
                    None => self.defaults,
                };
                let breakdown = calculate(invoice, assumptions);
                let reply = Reply::new(format_breakdown(&breakdown, lang), ReplySource::Tool, lang);
                return Some(ToolOutcome {
                    reply,
                    invoice: Some(invoice),
                });
            }
        }

        let reply = match intent {
            Intent::RegisterProvider => Reply::new(
                template(lang, Template::RegisterProvider).replace("{url}", &self.links.register_provider),
                ReplySource::Tool,
                lang,
            )
            .with_url(&self.links.register_provider),
            Intent::RegisterConsultant => Reply::new(
                template(lang, Template::RegisterConsultant)
                    .replace("{url}", &self.links.register_consultant),
                ReplySource::Tool,
                lang,
            )
            .with_url(&self.links.register_consultant),
            Intent::BookDemo => Reply::new(
                template(lang, Template::BookDemo).replace("{url}", &self.links.demo),
                ReplySource::Tool,
                lang,
            )
            .with_url(&self.links.demo),
            Intent::Contact => Reply::new(template(lang, Template::Contact), ReplySource::Tool, lang)
                .with_action(Action::OpenContactForm),
            // Switch commands are persisted and confirmed by the pipeline
            Intent::SwitchLanguage(_)
            | Intent::ProviderTopic
            | Intent::ConsultantTopic
            | Intent::General => return None,
        };

        Some(ToolOutcome {
            reply,
            invoice: None,
        })
    }
}

#[derive(Clone, Copy)]
enum Template {
    RegisterProvider,
    RegisterConsultant,
    BookDemo,
    Contact,
}

fn template(lang: Language, t: Template) -> &'static str {
    match (lang, t) {
        (Language::Sv, Template::RegisterProvider) => "Toppen! Registrera din verksamhet här: {url}",
        (Language::Sv, Template::RegisterConsultant) => "Grymt! Registrera din konsultprofil här: {url}",
        (Language::Sv, Template::BookDemo) => "Boka en demo här: {url}",
        (Language::Sv, Template::Contact) => "Fyll i formuläret så kontaktar vi dig inom kort.",
        (Language::En, Template::RegisterProvider) => "Great! Register your organisation here: {url}",
        (Language::En, Template::RegisterConsultant) => "Great! Create your consultant profile here: {url}",
        (Language::En, Template::BookDemo) => "Book a demo here: {url}",
        (Language::En, Template::Contact) => "Fill in the form and we'll get back to you shortly.",
        (Language::No, Template::RegisterProvider) => "Flott! Registrer virksomheten din her: {url}",
        (Language::No, Template::RegisterConsultant) => "Flott! Opprett konsulentprofilen din her: {url}",
        (Language::No, Template::BookDemo) => "Book en demo her: {url}",
        (Language::No, Template::Contact) => "Fyll ut skjemaet, så kontakter vi deg snart.",
        (Language::Da, Template::RegisterProvider) => "Super! Registrér din virksomhed her: {url}",
        (Language::Da, Template::RegisterConsultant) => "Super! Opret din konsulentprofil her: {url}",
        (Language::Da, Template::BookDemo) => "Book en demo her: {url}",
        (Language::Da, Template::Contact) => "Udfyld formularen, så kontakter vi dig snarest.",
    }
}
