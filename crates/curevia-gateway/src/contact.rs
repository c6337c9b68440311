//! Lead capture relay

use chrono::{DateTime, Utc};
use curevia_core::Language;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::security::client_digest;
use crate::{GatewayError, Result};

const FIELD_LIMIT: usize = 1000;
const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

/// Contact form as posted by the widget
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Validated lead, as forwarded to the webhook
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactLead {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub language: Language,
    pub session_id: String,
    pub received_at: DateTime<Utc>,
}

fn clean(value: &str) -> String {
    value.trim().chars().take(FIELD_LIMIT).collect()
}

fn clean_optional(value: Option<&str>) -> Option<String> {
    value.map(clean).filter(|v| !v.is_empty())
}

impl ContactForm {
    /// Trim and cap every field; name and a valid e-mail are required
    pub fn validate(&self, language: Language, session_id: &str) -> Result<ContactLead> {
        let name = clean(&self.name);
        let email = clean(&self.email);
        if name.is_empty() || email.is_empty() {
            return Err(GatewayError::BadRequest("name and email are required".to_string()));
        }
        if !EMAIL.is_match(&email) {
            return Err(GatewayError::BadRequest("invalid email address".to_string()));
        }
        Ok(ContactLead {
            name,
            email,
            phone: clean_optional(self.phone.as_deref()),
            message: clean_optional(self.message.as_deref()),
            language,
            session_id: session_id.to_string(),
            received_at: Utc::now(),
        })
    }
}

/// Forwards leads to a webhook, or only logs them when none is configured
#[derive(Debug, Clone)]
pub struct ContactRelay {
    webhook: Option<String>,
    client: reqwest::Client,
}

impl ContactRelay {
    pub fn new(webhook: Option<String>) -> Self {
        Self {
            webhook,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn is_configured(&self) -> bool {
        self.webhook.is_some()
    }

    pub async fn relay(&self, lead: &ContactLead) -> Result<()> {
        let Some(url) = &self.webhook else {
            tracing::info!(
                email = %client_digest(&lead.email),
                lang = %lead.language,
                "Contact lead received without webhook, logged only"
            );
            return Ok(());
        };

        let response = self
            .client
            .post(url)
            .timeout(RELAY_TIMEOUT)
            .json(lead)
            .send()
            .await
            .map_err(|e| GatewayError::ContactRelay(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::ContactRelay(format!("webhook returned {status}")));
        }
        tracing::info!(lang = %lead.language, "Contact lead relayed");
        Ok(())
    }
}
