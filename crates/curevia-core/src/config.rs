//! Resolver configuration
//!
//! Layered as built-in defaults, then an optional TOML file, then the
//! process environment (with `.env` loaded through `dotenvy`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default OpenAI-compatible endpoint
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Fixed destinations used by tool replies, quick answers and CTAs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Links {
    pub demo: String,
    pub register_consultant: String,
    pub register_provider: String,
    pub pricing: String,
}

impl Default for Links {
    fn default() -> Self {
        Self {
            demo: "https://calendly.com/tim-curevia/30min".to_string(),
            register_consultant: "https://curevia.ai/consultant/register".to_string(),
            register_provider: "https://curevia.ai/auth?type=signup&returnTo=/employer/register"
                .to_string(),
            pricing: "https://preview--vardgig-connect.lovable.app/vardgivare".to_string(),
        }
    }
}

/// Completion provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Base URL of the OpenAI-compatible API
    pub api_base: String,

    /// Bearer credential; the generative stage is unavailable without it
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub model: String,

    pub max_output_tokens: u32,

    /// Hard limit for one generative call, in seconds
    pub timeout_secs: u64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            max_output_tokens: 220,
            timeout_secs: 18,
        }
    }
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn has_key(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

/// Knowledge cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Embedding model used by the remote embedder
    pub embed_model: String,

    /// Dimension of the local hashing embedder
    pub hashing_dimension: usize,

    /// Minimum similarity for a cache hit
    pub similarity_threshold: f32,

    /// Minimum similarity for a reference passage
    pub reference_threshold: f32,

    pub max_references: usize,

    /// Suggested questions per language
    pub trending_limit: usize,

    /// SQLite file; `None` keeps the cache in memory
    pub db_path: Option<PathBuf>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            embed_model: "text-embedding-3-small".to_string(),
            hashing_dimension: 256,
            similarity_threshold: 0.82,
            reference_threshold: 0.60,
            max_references: 3,
            trending_limit: 4,
            db_path: None,
        }
    }
}

/// Everything the resolution pipeline needs to know
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub provider: ProviderSettings,

    pub cache: CacheSettings,

    /// Utterances longer than this are rejected
    pub max_input_chars: usize,

    /// Optional JSON list of extra quick answers
    pub quick_answers_url: Option<String>,

    /// Session lifetime in the durable store
    pub session_ttl_days: i64,

    pub links: Links,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            provider: ProviderSettings::default(),
            cache: CacheSettings::default(),
            max_input_chars: 1000,
            quick_answers_url: None,
            session_ttl_days: 7,
            links: Links::default(),
        }
    }
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.provider.api_key = Some(key.into());
        self
    }

    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.provider.api_base = base.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.provider.model = model.into();
        self
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.cache.similarity_threshold = threshold;
        self
    }

    pub fn with_max_input_chars(mut self, max: usize) -> Self {
        self.max_input_chars = max;
        self
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache.db_path = Some(path.into());
        self
    }

    pub fn with_quick_answers_url(mut self, url: impl Into<String>) -> Self {
        self.quick_answers_url = Some(url.into());
        self
    }

    /// Load a TOML file over the defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Reading config '{}'", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Parsing config '{}'", path.display()))?;
        Ok(config)
    }

    /// Defaults, then the optional file, then `.env` and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup; unparsable values are ignored
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("OPENAI_API_KEY") {
            self.provider.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_API_BASE") {
            self.provider.api_base = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = get("CUREVIA_MODEL") {
            self.provider.model = v;
        }
        if let Some(v) = get("CUREVIA_EMBED_MODEL") {
            self.cache.embed_model = v;
        }
        if let Some(v) = get("CUREVIA_SIMILARITY_THRESHOLD").and_then(|v| v.parse().ok()) {
            self.cache.similarity_threshold = v;
        }
        if let Some(v) = get("CUREVIA_PROVIDER_TIMEOUT_SECS").and_then(|v| v.parse::<u64>().ok()) {
            self.provider.timeout_secs = v.max(1);
        }
        if let Some(v) = get("CUREVIA_MAX_INPUT_CHARS").and_then(|v| v.parse().ok()) {
            self.max_input_chars = v;
        }
        if let Some(v) = get("QUICK_ANSWERS_URL") {
            self.quick_answers_url = Some(v);
        }
        if let Some(v) = get("CUREVIA_DB_PATH") {
            self.cache.db_path = Some(PathBuf::from(v));
        }
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        let t = self.cache.similarity_threshold;
        if !(0.0..=1.0).contains(&t) {
            anyhow::bail!("similarity threshold must be within [0, 1], got {t}");
        }
        if self.cache.reference_threshold > t {
            anyhow::bail!("reference threshold must not exceed the similarity threshold");
        }
        if self.max_input_chars == 0 {
            anyhow::bail!("max_input_chars must be positive");
        }
        if self.cache.hashing_dimension == 0 {
            anyhow::bail!("hashing_dimension must be positive");
        }
        Ok(())
    }
}
