//! Reply and stream frame types

use serde::{Deserialize, Serialize};

use crate::language::Language;

/// Client-side action attached to a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Open `url` in a new tab
    OpenUrl,
    /// Show the lead capture form
    OpenContactForm,
}

/// Pipeline stage that produced a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplySource {
    Safety,
    LanguageSwitch,
    Tool,
    QuickAnswer,
    KnowledgeCache,
    Generative,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplySource::Safety => "safety",
            ReplySource::LanguageSwitch => "language_switch",
            ReplySource::Tool => "tool",
            ReplySource::QuickAnswer => "quick_answer",
            ReplySource::KnowledgeCache => "knowledge_cache",
            ReplySource::Generative => "generative",
        }
    }
}

impl std::fmt::Display for ReplySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One answer to one utterance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub reply: String,
    pub action: Option<Action>,
    pub url: Option<String>,
    pub confidence: f32,
    #[serde(default)]
    pub suggestions: Vec<String>,
    pub source: ReplySource,
    pub entry_id: Option<i64>,
    pub language: Language,
}

impl Reply {
    pub fn new(text: impl Into<String>, source: ReplySource, language: Language) -> Self {
        Self {
            reply: text.into(),
            action: None,
            url: None,
            confidence: 1.0,
            suggestions: Vec::new(),
            source,
            entry_id: None,
            language,
        }
    }

    /// Attach an `open_url` action
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.action = Some(Action::OpenUrl);
        self.url = Some(url.into());
        self
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_entry_id(mut self, id: i64) -> Self {
        self.entry_id = Some(id);
        self
    }
}

/// Opening frame of a streamed reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMeta {
    pub source: ReplySource,
    pub language: Language,
    pub session_id: String,
}

/// Frames of the streaming protocol: one `meta`, any number of `token`s,
/// then exactly one of `final` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    Meta(StreamMeta),
    Token { text: String },
    Final(Reply),
    Error { kind: String, message: String },
}

impl StreamFrame {
    /// SSE event name
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamFrame::Meta(_) => "meta",
            StreamFrame::Token { .. } => "token",
            StreamFrame::Final(_) => "final",
            StreamFrame::Error { .. } => "error",
        }
    }

    /// Whether this frame ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFrame::Final(_) | StreamFrame::Error { .. })
    }
}
