//! Answer resolution pipeline
//!
//! One utterance in, one reply out. Stages run in a fixed order and each
//! either terminates the turn or passes through:
//!
//! 1. input validation
//! 2. session and language resolution
//! 3. safety filter
//! 4. explicit language switch
//! 5. deterministic tools
//! 6. quick answers
//! 7. knowledge cache
//! 8. generative fallback, composed and written back to the cache
//!
//! [`Pipeline::prepare`] runs stages 1-7 and either finishes the turn or
//! returns a [`GenerationPlan`]. The plan is consumed by
//! [`Pipeline::generate`] (blocking) or [`Pipeline::generate_stream`].

use anyhow::Context;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::composer::Composer;
use crate::config::ResolverConfig;
use crate::error::{ResolveError, Result};
use crate::fallback::GenerativeFallback;
use crate::i18n;
use crate::intent::{classify_intent, Intent};
use crate::knowledge::{
    CacheMatch, Embedder, HashingEmbedder, KnowledgeCache, KnowledgeStore, MemoryKnowledgeStore,
    OpenAiEmbedder, SqliteKnowledgeStore,
};
use crate::language::{resolve_language, Language, LanguageDecision, LanguageSignals};
use crate::prompt::PromptBuilder;
use crate::providers::{CompletionProvider, CompletionRequest, OpenAiCompatibleProvider};
use crate::quick_answers::QuickAnswers;
use crate::rate_limit::RateLimiter;
use crate::reply::{Reply, ReplySource, StreamFrame, StreamMeta};
use crate::safety;
use crate::session::{slots, SessionId, SessionManager, SessionPatch, SqliteSessionStore};
use crate::tools::net_salary::AssumptionOverrides;
use crate::tools::ToolRouter;

/// Default generative requests per client per minute
pub const DEFAULT_GENERATIVE_LIMIT: u32 = 10;

const QUICK_ANSWER_CONFIDENCE: f32 = 0.95;
const GENERATIVE_CONFIDENCE: f32 = 0.6;

/// Boxed stream of protocol frames
pub type FrameStream = Pin<Box<dyn Stream<Item = StreamFrame> + Send>>;

/// One inbound turn
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub message: String,
    pub session_id: SessionId,
    /// Loose language hint from the query string or a header
    pub lang_hint: Option<String>,
    /// Per-turn calculator overrides
    pub assumptions: Option<AssumptionOverrides>,
    /// Key for the generative rate limit
    pub client_id: String,
}

impl ResolveRequest {
    pub fn new(message: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            message: message.into(),
            session_id,
            lang_hint: None,
            assumptions: None,
            client_id: "unknown".to_string(),
        }
    }

    pub fn with_lang_hint(mut self, hint: impl Into<String>) -> Self {
        self.lang_hint = Some(hint.into());
        self
    }

    pub fn with_assumptions(mut self, assumptions: AssumptionOverrides) -> Self {
        self.assumptions = Some(assumptions);
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }
}

/// Everything the generative stage needs once the cheap stages missed
#[derive(Debug, Clone)]
pub struct GenerationPlan {
    pub session_id: SessionId,
    pub language: Language,
    pub intent: Intent,
    pub utterance: String,
    pub request: CompletionRequest,
    /// Query embedding from the cache lookup, reused by the cache writer
    pub embedding: Option<Vec<f32>>,
    pub references: usize,
}

/// Outcome of the deterministic stages
#[derive(Debug, Clone)]
pub enum Prepared {
    Done(Reply),
    Generate(GenerationPlan),
}

/// Answer to `GET /resolve`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverMetadata {
    pub ok: bool,
    pub language: Language,
    pub cache_ready: bool,
    pub suggestions: Vec<String>,
    pub quick_answers: usize,
    pub has_key: bool,
    pub features: Features,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Features {
    pub streaming: bool,
    pub knowledge_cache: bool,
    pub durable_sessions: bool,
    pub calculator: bool,
    pub languages: Vec<Language>,
}

pub struct Pipeline {
    config: ResolverConfig,
    tools: ToolRouter,
    quick_answers: QuickAnswers,
    cache: Option<KnowledgeCache>,
    fallback: GenerativeFallback,
    composer: Composer,
    prompts: PromptBuilder,
    sessions: SessionManager,
    generative_limiter: RateLimiter,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("quick_answers", &self.quick_answers.len())
            .field("cache", &self.cache)
            .field("fallback", &self.fallback)
            .field("sessions", &self.sessions)
            .finish()
    }
}

impl Pipeline {
    /// Pipeline with built-in quick answers, volatile sessions and no
    /// knowledge cache
    pub fn new(config: ResolverConfig, provider: Arc<dyn CompletionProvider>) -> Self {
        let links = config.links.clone();
        let sessions = SessionManager::in_memory().with_ttl(session_ttl(&config));
        Self {
            tools: ToolRouter::new(links.clone()),
            quick_answers: QuickAnswers::builtin(&links),
            cache: None,
            fallback: GenerativeFallback::new(provider, config.provider.timeout()),
            composer: Composer::new(links.clone()),
            prompts: PromptBuilder::new(links, config.provider.max_output_tokens),
            sessions,
            generative_limiter: RateLimiter::new(DEFAULT_GENERATIVE_LIMIT),
            config,
        }
    }

    /// Wire the production collaborators: the OpenAI-compatible provider,
    /// SQLite stores when a database path is configured, and the external
    /// quick-answer list.
    pub async fn from_config(config: ResolverConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::new();
        let provider = OpenAiCompatibleProvider::new(
            config.provider.api_key.clone(),
            config.provider.api_base.clone(),
            config.provider.model.clone(),
        )
        .with_client(client.clone());

        let embedder: Arc<dyn Embedder> = match &config.provider.api_key {
            Some(key) if !key.is_empty() => Arc::new(
                OpenAiEmbedder::new(key.clone(), config.provider.api_base.clone(), config.cache.embed_model.clone())
                    .with_client(client.clone()),
            ),
            _ => {
                info!("No embedding credentials, using hashing embedder");
                Arc::new(HashingEmbedder::new(config.cache.hashing_dimension))
            }
        };

        let (store, sessions): (Arc<dyn KnowledgeStore>, SessionManager) = match &config.cache.db_path {
            Some(path) => {
                let store = SqliteKnowledgeStore::open(path)
                    .with_context(|| format!("Opening knowledge store at '{}'", path.display()))?;
                let session_store = SqliteSessionStore::open(path)
                    .with_context(|| format!("Opening session store at '{}'", path.display()))?;
                (Arc::new(store), SessionManager::with_store(Arc::new(session_store)))
            }
            None => {
                info!("No database path configured, knowledge cache and sessions are in-memory");
                (Arc::new(MemoryKnowledgeStore::new()), SessionManager::in_memory())
            }
        };

        let quick_answers =
            QuickAnswers::load(&config.links, config.quick_answers_url.as_deref(), &client).await;
        let cache = KnowledgeCache::new(store, embedder, config.cache.clone());
        let ttl = session_ttl(&config);

        Ok(Self::new(config, Arc::new(provider))
            .with_quick_answers(quick_answers)
            .with_cache(cache)
            .with_sessions(sessions.with_ttl(ttl)))
    }

    pub fn with_cache(mut self, cache: KnowledgeCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_quick_answers(mut self, quick_answers: QuickAnswers) -> Self {
        self.quick_answers = quick_answers;
        self
    }

    pub fn with_sessions(mut self, sessions: SessionManager) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_generative_limit(mut self, per_minute: u32) -> Self {
        self.generative_limiter = RateLimiter::new(per_minute);
        self
    }

    pub fn with_generative_limiter(mut self, limiter: RateLimiter) -> Self {
        self.generative_limiter = limiter;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&KnowledgeCache> {
        self.cache.as_ref()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn generative_limiter(&self) -> &RateLimiter {
        &self.generative_limiter
    }

    /// Stages 1-7
    pub async fn prepare(&self, request: &ResolveRequest) -> Result<Prepared> {
        let utterance = request.message.trim();
        if utterance.is_empty() {
            return Err(ResolveError::Validation("message is empty".to_string()));
        }
        let chars = utterance.chars().count();
        if chars > self.config.max_input_chars {
            return Err(ResolveError::Validation(format!(
                "message has {} characters, limit is {}",
                chars, self.config.max_input_chars
            )));
        }

        let id = &request.session_id;
        let state = self.sessions.get(id).await;
        let decision = resolve_language(LanguageSignals {
            session: state.language,
            hint: request.lang_hint.as_deref(),
            utterance,
        });
        let lang = decision.language();

        // Sensitive text stops here: nothing is logged, cached or stored
        if let Some(kind) = safety::classify(utterance) {
            info!(%kind, lang = %lang, "Rejected sensitive utterance");
            return Ok(Prepared::Done(Reply::new(
                i18n::sensitive_refusal(lang),
                ReplySource::Safety,
                lang,
            )));
        }

        if let LanguageDecision::Switched(target) = decision {
            self.sessions
                .patch(
                    id,
                    SessionPatch::new()
                        .with_language(target)
                        .with_slot(slots::LAST_SOURCE, ReplySource::LanguageSwitch.as_str()),
                )
                .await;
            info!(lang = %target, "Session language switched");
            let reply = Reply::new(i18n::switch_confirmation(target), ReplySource::LanguageSwitch, target)
                .with_suggestions(self.suggestions(target).await);
            return Ok(Prepared::Done(reply));
        }

        let intent = classify_intent(utterance);
        debug!(intent = intent.label(), lang = %lang, chars, "Classified utterance");

        if let Some(outcome) = self
            .tools
            .route(utterance, intent, lang, request.assumptions.as_ref())
        {
            let mut patch = turn_patch(intent, outcome.reply.source);
            if let Some(invoice) = outcome.invoice {
                patch = patch.with_slot(slots::LAST_INVOICE, format!("{}", invoice.round() as i64));
            }
            self.sessions.patch(id, patch).await;
            return Ok(Prepared::Done(outcome.reply));
        }

        if let Some(quick) = self.quick_answers.find(utterance, lang) {
            self.sessions
                .patch(id, turn_patch(intent, ReplySource::QuickAnswer))
                .await;
            return Ok(Prepared::Done(
                Reply::new(quick.reply(), ReplySource::QuickAnswer, lang)
                    .with_confidence(QUICK_ANSWER_CONFIDENCE),
            ));
        }

        let mut references: Vec<CacheMatch> = Vec::new();
        let mut embedding = None;
        if let Some(cache) = &self.cache {
            let lookup = cache.lookup(lang, utterance).await;
            if let Some(hit) = lookup.hit {
                cache.touch(hit.entry.id).await;
                cache.log_query(lang, utterance, Some(hit.entry.id)).await;
                self.sessions
                    .patch(id, turn_patch(intent, ReplySource::KnowledgeCache))
                    .await;
                return Ok(Prepared::Done(
                    Reply::new(hit.entry.answer, ReplySource::KnowledgeCache, lang)
                        .with_confidence(hit.similarity)
                        .with_entry_id(hit.entry.id),
                ));
            }
            references = lookup.references;
            embedding = lookup.embedding;
        }

        if !self.fallback.is_configured() {
            return Err(ResolveError::Misconfigured(
                "completion provider has no API key".to_string(),
            ));
        }
        if !self.generative_limiter.check(&request.client_id) {
            return Err(ResolveError::RateLimited("generative requests".to_string()));
        }

        Ok(Prepared::Generate(GenerationPlan {
            session_id: id.clone(),
            language: lang,
            intent,
            utterance: utterance.to_string(),
            request: self.prompts.build(utterance, intent, lang, &references),
            embedding,
            references: references.len(),
        }))
    }

    /// Blocking generative stage
    pub async fn generate(&self, plan: GenerationPlan) -> Result<Reply> {
        let text = self.fallback.complete(plan.request.clone()).await?;
        Ok(self.finish(&plan, &text).await)
    }

    /// Streaming generative stage: `meta`, `token`s, then `final` or `error`.
    /// Dropping the stream cancels the provider call.
    pub fn generate_stream(self: &Arc<Self>, plan: GenerationPlan) -> FrameStream {
        let this = Arc::clone(self);
        Box::pin(async_stream::stream! {
            yield StreamFrame::Meta(StreamMeta {
                source: ReplySource::Generative,
                language: plan.language,
                session_id: plan.session_id.to_string(),
            });

            let mut fragments = this.fallback.stream(plan.request.clone());
            let mut text = String::new();
            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Ok(fragment) => {
                        text.push_str(&fragment);
                        yield StreamFrame::Token { text: fragment };
                    }
                    Err(e) => {
                        yield error_frame(&e, plan.language);
                        return;
                    }
                }
            }

            let reply = this.finish(&plan, &text).await;
            yield StreamFrame::Final(reply);
        })
    }

    /// `prepare` then `generate`
    pub async fn resolve(&self, request: &ResolveRequest) -> Result<Reply> {
        match self.prepare(request).await? {
            Prepared::Done(reply) => Ok(reply),
            Prepared::Generate(plan) => self.generate(plan).await,
        }
    }

    /// Compose, write the cache and record the turn
    async fn finish(&self, plan: &GenerationPlan, raw: &str) -> Reply {
        let lang = plan.language;
        let composed = self
            .composer
            .compose(raw, plan.intent, &plan.utterance, lang);
        let mut reply =
            Reply::new(composed, ReplySource::Generative, lang).with_confidence(GENERATIVE_CONFIDENCE);

        if let Some(cache) = &self.cache {
            match cache
                .remember(lang, &plan.utterance, &reply.reply, plan.embedding.clone())
                .await
            {
                Ok(id) => {
                    debug!(id, references = plan.references, "Cached generative answer");
                    cache.log_query(lang, &plan.utterance, Some(id)).await;
                    reply = reply.with_entry_id(id);
                }
                Err(e) => {
                    warn!(error = %e, "Could not cache generative answer");
                    cache.log_query(lang, &plan.utterance, None).await;
                }
            }
        }

        self.sessions
            .patch(&plan.session_id, turn_patch(plan.intent, ReplySource::Generative))
            .await;
        reply
    }

    /// Suggested questions for a language
    pub async fn suggestions(&self, lang: Language) -> Vec<String> {
        match &self.cache {
            Some(cache) => cache.suggestions(lang).await,
            None => i18n::default_suggestions(lang)
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    /// Metadata for `GET /resolve`
    pub async fn metadata(&self, session_id: Option<&SessionId>, lang_hint: Option<&str>) -> ResolverMetadata {
        let session = match session_id {
            Some(id) => self.sessions.get(id).await.language,
            None => None,
        };
        let language = resolve_language(LanguageSignals {
            session,
            hint: lang_hint,
            utterance: "",
        })
        .language();

        let cache_ready = match &self.cache {
            Some(cache) => cache.is_ready().await,
            None => false,
        };

        ResolverMetadata {
            ok: true,
            language,
            cache_ready,
            suggestions: self.suggestions(language).await,
            quick_answers: self.quick_answers.len(),
            has_key: self.fallback.is_configured(),
            features: Features {
                streaming: true,
                knowledge_cache: self.cache.is_some(),
                durable_sessions: self.sessions.is_durable(),
                calculator: true,
                languages: Language::ALL.to_vec(),
            },
        }
    }

    /// Up- or down-vote a cached entry; returns the new score
    pub async fn vote(&self, entry_id: i64, up: bool) -> Result<u32> {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| ResolveError::Validation("knowledge cache is disabled".to_string()))?;
        cache.vote(entry_id, up).await.map_err(|e| match e {
            crate::error::CacheError::NotFound(id) => {
                ResolveError::Validation(format!("unknown entry {id}"))
            }
            other => {
                warn!(error = %other, "Vote failed");
                ResolveError::Upstream("knowledge store unavailable".to_string())
            }
        })
    }
}

fn session_ttl(config: &ResolverConfig) -> Duration {
    Duration::from_secs(config.session_ttl_days.max(1) as u64 * 24 * 60 * 60)
}

fn turn_patch(intent: Intent, source: ReplySource) -> SessionPatch {
    let patch = SessionPatch::new().with_slot(slots::LAST_SOURCE, source.as_str());
    match intent.role() {
        Some(role) => patch.with_slot(slots::ROLE, role.as_str()),
        None => patch,
    }
}

/// Frame for a failed generative stage; detail stays in the logs
pub fn error_frame(error: &ResolveError, lang: Language) -> StreamFrame {
    let message = match error {
        ResolveError::Validation(_) => i18n::invalid_request(lang),
        ResolveError::RateLimited(_) => i18n::rate_limited(lang),
        ResolveError::Misconfigured(_) => i18n::internal_error(lang),
        ResolveError::UpstreamTimeout(_) | ResolveError::Upstream(_) => i18n::upstream_failure(lang),
    };
    StreamFrame::Error {
        kind: error.kind().to_string(),
        message: message.to_string(),
    }
}

/// `meta` and `final` frames for a turn finished without the provider
pub fn finished_frames(reply: Reply, session_id: &SessionId) -> [StreamFrame; 2] {
    [
        StreamFrame::Meta(StreamMeta {
            source: reply.source,
            language: reply.language,
            session_id: session_id.to_string(),
        }),
        StreamFrame::Final(reply),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_patch_records_role() {
        let patch = turn_patch(Intent::ConsultantTopic, ReplySource::Generative);
        assert_eq!(patch.slots.get(slots::ROLE).map(String::as_str), Some("consultant"));
        assert_eq!(patch.slots.get(slots::LAST_SOURCE).map(String::as_str), Some("generative"));

        let patch = turn_patch(Intent::General, ReplySource::Tool);
        assert!(!patch.slots.contains_key(slots::ROLE));
    }

    #[test]
    fn test_error_frames_hide_detail() {
        let frame = error_frame(&ResolveError::Upstream("HTTP 401 invalid key sk-...".into()), Language::En);
        match frame {
            StreamFrame::Error { kind, message } => {
                assert_eq!(kind, "upstream_error");
                assert!(!message.contains("sk-"));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn test_session_ttl_floor() {
        let config = ResolverConfig {
            session_ttl_days: 0,
            ..Default::default()
        };
        assert_eq!(session_ttl(&config), Duration::from_secs(86_400));
    }
}
