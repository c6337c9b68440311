//! Main Gateway implementation
//!
//! HTTP surface of the site assistant: `GET|POST /resolve` and `GET /health`.

use axum::{
    body::Body,
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::get,
    Json, Router,
};
use curevia_core::language::parse_hint;
use curevia_core::pipeline::{finished_frames, FrameStream};
use curevia_core::tools::net_salary::AssumptionOverrides;
use curevia_core::{i18n, Language, Pipeline, Prepared, Reply, ResolveRequest, SessionId, StreamFrame};
use futures::StreamExt;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::contact::{ContactForm, ContactRelay};
use crate::error::ApiError;
use crate::security::{client_digest, client_id, IngressGate};
use crate::GatewayError;

/// Session token header, read on requests and set on every response
pub const SESSION_HEADER: &str = "x-session-id";

/// Language hint header
pub const LANG_HEADER: &str = "x-lang";

/// Gateway state shared across handlers
pub struct GatewayState {
    pub config: GatewayConfig,
    pub pipeline: Arc<Pipeline>,
    pub ingress: IngressGate,
    pub contact: ContactRelay,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig, pipeline: Pipeline) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let pipeline = pipeline.with_generative_limit(config.rate_limit_generative);

        Self {
            ingress: IngressGate::new(config.rate_limit_general, config.max_payload_bytes),
            contact: ContactRelay::new(config.contact_webhook_url.clone()),
            pipeline: Arc::new(pipeline),
            config,
            shutdown_tx,
        }
    }

    fn fail(&self, error: impl Into<GatewayError>, lang: Language) -> ApiError {
        error.into().respond(lang, self.config.debug_errors)
    }
}

/// Query parameters of `/resolve`
#[derive(Debug, Default, Deserialize)]
pub struct ResolveQuery {
    pub lang: Option<String>,
    pub stream: Option<String>,
}

/// Body of `POST /resolve`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveBody {
    pub message: Option<String>,
    pub assumptions: Option<AssumptionOverrides>,
    pub contact: Option<ContactForm>,
    pub feedback: Option<Feedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub entry_id: i64,
    pub up: bool,
}

/// Per-request context resolved from headers and query
struct RequestContext {
    client: String,
    session: SessionId,
    hint: Option<String>,
    lang: Language,
    wants_stream: bool,
}

impl RequestContext {
    fn new(headers: &HeaderMap, query: &ResolveQuery, peer: Option<SocketAddr>) -> Self {
        let header_str = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let session = header_str(SESSION_HEADER)
            .and_then(|raw| SessionId::parse(&raw))
            .unwrap_or_default();
        let hint = query
            .lang
            .clone()
            .filter(|v| parse_hint(v).is_some())
            .or_else(|| header_str(LANG_HEADER))
            .or_else(|| header_str(header::ACCEPT_LANGUAGE.as_str()));
        let lang = hint.as_deref().and_then(parse_hint).unwrap_or_default();

        let accepts_sse = header_str(header::ACCEPT.as_str())
            .is_some_and(|v| v.contains("text/event-stream"));
        let stream_param = query
            .stream
            .as_deref()
            .is_some_and(|v| matches!(v, "1" | "true"));

        Self {
            client: client_id(headers, peer),
            session,
            hint,
            lang,
            wants_stream: accepts_sse || stream_param,
        }
    }
}

fn with_session(mut response: Response, session: &SessionId) -> Response {
    if let Ok(value) = HeaderValue::from_str(session.as_str()) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(SESSION_HEADER), value);
    }
    response
}

fn sse_response(frames: FrameStream) -> Response {
    let events = frames.map(|frame: StreamFrame| Event::default().event(frame.event_name()).json_data(&frame));
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

/// Main Gateway
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    pub fn new(config: GatewayConfig, pipeline: Pipeline) -> Self {
        Self {
            state: Arc::new(GatewayState::new(config, pipeline)),
        }
    }

    /// Build the pipeline from the `[resolver]` settings
    pub async fn from_config(config: GatewayConfig) -> anyhow::Result<Self> {
        let pipeline = Pipeline::from_config(config.resolver.clone()).await?;
        Ok(Self::new(config, pipeline))
    }

    /// Get gateway state
    pub fn state(&self) -> Arc<GatewayState> {
        self.state.clone()
    }

    /// Build the Axum router
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/health", get(Self::handle_health))
            .route("/resolve", get(Self::handle_metadata).post(Self::handle_resolve))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the gateway server
    pub async fn start(&self) -> anyhow::Result<()> {
        let addr = self.state.config.socket_addr()?;
        let router = self.build_router();

        tracing::info!(%addr, "Curevia gateway starting");

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(GatewayError::Io)?;
        let sweeper = self.spawn_sweeper();

        let mut shutdown_rx = self.state.shutdown_tx.subscribe();
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = shutdown_rx.recv() => {}
                }
            })
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        sweeper.abort();
        tracing::info!("Gateway stopped");
        Ok(())
    }

    /// Shutdown the gateway
    pub fn shutdown(&self) {
        let _ = self.state.shutdown_tx.send(());
        tracing::info!("Gateway shutdown initiated");
    }

    /// Periodically drop expired rate-limit counters and sessions
    pub fn spawn_sweeper(&self) -> tokio::task::JoinHandle<()> {
        let state = self.state.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(state.config.sweep_interval());
            interval.tick().await;
            loop {
                interval.tick().await;
                state.ingress.cleanup();
                state.pipeline.generative_limiter().cleanup();
                let sessions = state.pipeline.sessions().cleanup().await;
                tracing::debug!(
                    clients = state.ingress.limiter().tracked_clients(),
                    sessions,
                    "Swept expired counters"
                );
            }
        })
    }

    // HTTP handlers

    async fn handle_health() -> impl IntoResponse {
        Json(serde_json::json!({
            "status": "healthy",
            "version": crate::VERSION
        }))
    }

    async fn handle_metadata(
        State(state): State<Arc<GatewayState>>,
        Query(query): Query<ResolveQuery>,
        peer: Option<ConnectInfo<SocketAddr>>,
        headers: HeaderMap,
    ) -> Response {
        let ctx = RequestContext::new(&headers, &query, peer.map(|ConnectInfo(addr)| addr));
        if let Err(e) = state.ingress.admit(&ctx.client) {
            return state.fail(e, ctx.lang).into_response();
        }

        let metadata = state
            .pipeline
            .metadata(Some(&ctx.session), ctx.hint.as_deref())
            .await;
        with_session(Json(metadata).into_response(), &ctx.session)
    }

    async fn handle_resolve(
        State(state): State<Arc<GatewayState>>,
        Query(query): Query<ResolveQuery>,
        peer: Option<ConnectInfo<SocketAddr>>,
        headers: HeaderMap,
        body: Body,
    ) -> Response {
        let ctx = RequestContext::new(&headers, &query, peer.map(|ConnectInfo(addr)| addr));
        let response = match Self::resolve_inner(&state, &ctx, &headers, body).await {
            Ok(response) => response,
            Err(e) => e.into_response(),
        };
        with_session(response, &ctx.session)
    }

    async fn resolve_inner(
        state: &Arc<GatewayState>,
        ctx: &RequestContext,
        headers: &HeaderMap,
        body: Body,
    ) -> std::result::Result<Response, ApiError> {
        let started = Instant::now();
        state.ingress.admit(&ctx.client).map_err(|e| state.fail(e, ctx.lang))?;

        let bytes = state
            .ingress
            .read_body(headers, body)
            .await
            .map_err(|e| state.fail(e, ctx.lang))?;
        let payload: ResolveBody = if bytes.iter().all(u8::is_ascii_whitespace) {
            ResolveBody::default()
        } else {
            serde_json::from_slice(&bytes).map_err(|e| state.fail(e, ctx.lang))?
        };

        if let Some(form) = payload.contact {
            let lead = form
                .validate(ctx.lang, ctx.session.as_str())
                .map_err(|e| state.fail(e, ctx.lang))?;
            state.contact.relay(&lead).await.map_err(|e| state.fail(e, ctx.lang))?;
            return Ok(Json(serde_json::json!({
                "ok": true,
                "message": i18n::contact_thanks(ctx.lang),
            }))
            .into_response());
        }

        if let Some(feedback) = payload.feedback {
            let votes = state
                .pipeline
                .vote(feedback.entry_id, feedback.up)
                .await
                .map_err(|e| state.fail(e, ctx.lang))?;
            return Ok(Json(serde_json::json!({
                "ok": true,
                "entryId": feedback.entry_id,
                "votes": votes,
            }))
            .into_response());
        }

        let message = payload
            .message
            .ok_or_else(|| state.fail(GatewayError::BadRequest("missing 'message' string".into()), ctx.lang))?;

        let mut request = ResolveRequest::new(message, ctx.session.clone()).with_client_id(ctx.client.clone());
        if let Some(hint) = &ctx.hint {
            request = request.with_lang_hint(hint.clone());
        }
        if let Some(assumptions) = payload.assumptions {
            request = request.with_assumptions(assumptions);
        }

        let prepared = state
            .pipeline
            .prepare(&request)
            .await
            .map_err(|e| state.fail(e, ctx.lang))?;

        let client = client_digest(&ctx.client);
        if ctx.wants_stream {
            let frames: FrameStream = match prepared {
                Prepared::Done(reply) => {
                    log_reply(&client, &reply, started);
                    Box::pin(futures::stream::iter(finished_frames(reply, &ctx.session)))
                }
                Prepared::Generate(plan) => {
                    tracing::info!(client = %client, lang = %plan.language, "Streaming generative reply");
                    state.pipeline.generate_stream(plan)
                }
            };
            return Ok(sse_response(frames));
        }

        let reply = match prepared {
            Prepared::Done(reply) => reply,
            Prepared::Generate(plan) => {
                let lang = plan.language;
                state
                    .pipeline
                    .generate(plan)
                    .await
                    .map_err(|e| state.fail(e, lang))?
            }
        };
        log_reply(&client, &reply, started);
        Ok((StatusCode::OK, Json(reply)).into_response())
    }
}

fn log_reply(client: &str, reply: &Reply, started: Instant) {
    tracing::info!(
        client = %client,
        source = %reply.source,
        lang = %reply.language,
        entry = ?reply.entry_id,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Resolved"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use curevia_core::providers::OpenAiCompatibleProvider;
    use curevia_core::ResolverConfig;

    fn pipeline() -> Pipeline {
        Pipeline::new(
            ResolverConfig::default(),
            Arc::new(OpenAiCompatibleProvider::new(None, "http://127.0.0.1:9", "gpt-test")),
        )
    }

    #[test]
    fn test_gateway_state() {
        let config = GatewayConfig::default().with_rate_limits(5, 2);
        let gateway = Gateway::new(config, pipeline());
        assert_eq!(gateway.state().pipeline.generative_limiter().limit(), 2);
        assert_eq!(gateway.state().ingress.limiter().limit(), 5);
    }

    #[test]
    fn test_request_context() {
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_static("visitor-42"));
        headers.insert(LANG_HEADER, HeaderValue::from_static("da"));
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));

        let ctx = RequestContext::new(&headers, &ResolveQuery::default(), None);
        assert_eq!(ctx.session.as_str(), "visitor-42");
        assert_eq!(ctx.lang, Language::Da);
        assert!(ctx.wants_stream);

        // Query language outranks the header
        let query = ResolveQuery {
            lang: Some("en".into()),
            stream: None,
        };
        let ctx = RequestContext::new(&headers, &query, None);
        assert_eq!(ctx.lang, Language::En);
        assert_eq!(ctx.hint.as_deref(), Some("en"));
    }

    #[test]
    fn test_missing_session_is_minted() {
        let ctx = RequestContext::new(&HeaderMap::new(), &ResolveQuery::default(), None);
        assert!(ctx.session.as_str().starts_with("sess-"));
        assert!(!ctx.wants_stream);
        assert_eq!(ctx.lang, Language::Sv);
    }
}
