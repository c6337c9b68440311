//! HTTP tests for the gateway router
//!
//! Drives `/resolve` and `/health` through `tower::ServiceExt::oneshot`
//! with a scripted completion provider.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use curevia_core::config::CacheSettings;
use curevia_core::i18n;
use curevia_core::knowledge::{HashingEmbedder, MemoryKnowledgeStore};
use curevia_core::providers::{CompletionProvider, CompletionRequest, TextStream};
use curevia_core::{KnowledgeCache, Language, Pipeline, ProviderError, ResolverConfig};
use curevia_gateway::{Gateway, GatewayConfig};

struct Scripted {
    calls: AtomicUsize,
}

#[async_trait]
impl CompletionProvider for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(
        &self,
        _request: CompletionRequest,
        _cancel: CancellationToken,
    ) -> Result<TextStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(futures::stream::iter(vec![
            Ok("Vi hjälper ".to_string()),
            Ok("gärna till.".to_string()),
        ])))
    }
}

struct Failing;

#[async_trait]
impl CompletionProvider for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    async fn stream(
        &self,
        _request: CompletionRequest,
        _cancel: CancellationToken,
    ) -> Result<TextStream, ProviderError> {
        Err(ProviderError::Status {
            status: 401,
            body: "invalid api key sk-live-123".into(),
        })
    }
}

fn router_with(config: GatewayConfig, provider: Arc<dyn CompletionProvider>) -> Router {
    let cache = KnowledgeCache::new(
        Arc::new(MemoryKnowledgeStore::new()),
        Arc::new(HashingEmbedder::default()),
        CacheSettings::default(),
    );
    let pipeline = Pipeline::new(ResolverConfig::default(), provider).with_cache(cache);
    Gateway::new(config, pipeline).build_router()
}

fn router() -> (Router, Arc<Scripted>) {
    let provider = Arc::new(Scripted {
        calls: AtomicUsize::new(0),
    });
    (router_with(GatewayConfig::default(), provider.clone()), provider)
}

fn post(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/resolve")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (app, _) = router();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_calculator_reply_and_minted_session() {
    let (app, provider) = router();
    let response = app
        .oneshot(post(r#"{"message":"Jag fakturerar 100000 kr exkl moms"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let session = response.headers().get("x-session-id").unwrap().to_str().unwrap().to_string();
    assert!(session.starts_with("sess-"));

    let body = json(response).await;
    assert_eq!(body["source"], "tool");
    assert!(body["reply"].as_str().unwrap().contains("44 133 kr"));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sensitive_message() {
    let (app, _) = router();
    let response = app
        .oneshot(post(r#"{"message":"Mitt nummer är 811212-1234"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["source"], "safety");
    assert_eq!(body["reply"], i18n::sensitive_refusal(Language::Sv));
}

#[tokio::test]
async fn test_session_header_carries_language_switch() {
    let (app, _) = router();
    let first = Request::builder()
        .method(Method::POST)
        .uri("/resolve")
        .header("x-session-id", "visitor-7")
        .body(Body::from(r#"{"message":"switch to English"}"#))
        .unwrap();
    let response = app.clone().oneshot(first).await.unwrap();
    assert_eq!(response.headers()["x-session-id"], "visitor-7");
    assert_eq!(json(response).await["source"], "language_switch");

    let second = Request::builder()
        .method(Method::POST)
        .uri("/resolve")
        .header("x-session-id", "visitor-7")
        .body(Body::from(r#"{"message":"Jag fakturerar 50000 kr"}"#))
        .unwrap();
    let body = json(app.oneshot(second).await.unwrap()).await;
    assert_eq!(body["language"], "en");
    assert!(body["reply"].as_str().unwrap().contains("SEK 50,000"));
}

#[tokio::test]
async fn test_generative_json_then_cache() {
    let (app, provider) = router();
    let message = r#"{"message":"Hur lång tid tar det att hitta personal till sommaren?"}"#;

    let first = json(app.clone().oneshot(post(message)).await.unwrap()).await;
    assert_eq!(first["source"], "generative");
    assert_eq!(first["reply"], "Vi hjälper gärna till.");

    let second = json(app.oneshot(post(message)).await.unwrap()).await;
    assert_eq!(second["source"], "knowledge_cache");
    assert_eq!(second["entryId"], first["entryId"]);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_sse_stream() {
    let (app, _) = router();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/resolve?stream=1")
        .body(Body::from(r#"{"message":"Hur lång tid tar det att hitta personal till sommaren?"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let body = text(response).await;
    let meta = body.find("event: meta").unwrap();
    let token = body.find("event: token").unwrap();
    let last = body.find("event: final").unwrap();
    assert!(meta < token && token < last);
    assert!(body.contains("Vi hjälper gärna till."));
}

#[tokio::test]
async fn test_sse_for_deterministic_reply() {
    let (app, _) = router();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/resolve")
        .header(header::ACCEPT, "text/event-stream")
        .body(Body::from(r#"{"message":"Jag vill boka en demo"}"#))
        .unwrap();
    let body = text(app.oneshot(request).await.unwrap()).await;
    assert!(body.contains("event: meta"));
    assert!(body.contains("event: final"));
    assert!(!body.contains("event: token"));
}

#[tokio::test]
async fn test_malformed_and_missing_message() {
    let (app, _) = router();
    let response = app.clone().oneshot(post("{not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.clone().oneshot(post("{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json(response).await;
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], i18n::invalid_request(Language::Sv));
    assert!(body.get("detail").is_none());

    let response = app.oneshot(post(r#"{"message":"   "}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_payload() {
    let (app, _) = router();
    let big = format!(r#"{{"message":"{}"}}"#, "a".repeat(200 * 1024));
    let response = app.oneshot(post(&big)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_wrong_method() {
    let (app, _) = router();
    let response = app
        .oneshot(
            Request::builder()
                .method(Method::DELETE)
                .uri("/resolve")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_general_rate_limit() {
    let provider = Arc::new(Scripted {
        calls: AtomicUsize::new(0),
    });
    let app = router_with(GatewayConfig::default().with_rate_limits(2, 10), provider);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post(r#"{"message":"Jag fakturerar 100000 kr"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = app.oneshot(post(r#"{"message":"Jag fakturerar 100000 kr"}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn test_upstream_error_hides_detail() {
    let app = router_with(GatewayConfig::default(), Arc::new(Failing));
    let response = app
        .oneshot(post(r#"{"message":"Hur lång tid tar det att hitta personal till sommaren?"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = text(response).await;
    assert!(!body.contains("sk-live-123"));
    assert!(body.contains("upstream_error"));
}

#[tokio::test]
async fn test_debug_errors_include_detail() {
    let app = router_with(GatewayConfig::default().with_debug_errors(true), Arc::new(Failing));
    let response = app
        .oneshot(post(r#"{"message":"Hur lång tid tar det att hitta personal till sommaren?"}"#))
        .await
        .unwrap();
    let body = json(response).await;
    assert!(body["detail"].as_str().unwrap().contains("401"));
}

#[tokio::test]
async fn test_metadata() {
    let (app, _) = router();
    let response = app
        .oneshot(Request::get("/resolve?lang=en").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["language"], "en");
    assert_eq!(body["hasKey"], true);
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_contact_without_webhook() {
    let (app, _) = router();
    let response = app
        .clone()
        .oneshot(post(r#"{"contact":{"name":"Anna","email":"anna@example.se"}}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["message"], i18n::contact_thanks(Language::Sv));

    let response = app
        .oneshot(post(r#"{"contact":{"name":"Anna","email":"not-an-email"}}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_contact_webhook_failure_is_bad_gateway() {
    let hook = Router::new().route(
        "/lead",
        axum::routing::post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, hook).await.unwrap();
    });

    let config = GatewayConfig::default().with_contact_webhook(format!("http://{addr}/lead"));
    let app = router_with(
        config,
        Arc::new(Scripted {
            calls: AtomicUsize::new(0),
        }),
    );
    let response = app
        .oneshot(post(r#"{"contact":{"name":"Anna","email":"anna@example.se"}}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_feedback_votes() {
    let (app, _) = router();
    let message = r#"{"message":"Hur lång tid tar det att hitta personal till sommaren?"}"#;
    let reply = json(app.clone().oneshot(post(message)).await.unwrap()).await;
    let id = reply["entryId"].as_i64().unwrap();

    let body = format!(r#"{{"feedback":{{"entryId":{id},"up":true}}}}"#);
    let response = json(app.clone().oneshot(post(&body)).await.unwrap()).await;
    assert_eq!(response["votes"], 1);

    let response = app
        .oneshot(post(r#"{"feedback":{"entryId":424242,"up":true}}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
