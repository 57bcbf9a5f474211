//! HTTP server assembly.
//!
//! Fixed pipeline per request: CORS origin admission, then the auth gate,
//! then the transport session binder. The health probe sits outside the
//! gate by route, not by credential.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Json, Router,
    extract::{Request, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
};
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::auth::{CredentialStore, require_auth};
use crate::config::GatewayConfig;
use crate::cors::{OriginPolicy, cors_layer};
use crate::transport::{ProtocolEngine, SessionGuard};

/// Service identifier reported by the health endpoint.
pub const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Clone)]
struct AppState {
    engine: Arc<dyn ProtocolEngine>,
}

/// Assemble the gateway router.
pub fn build_router(
    credentials: Arc<CredentialStore>,
    origins: OriginPolicy,
    engine: Arc<dyn ProtocolEngine>,
) -> Router {
    let protected = Router::new()
        .route("/mcp", any(handle_mcp))
        .layer(middleware::from_fn_with_state(credentials, require_auth))
        .with_state(AppState { engine });

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(origins)),
        )
}

/// Bind a fresh transport session to this request and delegate to it.
///
/// Accepts every HTTP method; the transport decides what each method means
/// at the protocol level.
async fn handle_mcp(State(state): State<AppState>, request: Request) -> Response {
    match proxy_to_engine(state.engine.as_ref(), request).await {
        Ok(response) => response,
        Err(error) => {
            // This path only fires before any response exists; once the
            // transport has produced one, mid-stream failures stay on the
            // connection and are only logged by the transport layer.
            error!("error handling MCP request: {error:#}");
            internal_error()
        }
    }
}

async fn proxy_to_engine(engine: &dyn ProtocolEngine, request: Request) -> Result<Response> {
    let mut session = SessionGuard::new(engine.connect().await?);
    session.handle_request(request).await
}

/// JSON-RPC error envelope for failures inside the binder.
fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "jsonrpc": "2.0",
            "error": { "code": -32603, "message": "Internal server error" },
            "id": null,
        })),
    )
        .into_response()
}

/// Liveness probe. No state, no side effects, never authenticated.
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "service": SERVICE_NAME }))
}

/// Bind the listener and run the gateway until shutdown.
pub async fn serve(
    config: &GatewayConfig,
    credentials: Arc<CredentialStore>,
    engine: Arc<dyn ProtocolEngine>,
) -> Result<()> {
    let policy = OriginPolicy::new(&config.allowed_origins);
    let router = build_router(credentials.clone(), policy, engine);

    let listener = tokio::net::TcpListener::bind(config.bind_target()).await?;

    info!(
        "MCP gateway listening on http://{}/mcp",
        config.bind_target()
    );
    info!("allowed origins: {}", config.allowed_origins.join(", "));
    if credentials.basic_enabled() {
        info!("HTTP Basic auth enabled for the MCP endpoint");
    }
    if credentials.bearer_enabled() {
        info!("Bearer token auth enabled for the MCP endpoint");
    }
    if !credentials.requires_auth() {
        warn!("no authentication configured; the MCP endpoint accepts any caller");
    }

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportSession;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request as HttpRequest, header};
    use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct StubSession {
        closes: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl TransportSession for StubSession {
        async fn handle_request(&mut self, _request: Request) -> Result<Response> {
            if self.fail {
                anyhow::bail!("engine exploded");
            }
            Ok((StatusCode::OK, "handled").into_response())
        }

        fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StubEngine {
        closes: Arc<AtomicUsize>,
        fail: bool,
    }

    impl StubEngine {
        fn new(fail: bool) -> (Arc<Self>, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            (
                Arc::new(Self {
                    closes: closes.clone(),
                    fail,
                }),
                closes,
            )
        }
    }

    #[async_trait]
    impl ProtocolEngine for StubEngine {
        async fn connect(&self) -> Result<Box<dyn TransportSession>> {
            Ok(Box::new(StubSession {
                closes: self.closes.clone(),
                fail: self.fail,
            }))
        }
    }

    fn open_store() -> Arc<CredentialStore> {
        Arc::new(CredentialStore::new(None, None, &[]).unwrap())
    }

    fn bearer_store() -> Arc<CredentialStore> {
        Arc::new(CredentialStore::new(None, None, &["tok-1".into()]).unwrap())
    }

    fn router(
        credentials: Arc<CredentialStore>,
        origins: &[&str],
        engine: Arc<dyn ProtocolEngine>,
    ) -> Router {
        let patterns: Vec<String> = origins.iter().map(|s| s.to_string()).collect();
        build_router(credentials, OriginPolicy::new(&patterns), engine)
    }

    fn mcp_request() -> HttpRequest<Body> {
        HttpRequest::builder()
            .uri("/mcp")
            .method(Method::POST)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_open_regardless_of_auth_config() {
        let (engine, _) = StubEngine::new(false);
        let app = router(bearer_store(), &[], engine);

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], SERVICE_NAME);
    }

    #[tokio::test]
    async fn mcp_reaches_engine_when_auth_unconfigured() {
        let (engine, closes) = StubEngine::new(false);
        let app = router(open_store(), &[], engine);

        let response = app.oneshot(mcp_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unauthenticated_mcp_request_never_creates_a_session() {
        let (engine, closes) = StubEngine::new(false);
        let app = router(bearer_store(), &[], engine);

        let response = app.oneshot(mcp_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().contains_key(header::WWW_AUTHENTICATE));
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_bearer_token_reaches_engine() {
        let (engine, _) = StubEngine::new(false);
        let app = router(bearer_store(), &[], engine);

        let request = HttpRequest::builder()
            .uri("/mcp")
            .method(Method::POST)
            .header(header::AUTHORIZATION, "Bearer tok-1")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn valid_basic_pair_reaches_engine() {
        let (engine, _) = StubEngine::new(false);
        let credentials = Arc::new(
            CredentialStore::new(Some("alice".into()), Some("pa:ss".into()), &[]).unwrap(),
        );
        let app = router(credentials, &[], engine);

        let request = HttpRequest::builder()
            .uri("/mcp")
            .method(Method::POST)
            .header(
                header::AUTHORIZATION,
                format!("Basic {}", BASE64.encode("alice:pa:ss")),
            )
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn engine_failure_maps_to_json_rpc_envelope() {
        let (engine, closes) = StubEngine::new(true);
        let app = router(open_store(), &[], engine);

        let response = app.oneshot(mcp_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["error"]["code"], -32603);
        assert_eq!(body["error"]["message"], "Internal server error");
        assert!(body["id"].is_null());
        // The session is released even on the failure path.
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn each_request_gets_its_own_session() {
        let (engine, closes) = StubEngine::new(false);
        let app = router(open_store(), &[], engine);

        for _ in 0..5 {
            let response = app.clone().oneshot(mcp_request()).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        assert_eq!(closes.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn listed_origin_receives_cors_grant() {
        let (engine, _) = StubEngine::new(false);
        let app = router(open_store(), &["http://a.test"], engine);

        let request = HttpRequest::builder()
            .uri("/mcp")
            .method(Method::POST)
            .header(header::ORIGIN, "http://a.test")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
            Some("http://a.test")
        );
    }

    #[tokio::test]
    async fn unlisted_origin_receives_no_cors_grant() {
        let (engine, _) = StubEngine::new(false);
        let app = router(open_store(), &["http://a.test"], engine);

        let request = HttpRequest::builder()
            .uri("/mcp")
            .method(Method::POST)
            .header(header::ORIGIN, "http://b.test")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert!(
            !response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        );
    }

    #[tokio::test]
    async fn request_without_origin_is_served_normally() {
        let (engine, _) = StubEngine::new(false);
        let app = router(open_store(), &["http://a.test"], engine);

        let response = app.oneshot(mcp_request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            !response
                .headers()
                .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        );
    }

    #[tokio::test]
    async fn preflight_is_answered_before_the_auth_gate() {
        let (engine, closes) = StubEngine::new(false);
        let app = router(bearer_store(), &["http://a.test"], engine);

        let request = HttpRequest::builder()
            .uri("/mcp")
            .method(Method::OPTIONS)
            .header(header::ORIGIN, "http://a.test")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_ne!(response.status(), StatusCode::UNAUTHORIZED);
        let allow_headers = response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_HEADERS)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(allow_headers.contains("mcp-session-id"));
        assert!(allow_headers.contains("content-type"));
        assert_eq!(closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn admitted_response_exposes_mcp_headers() {
        let (engine, _) = StubEngine::new(false);
        let app = router(open_store(), &["http://a.test"], engine);

        let request = HttpRequest::builder()
            .uri("/mcp")
            .method(Method::POST)
            .header(header::ORIGIN, "http://a.test")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let exposed = response
            .headers()
            .get(header::ACCESS_CONTROL_EXPOSE_HEADERS)
            .and_then(|v| v.to_str().ok())
            .unwrap();
        assert!(exposed.contains("mcp-session-id"));
        assert!(exposed.contains("mcp-protocol-version"));
    }
}
