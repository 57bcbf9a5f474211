//! Axum middleware enforcing the auth gate on the MCP endpoint.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::auth::store::{AuthDecision, CredentialStore};

/// Realm reported in the `WWW-Authenticate` challenge.
pub const REALM: &str = "MCP Search Gateway";

/// Gate every request behind the credential store.
///
/// When no credential scheme is configured the gate is inert and passes
/// requests through unchanged. Otherwise the request must carry a valid
/// `Authorization` header; anything else gets the uniform 401 challenge.
pub async fn require_auth(
    State(store): State<Arc<CredentialStore>>,
    request: Request,
    next: Next,
) -> Response {
    if !store.requires_auth() {
        return next.run(request).await;
    }

    let header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match store.authorize(header) {
        AuthDecision::Admit => next.run(request).await,
        AuthDecision::Reject => {
            warn!(path = %request.uri().path(), "rejected request with missing or invalid credentials");
            unauthorized()
        }
    }
}

/// Uniform rejection: same challenge and body no matter what was wrong with
/// the credential, so the response leaks nothing about the configured
/// schemes or which field mismatched.
fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(
            header::WWW_AUTHENTICATE,
            format!("Basic realm=\"{REALM}\""),
        )],
        "Unauthorized",
    )
        .into_response()
}
