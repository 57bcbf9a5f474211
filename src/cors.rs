//! Origin admission policy for browser-based MCP clients.

use axum::http::{HeaderName, HeaderValue, Method, header};
use http::request::Parts;
use tower_http::cors::{AllowOrigin, CorsLayer};

const MCP_SESSION_ID: HeaderName = HeaderName::from_static("mcp-session-id");
const MCP_PROTOCOL_VERSION: HeaderName = HeaderName::from_static("mcp-protocol-version");

/// Snapshot of the origin allow-list, compiled once at startup.
///
/// A literal `*` anywhere in the configured list admits every origin.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allow_all: bool,
    origins: Vec<String>,
}

impl OriginPolicy {
    pub fn new(patterns: &[String]) -> Self {
        Self {
            allow_all: patterns.iter().any(|pattern| pattern == "*"),
            origins: patterns.to_vec(),
        }
    }

    /// Decide whether the request origin may receive cross-origin grants.
    ///
    /// A request without an `Origin` header is not cross-origin (non-browser
    /// or same-origin caller) and is always admitted. Rejection carries no
    /// hint of which origins are configured.
    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            None => true,
            Some(origin) => self.allow_all || self.origins.iter().any(|entry| entry == origin),
        }
    }
}

/// Build the CORS layer for the gateway router.
///
/// Admitted origins are granted the MCP session headers regardless of which
/// allow-list entry matched; rejected origins simply receive no grant
/// headers and the browser enforces the block.
pub fn cors_layer(policy: OriginPolicy) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map(|origin| policy.is_allowed(Some(origin)))
                    .unwrap_or(false)
            },
        ))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, MCP_SESSION_ID])
        .expose_headers([MCP_SESSION_ID, MCP_PROTOCOL_VERSION])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(patterns: &[&str]) -> OriginPolicy {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        OriginPolicy::new(&patterns)
    }

    #[test]
    fn listed_origin_admitted() {
        let policy = policy(&["http://a.test"]);
        assert!(policy.is_allowed(Some("http://a.test")));
    }

    #[test]
    fn unlisted_origin_rejected() {
        let policy = policy(&["http://a.test"]);
        assert!(!policy.is_allowed(Some("http://b.test")));
    }

    #[test]
    fn absent_origin_always_admitted() {
        assert!(policy(&["http://a.test"]).is_allowed(None));
        assert!(policy(&[]).is_allowed(None));
    }

    #[test]
    fn wildcard_admits_any_origin() {
        let policy = policy(&["http://a.test", "*"]);
        assert!(policy.is_allowed(Some("http://b.test")));
        assert!(policy.is_allowed(Some("https://anything.example")));
    }

    #[test]
    fn match_is_exact_not_prefix() {
        let policy = policy(&["http://a.test"]);
        assert!(!policy.is_allowed(Some("http://a.test.evil.example")));
        assert!(!policy.is_allowed(Some("http://a.tes")));
    }
}
