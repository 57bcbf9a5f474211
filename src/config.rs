//! Startup configuration snapshot.

use std::net::{IpAddr, SocketAddr};

/// Origins admitted by default: local development frontends.
pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://127.0.0.1:3000";

/// Immutable configuration, assembled once in `main` from environment-backed
/// CLI arguments and passed by reference into the gateway. Nothing re-reads
/// the environment per request.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// API key for the backend search API. Required; startup fails without it.
    pub api_key: String,
    /// Base URL of the backend search API.
    pub base_url: String,
    pub port: u16,
    pub bind_address: IpAddr,
    /// Origin allow-list; `*` admits any origin.
    pub allowed_origins: Vec<String>,
    /// Basic pair, both-or-neither (enforced by credential store construction).
    pub basic_auth_username: Option<String>,
    pub basic_auth_password: Option<String>,
    /// Raw Bearer tokens; trimmed and deduplicated by the credential store.
    pub bearer_tokens: Vec<String>,
}

impl GatewayConfig {
    /// The socket the gateway listens on.
    pub fn bind_target(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
