//! Credential store for the gateway's dual-scheme auth.

use std::collections::HashSet;

use anyhow::{Result, bail};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

/// Shared-secret Basic credential pair.
#[derive(Debug, Clone)]
struct BasicCredentials {
    username: String,
    password: String,
}

/// Outcome of evaluating one request's `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Admit,
    Reject,
}

/// Process-lifetime set of valid credentials, built once from configuration
/// at startup.
///
/// Immutable after construction, so it is shared across concurrent requests
/// behind an `Arc` without synchronization.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    basic: Option<BasicCredentials>,
    bearer_tokens: HashSet<String>,
}

impl CredentialStore {
    /// Build the store from raw configuration values.
    ///
    /// Fails when only one half of the Basic pair is set. Bearer tokens are
    /// trimmed, empty entries dropped, and duplicates collapsed.
    pub fn new(
        basic_username: Option<String>,
        basic_password: Option<String>,
        bearer_tokens: &[String],
    ) -> Result<Self> {
        let basic = match (basic_username, basic_password) {
            (Some(username), Some(password)) => Some(BasicCredentials { username, password }),
            (None, None) => None,
            _ => bail!(
                "BASIC_AUTH_USERNAME and BASIC_AUTH_PASSWORD must both be set or both be unset"
            ),
        };

        let bearer_tokens = bearer_tokens
            .iter()
            .map(|token| token.trim())
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            basic,
            bearer_tokens,
        })
    }

    /// Whether any credential scheme is configured. When this is false the
    /// auth gate admits every request (auth is opt-in).
    pub fn requires_auth(&self) -> bool {
        self.basic.is_some() || !self.bearer_tokens.is_empty()
    }

    pub fn basic_enabled(&self) -> bool {
        self.basic.is_some()
    }

    pub fn bearer_enabled(&self) -> bool {
        !self.bearer_tokens.is_empty()
    }

    /// Evaluate a single `Authorization` header value.
    ///
    /// Malformed input of any kind (bad base64, non-UTF-8 bytes, missing
    /// separator) degrades to `Reject`; this never panics.
    pub fn authorize(&self, header: Option<&str>) -> AuthDecision {
        let Some(header) = header else {
            return AuthDecision::Reject;
        };

        // Scheme prefixes are matched case-sensitively, one trailing space.
        if let Some(encoded) = header.strip_prefix("Basic ") {
            return self.authorize_basic(encoded);
        }
        if let Some(token) = header.strip_prefix("Bearer ") {
            return self.authorize_bearer(token);
        }

        AuthDecision::Reject
    }

    fn authorize_basic(&self, encoded: &str) -> AuthDecision {
        let Some(expected) = &self.basic else {
            return AuthDecision::Reject;
        };

        let Ok(decoded) = BASE64.decode(encoded) else {
            return AuthDecision::Reject;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return AuthDecision::Reject;
        };

        // Only the first `:` separates username from password; the password
        // may itself contain colons.
        let Some((username, password)) = decoded.split_once(':') else {
            return AuthDecision::Reject;
        };

        if username == expected.username && password == expected.password {
            AuthDecision::Admit
        } else {
            AuthDecision::Reject
        }
    }

    fn authorize_bearer(&self, token: &str) -> AuthDecision {
        let token = token.trim();
        if !token.is_empty() && self.bearer_tokens.contains(token) {
            AuthDecision::Admit
        } else {
            AuthDecision::Reject
        }
    }
}
