//! Seam between the HTTP gateway and the MCP protocol engine.
//!
//! Every request on the protocol endpoint gets its own transport session;
//! nothing session-shaped survives a request. [`SessionGuard`] owns one
//! session and guarantees its release on every exit path, including a
//! client disconnect that drops the handler future mid-flight.

use anyhow::Result;
use async_trait::async_trait;
use axum::{extract::Request, response::Response};

/// One HTTP exchange bound to one protocol session.
#[async_trait]
pub trait TransportSession: Send {
    /// Process the raw request. The session owns producing the HTTP
    /// response, including protocol-level errors it can express itself.
    async fn handle_request(&mut self, request: Request) -> Result<Response>;

    /// Release underlying resources. Called exactly once per session.
    fn close(&mut self);
}

/// Per-request factory for transport sessions.
///
/// The engine is shared across all requests and stateless between them; the
/// sessions it hands out are ephemeral and exclusively owned by one request.
#[async_trait]
pub trait ProtocolEngine: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn TransportSession>>;
}

/// Scoped owner of a transport session.
///
/// Dropping the guard closes the session, so an aborted request future
/// releases the transport exactly like a completed one.
pub struct SessionGuard {
    session: Box<dyn TransportSession>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn TransportSession>) -> Self {
        Self { session }
    }

    pub async fn handle_request(&mut self, request: Request) -> Result<Response> {
        self.session.handle_request(request).await
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.close();
    }
}
