//! Dual-scheme authentication for the MCP endpoint.
//!
//! Requests authenticate with either shared-secret HTTP Basic credentials or
//! an opaque Bearer token; both are static secrets provisioned through the
//! environment at startup. Authentication is binary gatekeeping: every
//! request is re-evaluated against the immutable [`CredentialStore`] and no
//! identity object is attached downstream.

mod middleware;
mod store;

pub use middleware::{REALM, require_auth};
pub use store::{AuthDecision, CredentialStore};
