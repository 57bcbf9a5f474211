pub mod auth;
pub mod config;
pub mod cors;
pub mod engine;
pub mod search;
pub mod server;
pub mod transport;

// Re-export the types the binary and embedders wire together.
pub use auth::{AuthDecision, CredentialStore};
pub use config::GatewayConfig;
pub use cors::OriginPolicy;
pub use engine::{GatewayServer, StreamableEngine};
pub use search::{SearchBackend, SearchClient};
pub use transport::{ProtocolEngine, SessionGuard, TransportSession};
