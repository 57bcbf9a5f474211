use std::net::IpAddr;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use mcp_search_gateway::{
    CredentialStore, GatewayConfig, GatewayServer, SearchClient, StreamableEngine,
    config::DEFAULT_ALLOWED_ORIGINS, search::DEFAULT_BASE_URL, server,
};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mcp-search-gateway")]
#[command(about = "HTTP gateway exposing a search-backed MCP tool server")]
struct Cli {
    /// API key for the backend search API
    #[arg(long, env = "SEARCH_API_KEY")]
    api_key: String,

    /// Base URL of the backend search API
    #[arg(long, env = "SEARCH_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Listen address
    #[arg(long, env = "BIND_ADDRESS", default_value = "127.0.0.1")]
    bind_address: IpAddr,

    /// Comma-separated origins allowed to make cross-origin requests
    /// (`*` admits any origin)
    #[arg(
        long,
        env = "ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_value = DEFAULT_ALLOWED_ORIGINS
    )]
    allowed_origins: Vec<String>,

    /// Username for HTTP Basic auth (requires the password as well)
    #[arg(long, env = "BASIC_AUTH_USERNAME")]
    basic_auth_username: Option<String>,

    /// Password for HTTP Basic auth (requires the username as well)
    #[arg(long, env = "BASIC_AUTH_PASSWORD")]
    basic_auth_password: Option<String>,

    /// Comma-separated Bearer tokens accepted on the MCP endpoint
    #[arg(long, env = "BEARER_TOKENS", value_delimiter = ',')]
    bearer_tokens: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("mcp_search_gateway=info".parse()?)
                .add_directive("rmcp=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    let config = GatewayConfig {
        api_key: cli.api_key,
        base_url: cli.base_url,
        port: cli.port,
        bind_address: cli.bind_address,
        allowed_origins: cli.allowed_origins,
        basic_auth_username: cli.basic_auth_username,
        basic_auth_password: cli.basic_auth_password,
        bearer_tokens: cli.bearer_tokens,
    };

    // Credential validation happens before any socket is bound; a one-sided
    // Basic pair terminates startup here with a non-zero exit.
    let credentials = Arc::new(CredentialStore::new(
        config.basic_auth_username.clone(),
        config.basic_auth_password.clone(),
        &config.bearer_tokens,
    )?);

    let backend = Arc::new(SearchClient::new(
        config.api_key.clone(),
        config.base_url.clone(),
    )?);
    let engine = Arc::new(StreamableEngine::new(GatewayServer::new(backend)));

    server::serve(&config, credentials, engine).await
}
