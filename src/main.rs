use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dbpeer_router::config::ServerConfig;
use dbpeer_router::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tokio_rustls::rustls::crypto::ring::default_provider().install_default();

    let config = ServerConfig::parse();

    let filter = EnvFilter::from_default_env().add_directive("dbpeer_router=info".parse()?);
    if config.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(addr = %config.listen_addr(), tls = config.tls_enabled(), "starting router");
    if config.token.is_some() {
        tracing::info!("pre-shared token required on all endpoints");
    }
    if config.dev_mode {
        tracing::warn!("development mode enabled: GET /{{group}}/send is active");
    }

    Server::new(config).run().await
}
