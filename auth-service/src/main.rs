use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use auth_service::config::load_service_config;
use auth_service::metrics::AuthMetrics;
use auth_service::{build_router, AppState};
use jwt_auth::{EngineConfig, InMemoryDenylist, TokenEngine};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = load_service_config()?;
    let engine_config = EngineConfig::from_env().context("Invalid AUTHJWT_* configuration")?;
    if engine_config.secret_key.is_none() && engine_config.private_key.is_none() {
        warn!("no signing key configured; token issuance will fail");
    }

    let denylist = InMemoryDenylist::new();
    let engine = TokenEngine::builder(engine_config)
        .with_revocation_check(denylist.clone())
        .build()
        .context("Failed to build token engine")?;

    let state = AppState {
        engine: Arc::new(engine),
        denylist,
        config: Arc::new(config.clone()),
        metrics: Arc::new(AuthMetrics::new()?),
    };
    let app = build_router(state);

    let ip: std::net::IpAddr = config.host.parse()?;
    let addr = SocketAddr::from((ip, config.port));
    info!(%addr, "starting auth-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
