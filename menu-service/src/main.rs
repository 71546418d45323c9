use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use common_auth::TokenAuthorizer;
use menu_service::app::build_router;
use menu_service::app_state::AppState;
use menu_service::config::ServiceConfig;
use menu_service::drinks::DrinkStore;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServiceConfig::from_env()?;
    let store = DrinkStore::connect(&config.database_url, config.database_max_connections)
        .await
        .with_context(|| format!("Failed to open drink store at {}", config.database_url))?;
    if config.seed_demo {
        store.seed_demo().await.context("Failed to seed demo drink")?;
    }

    info!(
        domain = %config.jwt.domain,
        audience = %config.jwt.audience,
        cache = config.jwt.jwks_cache_ttl.is_some(),
        "token authorizer configured"
    );
    let authorizer = Arc::new(TokenAuthorizer::from_config(config.jwt.clone()));
    let app = build_router(AppState::new(store, authorizer));

    let addr = SocketAddr::from((config.host, config.port));
    info!(%addr, "starting menu-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
