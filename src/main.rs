//! Storefront session service entry point.

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront_session::backend::HttpBackend;
use storefront_session::config::Config;
use storefront_session::gateway::{self, AppState};
use storefront_session::session::registry::SessionRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let backend = HttpBackend::new(&config)?;
    let sessions = Arc::new(SessionRegistry::new(backend.clone(), config.refresh_period));
    let app = gateway::router(AppState {
        backend: Arc::new(backend),
        sessions,
    });

    tracing::info!(
        backend = %config.backend_origin,
        "storefront session service listening on 0.0.0.0:{}",
        config.port
    );
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
