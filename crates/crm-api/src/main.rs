//! CRM REST API server.

use crm_api::config::ApiConfig;
use crm_api::server::{self, AppState};
use crm_service::Crm;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ApiConfig::from_env()?;
    let stores = config.build_stores()?;
    tracing::info!(
        store = ?config.store,
        activity_log = ?config.activity_log,
        "stores ready"
    );

    let state = Arc::new(AppState::new(Crm::new(stores)));
    let app = server::router(state);
    tracing::info!("CRM API listening on {}", config.listen);
    axum::serve(
        tokio::net::TcpListener::bind(config.listen).await?,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
