//! Yanev Ski Shop storefront service

use std::sync::Arc;
use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use yanev_storefront::api::{HttpStoreApi, StoreApi};
use yanev_storefront::cart_store::{PgCartRepository, SessionCarts};
use yanev_storefront::config::StorefrontConfig;
use yanev_storefront::publisher::EventPublisher;
use yanev_storefront::server::{router, spawn_housekeeping, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = StorefrontConfig::from_env()?;

    let carts = match &config.database_url {
        Some(url) => {
            let db = PgPoolOptions::new().max_connections(10).connect(url).await?;
            sqlx::migrate!("./migrations").run(&db).await?;
            SessionCarts::new(Arc::new(PgCartRepository::new(db)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, carts are kept in memory");
            SessionCarts::in_memory()
        }
    };
    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(err) => {
                tracing::warn!(%err, "NATS unavailable, events will not be published");
                None
            }
        },
        None => None,
    };

    let api: Arc<dyn StoreApi> = Arc::new(HttpStoreApi::new(config.api_url.clone()));
    let port = config.port;
    tracing::info!(api_url = %config.api_url, tax_rate = %config.pricing.tax_rate, "configuration loaded");
    let state = AppState::new(config, api, Arc::new(carts), EventPublisher::new(nats));
    let shutdown = state.shutdown.clone();
    let housekeeping = spawn_housekeeping(&state);
    let app = router(state);

    tracing::info!("🚀 Yanev storefront listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
            shutdown.cancel();
        })
        .await?;
    housekeeping.await?;
    Ok(())
}
