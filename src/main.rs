use std::sync::Arc;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use storefront_api::config::{config, StoreBackend};
use storefront_api::database::{DatabaseManager, MemoryStore, PgStore, Store, Table};
use storefront_api::events::{EventHub, NotifyingStore};
use storefront_api::{app, is_production, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SECURITY_JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config();
    tracing::info!("Starting Storefront API in {:?} mode", config.environment);

    if is_production!() && config.security.jwt_secret.is_empty() {
        bail!("SECURITY_JWT_SECRET must be set in production");
    }

    let events = EventHub::new(config.api.event_buffer);
    let store: Arc<dyn Store> = match config.database.backend {
        StoreBackend::Postgres => {
            let pool = DatabaseManager::connect(&config.database).context("failed to configure database pool")?;
            let inner = PgStore::new(pool, config.database.enable_query_logging);
            Arc::new(NotifyingStore::new(inner, events.clone()))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            Arc::new(NotifyingStore::new(MemoryStore::new().with_demo_data(), events.clone()))
        }
    };

    // Held for the life of the server; dropping it stops the listener
    let _new_orders = events.on_insert(
        Table::Orders,
        |_| true,
        |event| {
            let id = event.row.get("id").map(|v| v.to_string()).unwrap_or_default();
            tracing::info!(order_id = %id, "new order placed");
        },
    );

    let state = AppState::new(store, events, config.clone());
    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Storefront API listening on http://{}", bind_addr);
    axum::serve(listener, app(state)).await.context("server error")?;
    Ok(())
}
