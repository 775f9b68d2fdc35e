//! Paysync API Server
//!
//! Receives Stripe webhooks, reconciles them into the record store, and
//! exposes the outbound billing operations.

use std::net::SocketAddr;
use std::sync::Arc;

use paysync_api::{create_router, AppState, Config};
use paysync_billing::{MemoryRecordStore, PgRecordStore, RecordStore, TimedStore};
use paysync_shared::{create_pool, run_migrations};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,paysync_api=debug,paysync_billing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Paysync API Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        bind_address = %config.bind_address,
        signature_header = %config.signature_header,
        store_timeout_ms = config.store_timeout.as_millis() as u64,
        "Configuration loaded"
    );

    let store: Arc<dyn RecordStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let pool = create_pool(url).await?;
            tracing::info!("Database connection established");

            if config.run_migrations {
                tracing::info!("Running database migrations...");
                run_migrations(&pool).await?;
            } else {
                tracing::info!("Database migrations skipped (RUN_MIGRATIONS=false)");
            }

            Arc::new(TimedStore::new(PgRecordStore::new(pool), config.store_timeout))
        }
        None => {
            tracing::warn!("DATABASE_URL not set - using in-memory record store, data will not survive a restart");
            Arc::new(TimedStore::new(MemoryRecordStore::new(), config.store_timeout))
        }
    };

    // Create application state
    let state = AppState::new(config.clone(), store);

    // Build the router
    let app = create_router(state).layer(TraceLayer::new_for_http());

    // Parse bind address
    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Starting server on {}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
