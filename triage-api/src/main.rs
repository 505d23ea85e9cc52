use std::net::SocketAddr;
use std::sync::Arc;
use triage_api::{app, AppState};
use triage_core::OrderStore;
use triage_store::app_config::{Config, StoreBackend};
use triage_store::{DbClient, MemoryOrderStore, PgOrderStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn OrderStore>> {
    match config.store.backend {
        StoreBackend::Postgres => {
            let db = DbClient::new(&config.database).await?;
            db.migrate().await?;
            Ok(Arc::new(PgOrderStore::new(db.pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory order store; decisions are lost on restart");
            Ok(Arc::new(MemoryOrderStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triage_api=debug,triage_order=debug,triage_store=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting Triage API on port {} ({:?} store)", config.server.port, config.store.backend);

    let store = connect_store(&config).await?;
    let app = app(AppState::new(store));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
