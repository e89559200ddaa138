use clinic_mesh::config::AppConfig;
use clinic_mesh::remote::{HttpRemote, RemoteCollections};
use clinic_mesh::store::{MemoryStore, PostgresStore};
use clinic_mesh::{build_app, run_server};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    // Info by default, sqlx kept quiet; RUST_LOG overrides both
    use env_logger::Builder;
    use log::LevelFilter;

    Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("sqlx", LevelFilter::Warn)
        .parse_default_env()
        .init();

    let config = AppConfig::load()?;
    log::info!(
        "Configuration loaded: server={}:{}, {} remote collection(s)",
        config.server.host,
        config.server.port,
        config.remote.collections.len()
    );

    let remote: Arc<dyn RemoteCollections> = Arc::new(HttpRemote::new(&config.remote)?);
    let max_concurrency = config.remote.max_concurrency;

    let app = match config.database_url() {
        Some(database_url) => {
            log::info!("Connecting to PostgreSQL...");
            let max_connections = config.database.max_connections.unwrap_or(20);
            let store = PostgresStore::new(&database_url, max_connections).await?;
            store.migrate().await?;
            log::info!("Record store ready");
            build_app(Arc::new(store), remote, max_concurrency)
        }
        None => {
            log::warn!("No database configured; records are kept in memory only");
            build_app(Arc::new(MemoryStore::new()), remote, max_concurrency)
        }
    };

    run_server(app, &config).await
}
