pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod remote;
pub mod store;

use std::sync::Arc;

// Export API types
pub use api::handlers;
pub use api::routes;

pub use error::AppError;
pub use logic::{Aggregator, ConflictGuard, WriteCoordinator};

// Export all model types
pub use model::*;

pub use remote::{HttpRemote, Outcome, RemoteCollections, StubRemote};
pub use store::{MemoryStore, PostgresStore, Store};

/// Wire a store and a remote client into the full HTTP application.
pub fn build_app<S: Store>(
    store: Arc<S>,
    remote: Arc<dyn RemoteCollections>,
    max_concurrency: usize,
) -> axum::Router {
    let state = Arc::new(api::handlers::AppState::new(store, remote, max_concurrency));
    api::routes::create_router().with_state(state)
}

/// Bind the configured address and serve until the process stops.
pub async fn run_server(app: axum::Router, config: &config::AppConfig) -> anyhow::Result<()> {
    use axum::serve;
    use tokio::net::TcpListener;

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("clinic-mesh listening on http://{}", bind_address);

    serve(listener, app).await?;

    Ok(())
}
