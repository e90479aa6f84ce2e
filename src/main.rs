mod config;
mod db;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use frames::{MemoryStore, ShapeStore};

use crate::services::access::{AllowAll, EditPolicy, Role, RoleTable};
use crate::services::persistence::PgShapeStore;

#[tokio::main]
async fn main() {
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!(error = %e, ".env not loaded");
    }
    tracing_subscriber::fmt::init();

    let config = config::Config::from_env();

    let store: Arc<dyn ShapeStore> = match &config.database_url {
        Some(url) => {
            let pool = db::init_pool(url, config.db_max_connections)
                .await
                .expect("database init failed");
            Arc::new(PgShapeStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; board shapes are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let policy: Arc<dyn EditPolicy> = match &config.board_roles {
        Some(entries) => {
            let table = RoleTable::parse(entries, Role::Editor).expect("invalid BOARD_ROLES");
            if table.is_empty() {
                tracing::warn!("BOARD_ROLES has no entries; every user may edit");
            }
            tracing::info!(entries = table.len(), "board role table loaded");
            Arc::new(table)
        }
        None => Arc::new(AllowAll),
    };

    let port = config.port;
    let state = state::AppState::new(config, store, policy);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "inkroom relay listening");
    axum::serve(listener, app).await.expect("server failed");
}
