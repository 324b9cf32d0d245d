use std::sync::Arc;
use tracing::info;

use fruitslot_server::{db, init_tracing, router, AppState, ServerConfig, SqliteStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");
    let config = ServerConfig::from_env();

    let pool = db::connect(&config.database_url).await?;
    let params = db::init_db(&pool).await?;
    info!(hash = %params.server_seed_hash, wager = params.engine.wager_cost, "game params loaded");

    let state = AppState::new(Arc::new(SqliteStore::new(pool.clone())), params, config.api_key)
        .with_params_db(pool);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("listening on {}", config.bind);
    axum::serve(listener, app).await?;
    Ok(())
}
