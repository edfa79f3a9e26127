use anyhow::Result;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use attendance::{AppState, routes, session::SessionManager};
use common::store::{GithubStore, RemoteStore, StoreConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("Starting attendance service");

    let store_config = StoreConfig::from_env()?;
    let data_store = Arc::new(GithubStore::data(&store_config)?);
    let archive_store = Arc::new(GithubStore::archive(&store_config)?);

    // Check store connectivity
    if data_store.health_check().await? {
        info!("Data repository reachable");
    } else {
        anyhow::bail!("Failed to reach data repository");
    }

    let manager = SessionManager::new(data_store.clone(), archive_store);

    info!("Attendance service initialized successfully");

    let app_state = AppState {
        manager,
        store: data_store,
    };

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!("Attendance service listening on 0.0.0.0:3000");

    axum::serve(listener, app).await?;

    Ok(())
}
