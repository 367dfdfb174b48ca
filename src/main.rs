use anyhow::Result;
use std::sync::Arc;

use dashboard_services::{build_app, config, logging, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::load_config()?;
    let addr = config.bind_addr;

    // Build our application state
    let state = Arc::new(AppState::new(config));
    let app = build_app(state);

    // Run it
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
