use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, Router};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

use services::{llm_agent::LlmAgent, session_store::SessionStore};

// Room for multipart boundaries and the small text fields next to the file.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub sessions: SessionStore,
    pub agent: LlmAgent,
}

impl AppState {
    pub fn new(config: config::Config) -> Self {
        Self {
            sessions: SessionStore::from_config(&config),
            agent: LlmAgent::new(&config),
            config,
        }
    }
}

pub fn build_app(state: Arc<AppState>) -> Router {
    let body_limit = state.config.max_file_size + MULTIPART_OVERHEAD;

    Router::new()
        .merge(routes::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
