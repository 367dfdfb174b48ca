use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{Dataset, QueryResponse};
use crate::services::llm_agent::LlmAgent;
use crate::services::post_processor::post_process;

/// Latest uploaded dataset per session, so follow-up queries skip re-upload.
#[derive(Clone)]
pub struct SessionStore {
    datasets: Cache<String, Arc<Dataset>>,
}

impl SessionStore {
    pub fn new(max_sessions: u64, ttl: Duration) -> Self {
        Self {
            datasets: Cache::builder()
                .max_capacity(max_sessions)
                .time_to_idle(ttl)
                .build(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_sessions, config.session_ttl)
    }

    /// Replaces whatever dataset the session held.
    pub fn store(&self, session_id: &str, dataset: Dataset) -> Arc<Dataset> {
        let dataset = Arc::new(dataset);
        tracing::info!("Caching {} rows for session {}", dataset.len(), session_id);
        self.datasets.insert(session_id.to_string(), dataset.clone());
        dataset
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<Dataset>> {
        self.datasets.get(session_id)
    }

    /// Answers `user_query` against the session's cached dataset.
    ///
    /// A failed analysis leaves the cached dataset in place.
    pub async fn query(
        &self,
        agent: &LlmAgent,
        session_id: &str,
        user_query: &str,
    ) -> Result<Option<QueryResponse>, AppError> {
        let dataset = self.get(session_id).ok_or(AppError::NoData)?;
        if user_query.trim().is_empty() {
            return Err(AppError::EmptyQuery);
        }

        let result = agent.analyze(&dataset, Some(user_query)).await?;
        Ok(post_process(&result).query_response)
    }
}
