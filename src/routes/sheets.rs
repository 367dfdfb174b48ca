use axum::{
    extract::{Multipart, State},
    routing::post,
    Router,
    Json,
    http::{HeaderValue, Method},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;
use crate::{
    AppState,
    error::AppError,
    models::{AnalysisResult, Dataset, QueryResponse, Row},
    services::{
        file_processor,
        normalizer::{normalize, normalize_json},
        post_processor::{chart_configs, post_process, ChartSpec},
    },
};
use tower_http::cors::{CorsLayer, Any};

/// Rows echoed back so the client can render a preview table.
const PREVIEW_ROWS: usize = 5;

const SESSION_HEADER: &str = "x-session-id";

pub fn routes() -> Router<Arc<AppState>> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/upload", post(upload_sheet))
        .route("/analyze", post(analyze_rows))
        .route("/query", post(query_session))
        .layer(cors)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    session_id: Option<String>,
    rows: Value,
    user_query: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    session_id: Option<String>,
    user_query: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    session_id: String,
    ai: AnalysisResult,
    charts: Vec<ChartSpec>,
    preview_rows: Vec<Row>,
    row_count: usize,
    uploaded_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    query_response: Option<QueryResponse>,
}

/// A failed upload or analysis. Once the dataset is cached the session id is
/// reported with the error, so the client can retry through `/query`.
pub struct AnalysisError {
    session_id: Option<String>,
    error: AppError,
}

impl From<AppError> for AnalysisError {
    fn from(error: AppError) -> Self {
        Self { session_id: None, error }
    }
}

impl IntoResponse for AnalysisError {
    fn into_response(self) -> Response {
        self.error.log();

        let mut body = self.error.body();
        if let Some(session_id) = &self.session_id {
            body["sessionId"] = json!(session_id);
        }

        let mut response = (self.error.status_code(), Json(body)).into_response();
        if let Some(value) = self
            .session_id
            .as_deref()
            .and_then(|id| HeaderValue::from_str(id).ok())
        {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
        response
    }
}

struct UploadForm {
    file: Option<(String, Bytes)>,
    user_query: Option<String>,
    session_id: Option<String>,
}

#[axum::debug_handler]
async fn upload_sheet(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<AnalysisResponse>, AnalysisError> {
    let start = std::time::Instant::now();
    let form = read_upload_form(multipart).await?;

    let (file_name, file_data) = form
        .file
        .ok_or_else(|| AppError::InvalidInput("No file uploaded.".to_string()))?;
    tracing::info!("Processing upload {} ({}KB)", file_name, file_data.len() / 1024);

    let extension = file_processor::file_extension(&file_name).ok_or_else(|| {
        AppError::UnsupportedType(format!("'{}' has no file extension", file_name))
    })?;
    let raw_rows = file_processor::decode(file_data, &extension)?;
    let dataset = normalize(&raw_rows);
    tracing::info!(
        "Decoded {} rows, {} kept after normalization, took {:?}",
        raw_rows.len(),
        dataset.len(),
        start.elapsed()
    );

    let response = analyze_dataset(&state, form.session_id, dataset, form.user_query).await?;
    tracing::info!("Upload processed in {:?}", start.elapsed());
    Ok(response)
}

async fn analyze_rows(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<AnalysisResponse>, AnalysisError> {
    let dataset = normalize_json(&request.rows)?;
    analyze_dataset(&state, request.session_id, dataset, request.user_query).await
}

async fn query_session(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResult>, AppError> {
    let session_id = request.session_id.unwrap_or_default();
    let user_query = request.user_query.unwrap_or_default();
    tracing::info!("Query for session {}", session_id);

    let query_response = state
        .sessions
        .query(&state.agent, &session_id, &user_query)
        .await?;

    Ok(Json(QueryResult { query_response }))
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm {
        file: None,
        user_query: None,
        session_id: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Failed to read uploaded file: {}", e)))?;
                form.file = Some((file_name, data));
            }
            "userQuery" | "sessionId" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Failed to read field {}: {}", name, e)))?;
                let text = Some(text).filter(|t| !t.trim().is_empty());
                if name == "userQuery" {
                    form.user_query = text;
                } else {
                    form.session_id = text;
                }
            }
            other => tracing::debug!("Ignoring multipart field {}", other),
        }
    }

    Ok(form)
}

// The dataset is cached before the model is called; a failed analysis reports
// the session id so the upload can be queried again.
async fn analyze_dataset(
    state: &AppState,
    session_id: Option<String>,
    dataset: Dataset,
    user_query: Option<String>,
) -> Result<Json<AnalysisResponse>, AnalysisError> {
    let session_id = session_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let dataset = state.sessions.store(&session_id, dataset);

    let ai = match state.agent.analyze(&dataset, user_query.as_deref()).await {
        Ok(result) => post_process(&result),
        Err(e) if state.config.fallback_on_error => {
            tracing::warn!("Analysis failed, returning fallback result: {}", e);
            AnalysisResult::fallback(&e)
        }
        Err(error) => {
            return Err(AnalysisError {
                session_id: Some(session_id),
                error,
            })
        }
    };
    let charts = chart_configs(&ai.visualization_recommendations);

    Ok(Json(AnalysisResponse {
        session_id,
        ai,
        charts,
        preview_rows: dataset.sample(PREVIEW_ROWS).to_vec(),
        row_count: dataset.len(),
        uploaded_at: chrono::Utc::now().to_rfc3339(),
    }))
}
