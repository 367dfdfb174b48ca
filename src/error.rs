use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
};
use serde_json::json;
use axum::Json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("File processing error: {0}")]
    FileProcessing(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No response received from the LLM endpoint: {0}")]
    Transport(String),

    #[error("LLM provider error: {status} - {body}")]
    Provider { status: u16, body: String },

    #[error("Failed to parse LLM response: {message}")]
    Parse { message: String, raw: String },

    #[error("No data uploaded yet. Please upload a file first.")]
    NoData,

    #[error("No user query provided.")]
    EmptyQuery,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn parse(message: impl Into<String>, raw: impl Into<String>) -> Self {
        AppError::Parse {
            message: message.into(),
            raw: raw.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_)
            | AppError::UnsupportedType(_)
            | AppError::NoData
            | AppError::EmptyQuery => StatusCode::BAD_REQUEST,
            AppError::FileProcessing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Configuration(_) | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Provider { .. } | AppError::Parse { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// JSON body sent to clients; diagnostics ride along for upstream failures.
    pub fn body(&self) -> serde_json::Value {
        match self {
            AppError::Provider { status: upstream, body } => json!({
                "error": self.to_string(),
                "status": upstream,
                "body": body,
            }),
            AppError::Parse { raw, .. } => json!({
                "error": self.to_string(),
                "raw": raw,
            }),
            _ => json!({ "error": self.to_string() }),
        }
    }

    pub fn log(&self) {
        if self.status_code().is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        (self.status_code(), Json(self.body())).into_response()
    }
}
