use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Window load from the sample store failed. Fatal for an analysis run.
    #[error("Data source error: {0}")]
    DataSource(#[source] sqlx::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Analysis {trace_id} failed: {source}")]
    Analysis {
        trace_id: String,
        #[source]
        source: Box<AppError>,
    },

    /// Guardrail or schema violations in generated content.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Model backend unavailable or returned unusable output.
    #[error("Generation service unavailable: {0}")]
    Dependency(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// Stable machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_FAILED",
            AppError::Dependency(_) | AppError::Http(_) => "DEPENDENCY_UNAVAILABLE",
            AppError::Config(_) => "BAD_REQUEST",
            AppError::DataSource(_) => "DATA_SOURCE_UNAVAILABLE",
            AppError::Analysis { source, .. } => source.code(),
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn trace_id(&self) -> Option<&str> {
        match self {
            AppError::Analysis { trace_id, .. } => Some(trace_id),
            _ => None,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Dependency(_) | AppError::Http(_) | AppError::DataSource(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Config(_) => StatusCode::BAD_REQUEST,
            AppError::Analysis { source, .. } => source.status(),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "code": self.code(),
            "message": self.to_string(),
            "trace_id": self.trace_id(),
        });
        (self.status(), Json(body)).into_response()
    }
}

/// An API error that carries the request's trace id. Handlers that mint their own
/// trace id wrap failures in this so the id reaches the client.
pub struct TracedError {
    pub trace_id: String,
    pub error: AppError,
}

impl IntoResponse for TracedError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({
            "code": self.error.code(),
            "message": self.error.to_string(),
            "trace_id": self.error.trace_id().unwrap_or(&self.trace_id),
        });
        (self.error.status(), Json(body)).into_response()
    }
}
