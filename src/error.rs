use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::types::Provider;

#[derive(Debug, Error)]
pub enum AppError {
    /// Retryable; may trigger the stale-cache fallback once retries are spent.
    #[error("{provider} rate limited: {message}")]
    RateLimited { provider: Provider, message: String },

    /// Terminal: the daily budget is gone, retrying cannot help.
    #[error("{provider} quota exceeded: {message}")]
    QuotaExceeded { provider: Provider, message: String },

    /// Terminal: credential or API enablement problem.
    #[error("{provider} auth rejected: {message}")]
    Auth { provider: Provider, message: String },

    /// Network or 5xx failure that survived the retry budget.
    #[error("{provider} transient failure: {message}")]
    Transient { provider: Provider, message: String },

    /// Response shape the tolerant parsers could not make sense of.
    #[error("{provider} unexpected response: {message}")]
    Malformed { provider: Provider, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// True for the error classes that may be satisfied by stale cached data:
    /// rate limiting and quota exhaustion. Everything else must surface.
    pub fn is_rate_limit_class(&self) -> bool {
        matches!(
            self,
            AppError::RateLimited { .. } | AppError::QuotaExceeded { .. }
        )
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::RateLimited { .. } | AppError::QuotaExceeded { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::Transient { .. } | AppError::Malformed { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = axum::Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
