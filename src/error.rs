use crate::marketdata::MarketDataError;
use crate::service::LedgerError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientShares { .. } | LedgerError::InvalidInput(_) => {
                AppError::BadRequest(err.to_string())
            }
            LedgerError::SecurityNotFound(_)
            | LedgerError::PortfolioNotFound(_)
            | LedgerError::TransactionNotFound(_)
            | LedgerError::HoldingNotFound { .. } => AppError::NotFound(err.to_string()),
            LedgerError::Db(e) => AppError::from(e),
        }
    }
}

impl From<MarketDataError> for AppError {
    fn from(err: MarketDataError) -> Self {
        match err {
            MarketDataError::NotFound(_) => AppError::NotFound(err.to_string()),
            MarketDataError::UnsupportedExchange(_) => AppError::BadRequest(err.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
