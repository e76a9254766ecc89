use axum::extract::{Path, State};
use axum::Json;

use super::AppState;
use crate::domain::{Exchange, Quote};
use crate::error::AppError;

pub async fn get_quote(
    Path((exchange, ticker)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<Quote>, AppError> {
    let ticker = ticker.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(AppError::BadRequest("ticker must not be empty".to_string()));
    }
    let quote = state
        .services
        .portfolios
        .quote(&Exchange::new(exchange), &ticker)
        .await?;
    Ok(Json(quote))
}
