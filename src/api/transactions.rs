use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::AppState;
use crate::domain::{InvestmentTransaction, NewTransaction, TransactionId};
use crate::error::AppError;

pub async fn create_transaction(
    State(state): State<AppState>,
    Json(body): Json<NewTransaction>,
) -> Result<(StatusCode, Json<InvestmentTransaction>), AppError> {
    let tx = state.services.ledger.add_transaction(body).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

/// Deletes the transaction, reverts its holding effect and returns the row.
pub async fn delete_transaction(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<InvestmentTransaction>, AppError> {
    let id = parse_id::<TransactionId>(&id, "transaction id")?;
    let tx = state.services.ledger.delete_transaction(id).await?;
    Ok(Json(tx))
}

pub(crate) fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, AppError> {
    raw.parse::<T>()
        .map_err(|_| AppError::BadRequest(format!("Invalid {}: {}", what, raw)))
}
