use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use super::transactions::parse_id;
use super::AppState;
use crate::domain::{Dividend, EnrichedHolding, InvestmentTransaction, PortfolioId, SecurityId};
use crate::engine::{PortfolioAnalytics, TaxReport};
use crate::error::AppError;
use crate::service::portfolio::current_year;
use crate::service::{HoldingsView, RefreshSummary};

const DEFAULT_PAGE_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct TaxReportQuery {
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

pub async fn get_holdings(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<HoldingsView>, AppError> {
    let portfolio_id = parse_id::<PortfolioId>(&id, "portfolio id")?;
    let view = state.services.portfolios.holdings(portfolio_id).await?;
    Ok(Json(view))
}

pub async fn get_holding(
    Path((id, security_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<EnrichedHolding>, AppError> {
    let portfolio_id = parse_id::<PortfolioId>(&id, "portfolio id")?;
    let security_id = parse_id::<SecurityId>(&security_id, "security id")?;
    let holding = state
        .services
        .portfolios
        .holding(portfolio_id, security_id)
        .await?;
    Ok(Json(holding))
}

pub async fn get_analytics(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<PortfolioAnalytics>, AppError> {
    let portfolio_id = parse_id::<PortfolioId>(&id, "portfolio id")?;
    let analytics = state.services.portfolios.analytics(portfolio_id).await?;
    Ok(Json(analytics))
}

pub async fn get_tax_report(
    Path(id): Path<String>,
    Query(params): Query<TaxReportQuery>,
    State(state): State<AppState>,
) -> Result<Json<TaxReport>, AppError> {
    let portfolio_id = parse_id::<PortfolioId>(&id, "portfolio id")?;
    let year = params.year.unwrap_or_else(current_year);
    let report = state
        .services
        .portfolios
        .tax_report(portfolio_id, year)
        .await?;
    Ok(Json(report))
}

pub async fn get_transactions(
    Path(id): Path<String>,
    Query(params): Query<PageQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<InvestmentTransaction>>, AppError> {
    let portfolio_id = parse_id::<PortfolioId>(&id, "portfolio id")?;
    let transactions = state
        .services
        .portfolios
        .transactions(
            portfolio_id,
            params.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
            params.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(transactions))
}

pub async fn get_dividends(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Dividend>>, AppError> {
    let portfolio_id = parse_id::<PortfolioId>(&id, "portfolio id")?;
    let dividends = state
        .services
        .portfolios
        .upcoming_dividends(portfolio_id)
        .await?;
    Ok(Json(dividends))
}

pub async fn refresh_prices(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<RefreshSummary>, AppError> {
    let portfolio_id = parse_id::<PortfolioId>(&id, "portfolio id")?;
    let summary = state.services.portfolios.refresh_prices(portfolio_id).await?;
    Ok(Json(summary))
}
