pub mod health;
pub mod portfolios;
pub mod quotes;
pub mod transactions;

use crate::service::Services;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<Services>,
}

impl AppState {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route(
            "/investments/transactions",
            post(transactions::create_transaction),
        )
        .route(
            "/investments/transactions/:id",
            delete(transactions::delete_transaction),
        )
        .route(
            "/portfolios/:id/holdings",
            get(portfolios::get_holdings),
        )
        .route(
            "/portfolios/:id/holdings/:security_id",
            get(portfolios::get_holding),
        )
        .route("/portfolios/:id/analytics", get(portfolios::get_analytics))
        .route("/portfolios/:id/tax-report", get(portfolios::get_tax_report))
        .route(
            "/portfolios/:id/transactions",
            get(portfolios::get_transactions),
        )
        .route("/portfolios/:id/dividends", get(portfolios::get_dividends))
        .route(
            "/portfolios/:id/refresh-prices",
            post(portfolios::refresh_prices),
        )
        .route("/quotes/:exchange/:ticker", get(quotes::get_quote))
        .layer(cors)
        .with_state(state)
}
