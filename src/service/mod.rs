//! Application services wired once at startup and shared by the HTTP layer.

pub mod ledger;
pub mod portfolio;

pub use ledger::{LedgerError, LedgerService};
pub use portfolio::{HoldingsView, PortfolioService, RefreshSummary};

use crate::config::Config;
use crate::db::Repository;
use crate::marketdata::MarketDataProvider;
use std::sync::Arc;

/// Every service the handlers need. Built once in `main` and shared.
#[derive(Debug, Clone)]
pub struct Services {
    pub repo: Arc<Repository>,
    pub ledger: LedgerService,
    pub portfolios: PortfolioService,
}

impl Services {
    pub fn new(repo: Arc<Repository>, market: Arc<dyn MarketDataProvider>, config: &Config) -> Self {
        Self {
            ledger: LedgerService::new(Arc::clone(&repo)),
            portfolios: PortfolioService::new(
                Arc::clone(&repo),
                market,
                config.market_data_timeout,
                config.tax_rate,
            ),
            repo,
        }
    }
}
