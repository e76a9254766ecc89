//! The read path: holdings enriched with market data, analytics and the tax
//! report, plus price refresh and dividend lookups.
//!
//! Market data is advisory. An exchange group that fails or times out is
//! logged and skipped; reads never fail because a provider did.

use super::ledger::LedgerError;
use crate::db::Repository;
use crate::domain::{
    Decimal, Dividend, EnrichedHolding, Exchange, InvestmentTransaction, PortfolioId, Quote,
    QuoteKey, SecurityId, TransactionType,
};
use crate::engine::{analytics, enrichment, tax, PortfolioAnalytics, PortfolioSummary, TaxReport};
use crate::marketdata::{MarketDataError, MarketDataProvider};
use chrono::{Datelike, Months, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Enriched holdings of one portfolio with their totals.
#[derive(Debug, Clone, Serialize)]
pub struct HoldingsView {
    pub portfolio_id: PortfolioId,
    pub summary: PortfolioSummary,
    pub holdings: Vec<EnrichedHolding>,
}

/// Outcome of a price refresh.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub portfolio_id: PortfolioId,
    /// Securities whose stored price was updated.
    pub updated: usize,
    /// Exchanges whose quote request failed or timed out.
    pub failed_exchanges: Vec<Exchange>,
}

#[derive(Debug, Default)]
struct QuoteBatch {
    quotes: BTreeMap<QuoteKey, Quote>,
    failed: Vec<Exchange>,
}

#[derive(Debug, Clone)]
pub struct PortfolioService {
    repo: Arc<Repository>,
    market: Arc<dyn MarketDataProvider>,
    quote_timeout: Duration,
    tax_rate: Decimal,
}

impl PortfolioService {
    pub fn new(
        repo: Arc<Repository>,
        market: Arc<dyn MarketDataProvider>,
        quote_timeout: Duration,
        tax_rate: Decimal,
    ) -> Self {
        Self {
            repo,
            market,
            quote_timeout,
            tax_rate,
        }
    }

    /// # Errors
    /// `PortfolioNotFound` for an unknown portfolio; `Db` when storage fails.
    pub async fn holdings(&self, portfolio_id: PortfolioId) -> Result<HoldingsView, LedgerError> {
        self.ensure_portfolio(portfolio_id).await?;
        let holdings = self.enriched_holdings(portfolio_id).await?;
        Ok(HoldingsView {
            portfolio_id,
            summary: enrichment::summarize(&holdings),
            holdings,
        })
    }

    /// One enriched holding. Weight is relative to the whole portfolio.
    ///
    /// # Errors
    /// `HoldingNotFound` when the portfolio does not hold the security.
    pub async fn holding(
        &self,
        portfolio_id: PortfolioId,
        security_id: SecurityId,
    ) -> Result<EnrichedHolding, LedgerError> {
        self.ensure_portfolio(portfolio_id).await?;
        self.enriched_holdings(portfolio_id)
            .await?
            .into_iter()
            .find(|h| h.holding.security_id == security_id)
            .ok_or(LedgerError::HoldingNotFound {
                portfolio_id,
                security_id,
            })
    }

    /// # Errors
    /// `PortfolioNotFound` for an unknown portfolio; `Db` when storage fails.
    pub async fn analytics(
        &self,
        portfolio_id: PortfolioId,
    ) -> Result<PortfolioAnalytics, LedgerError> {
        self.ensure_portfolio(portfolio_id).await?;
        let holdings = self.enriched_holdings(portfolio_id).await?;

        let today = Utc::now().date_naive();
        let year_ago = today.checked_sub_months(Months::new(12)).unwrap_or(today);
        let trailing_dividends = self
            .repo
            .sum_amounts_between(portfolio_id, TransactionType::Dividend, year_ago, today)
            .await?;

        Ok(analytics::compute(portfolio_id, &holdings, trailing_dividends))
    }

    /// Income and realized gains for a calendar year.
    ///
    /// # Errors
    /// `InvalidInput` for a year chrono cannot represent; `PortfolioNotFound`
    /// or `Db` otherwise.
    pub async fn tax_report(
        &self,
        portfolio_id: PortfolioId,
        year: i32,
    ) -> Result<TaxReport, LedgerError> {
        let (start, end) = tax::year_bounds(year)
            .ok_or_else(|| LedgerError::InvalidInput(format!("year {year} is out of range")))?;
        self.ensure_portfolio(portfolio_id).await?;

        let transactions = self.repo.transactions_between(portfolio_id, start, end).await?;
        let average_prices: HashMap<SecurityId, Decimal> = self
            .repo
            .get_holdings(portfolio_id)
            .await?
            .into_iter()
            .map(|(h, _)| (h.security_id, h.average_price))
            .collect();

        Ok(tax::build_report(
            portfolio_id,
            year,
            transactions,
            &average_prices,
            self.tax_rate,
        ))
    }

    /// Newest first.
    ///
    /// # Errors
    /// `InvalidInput` for a negative limit or offset; `PortfolioNotFound` or
    /// `Db` otherwise.
    pub async fn transactions(
        &self,
        portfolio_id: PortfolioId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InvestmentTransaction>, LedgerError> {
        if limit < 0 || offset < 0 {
            return Err(LedgerError::InvalidInput(
                "limit and offset must not be negative".to_string(),
            ));
        }
        self.ensure_portfolio(portfolio_id).await?;
        Ok(self
            .repo
            .list_transactions(portfolio_id, limit, offset)
            .await?)
    }

    /// Fetch quotes for every held security and store them on the securities.
    ///
    /// # Errors
    /// `PortfolioNotFound` or `Db`; provider failures are reported in the
    /// summary instead.
    pub async fn refresh_prices(
        &self,
        portfolio_id: PortfolioId,
    ) -> Result<RefreshSummary, LedgerError> {
        self.ensure_portfolio(portfolio_id).await?;
        let securities: Vec<_> = self
            .repo
            .get_holdings(portfolio_id)
            .await?
            .into_iter()
            .filter_map(|(_, security)| security)
            .collect();

        let batch = self
            .fetch_quotes(enrichment::group_by_exchange(&securities))
            .await;

        let mut updated = 0;
        for security in &securities {
            let key = (security.exchange.clone(), security.ticker.clone());
            if let Some(quote) = batch.quotes.get(&key) {
                self.repo.update_security_price(security.id, quote).await?;
                updated += 1;
            }
        }

        info!(
            portfolio_id = %portfolio_id,
            updated,
            failed_exchanges = batch.failed.len(),
            "Prices refreshed"
        );
        Ok(RefreshSummary {
            portfolio_id,
            updated,
            failed_exchanges: batch.failed,
        })
    }

    /// Provider dividends for every held security. Securities whose lookup
    /// fails are skipped.
    ///
    /// # Errors
    /// `PortfolioNotFound` or `Db`.
    pub async fn upcoming_dividends(
        &self,
        portfolio_id: PortfolioId,
    ) -> Result<Vec<Dividend>, LedgerError> {
        self.ensure_portfolio(portfolio_id).await?;
        let securities = self
            .repo
            .get_holdings(portfolio_id)
            .await?
            .into_iter()
            .filter(|(h, _)| h.quantity.is_positive())
            .filter_map(|(_, security)| security);

        let lookups = securities.map(|security| {
            let market = Arc::clone(&self.market);
            let timeout = self.quote_timeout;
            async move {
                let result = bounded(
                    timeout,
                    market.get_dividends(&security.ticker, &security.exchange),
                )
                .await;
                (security, result)
            }
        });

        let mut dividends = Vec::new();
        for (security, result) in join_all(lookups).await {
            match result {
                Ok(found) => dividends.extend(found.into_iter().map(|d| Dividend {
                    security_id: Some(security.id),
                    ..d
                })),
                Err(e) => warn!(
                    ticker = %security.ticker,
                    exchange = %security.exchange,
                    error = %e,
                    "Dividend lookup failed, skipping"
                ),
            }
        }
        Ok(dividends)
    }

    /// Pass-through quote lookup, bounded by the quote timeout.
    ///
    /// # Errors
    /// Whatever the provider reports, or `Timeout`.
    pub async fn quote(&self, exchange: &Exchange, ticker: &str) -> Result<Quote, MarketDataError> {
        bounded(self.quote_timeout, self.market.get_quote(ticker, exchange)).await
    }

    async fn ensure_portfolio(&self, portfolio_id: PortfolioId) -> Result<(), LedgerError> {
        match self.repo.get_portfolio(portfolio_id).await? {
            Some(_) => Ok(()),
            None => Err(LedgerError::PortfolioNotFound(portfolio_id)),
        }
    }

    async fn enriched_holdings(
        &self,
        portfolio_id: PortfolioId,
    ) -> Result<Vec<EnrichedHolding>, LedgerError> {
        let rows = self.repo.get_holdings(portfolio_id).await?;
        let groups = enrichment::group_by_exchange(rows.iter().filter_map(|(_, s)| s.as_ref()));
        let batch = self.fetch_quotes(groups).await;
        Ok(enrichment::enrich(rows, &batch.quotes))
    }

    /// Quote every exchange group concurrently, each under its own timeout.
    async fn fetch_quotes(&self, groups: BTreeMap<Exchange, Vec<String>>) -> QuoteBatch {
        let fetches = groups.into_iter().map(|(exchange, tickers)| {
            let market = Arc::clone(&self.market);
            let timeout = self.quote_timeout;
            async move {
                debug!(exchange = %exchange, tickers = tickers.len(), "Fetching quotes");
                let result = bounded(timeout, market.get_quotes(&tickers, &exchange)).await;
                (exchange, result)
            }
        });

        let mut batch = QuoteBatch::default();
        for (exchange, result) in join_all(fetches).await {
            match result {
                Ok(quotes) => {
                    for (ticker, quote) in quotes {
                        batch.quotes.insert((exchange.clone(), ticker), quote);
                    }
                }
                Err(e) => {
                    warn!(exchange = %exchange, error = %e, "Quote fetch failed, holdings left unpriced");
                    batch.failed.push(exchange);
                }
            }
        }
        batch
    }
}

async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T, MarketDataError>
where
    F: std::future::Future<Output = Result<T, MarketDataError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .unwrap_or(Err(MarketDataError::Timeout))
}

/// Year used when a tax report request names none.
pub fn current_year() -> i32 {
    Utc::now().year()
}
