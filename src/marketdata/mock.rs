//! In-memory market data for tests and offline runs.

use super::{MarketDataError, MarketDataProvider};
use crate::domain::{Dividend, Exchange, Quote, QuoteKey};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

/// Mock provider returning predefined quotes and dividends.
///
/// Exchanges marked failing answer every call with a network error; a delay
/// makes every call sleep first, which lets callers exercise their timeouts.
#[derive(Debug, Clone)]
pub struct MockMarketData {
    exchanges: Vec<Exchange>,
    quotes: HashMap<QuoteKey, Quote>,
    dividends: HashMap<QuoteKey, Vec<Dividend>>,
    failing: HashSet<Exchange>,
    delay: Option<Duration>,
}

impl MockMarketData {
    /// A mock serving MOEX and SPB with no data.
    pub fn new() -> Self {
        Self {
            exchanges: vec![Exchange::moex(), Exchange::new(Exchange::SPB)],
            quotes: HashMap::new(),
            dividends: HashMap::new(),
            failing: HashSet::new(),
            delay: None,
        }
    }

    /// Replace the supported exchanges.
    pub fn with_exchanges(mut self, exchanges: Vec<Exchange>) -> Self {
        self.exchanges = exchanges;
        self
    }

    pub fn with_quote(mut self, quote: Quote) -> Self {
        self.quotes.insert(quote.key(), quote);
        self
    }

    pub fn with_dividend(mut self, exchange: Exchange, dividend: Dividend) -> Self {
        self.dividends
            .entry((exchange, dividend.ticker.clone()))
            .or_default()
            .push(dividend);
        self
    }

    /// Make every call for `exchange` fail.
    pub fn with_failing_exchange(mut self, exchange: Exchange) -> Self {
        self.failing.insert(exchange);
        self
    }

    /// Sleep for `delay` before answering any call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn check(&self, exchange: &Exchange) -> Result<(), MarketDataError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(exchange) {
            return Err(MarketDataError::NetworkError(format!(
                "{} unavailable",
                exchange
            )));
        }
        Ok(())
    }
}

impl Default for MockMarketData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for MockMarketData {
    fn name(&self) -> &str {
        "mock"
    }

    fn supported_exchanges(&self) -> Vec<Exchange> {
        self.exchanges.clone()
    }

    async fn get_quote(&self, ticker: &str, exchange: &Exchange) -> Result<Quote, MarketDataError> {
        self.check(exchange).await?;
        self.quotes
            .get(&(exchange.clone(), ticker.to_string()))
            .cloned()
            .ok_or_else(|| MarketDataError::NotFound(ticker.to_string()))
    }

    async fn get_quotes(
        &self,
        tickers: &[String],
        exchange: &Exchange,
    ) -> Result<HashMap<String, Quote>, MarketDataError> {
        self.check(exchange).await?;
        Ok(tickers
            .iter()
            .filter_map(|ticker| {
                self.quotes
                    .get(&(exchange.clone(), ticker.clone()))
                    .map(|q| (ticker.clone(), q.clone()))
            })
            .collect())
    }

    async fn get_dividends(
        &self,
        ticker: &str,
        exchange: &Exchange,
    ) -> Result<Vec<Dividend>, MarketDataError> {
        self.check(exchange).await?;
        Ok(self
            .dividends
            .get(&(exchange.clone(), ticker.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
