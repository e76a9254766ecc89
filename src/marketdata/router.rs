//! Routes market-data calls to the provider registered for each exchange.

use super::{MarketDataError, MarketDataProvider};
use crate::domain::{Dividend, Exchange, Quote};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Dispatches by exchange. The last provider registered for an exchange wins.
#[derive(Debug, Clone, Default)]
pub struct ExchangeRouter {
    providers: BTreeMap<Exchange, Arc<dyn MarketDataProvider>>,
}

impl ExchangeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for every exchange it reports as supported.
    pub fn with_provider(mut self, provider: Arc<dyn MarketDataProvider>) -> Self {
        for exchange in provider.supported_exchanges() {
            self.providers.insert(exchange, Arc::clone(&provider));
        }
        self
    }

    fn provider_for(&self, exchange: &Exchange) -> Result<&Arc<dyn MarketDataProvider>, MarketDataError> {
        self.providers
            .get(exchange)
            .ok_or_else(|| MarketDataError::UnsupportedExchange(exchange.to_string()))
    }
}

#[async_trait]
impl MarketDataProvider for ExchangeRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn supported_exchanges(&self) -> Vec<Exchange> {
        self.providers.keys().cloned().collect()
    }

    async fn get_quote(&self, ticker: &str, exchange: &Exchange) -> Result<Quote, MarketDataError> {
        self.provider_for(exchange)?.get_quote(ticker, exchange).await
    }

    async fn get_quotes(
        &self,
        tickers: &[String],
        exchange: &Exchange,
    ) -> Result<HashMap<String, Quote>, MarketDataError> {
        self.provider_for(exchange)?.get_quotes(tickers, exchange).await
    }

    async fn get_dividends(
        &self,
        ticker: &str,
        exchange: &Exchange,
    ) -> Result<Vec<Dividend>, MarketDataError> {
        self.provider_for(exchange)?
            .get_dividends(ticker, exchange)
            .await
    }
}
