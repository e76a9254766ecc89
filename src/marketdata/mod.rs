//! Market-data collaborator: quotes and dividend announcements by exchange.

use crate::domain::{Dividend, Exchange, Quote};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

pub mod mock;
pub mod moex;
pub mod router;

pub use mock::MockMarketData;
pub use moex::MoexProvider;
pub use router::ExchangeRouter;

/// Source of quotes and dividends for one or more exchanges.
///
/// Quotes are advisory: callers degrade gracefully when a provider fails.
#[async_trait]
pub trait MarketDataProvider: Send + Sync + fmt::Debug {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Exchanges this provider can quote.
    fn supported_exchanges(&self) -> Vec<Exchange>;

    /// Latest quote for one ticker.
    async fn get_quote(&self, ticker: &str, exchange: &Exchange) -> Result<Quote, MarketDataError>;

    /// Batch quotes keyed by ticker. Tickers the provider does not know are
    /// simply absent from the result.
    async fn get_quotes(
        &self,
        tickers: &[String],
        exchange: &Exchange,
    ) -> Result<HashMap<String, Quote>, MarketDataError>;

    /// Dividend announcements for a ticker, as reported by the provider.
    async fn get_dividends(
        &self,
        ticker: &str,
        exchange: &Exchange,
    ) -> Result<Vec<Dividend>, MarketDataError>;
}

/// Error type for market-data operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketDataError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// Non-success HTTP status
    HttpError { status: u16, message: String },
    /// Invalid JSON or unexpected response layout
    ParseError(String),
    RateLimited,
    /// The caller's deadline elapsed
    Timeout,
    /// No provider is registered for the exchange
    UnsupportedExchange(String),
    /// The provider returned no data for the ticker
    NotFound(String),
}

impl fmt::Display for MarketDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketDataError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            MarketDataError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            MarketDataError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            MarketDataError::RateLimited => write!(f, "Rate limited"),
            MarketDataError::Timeout => write!(f, "Market data request timed out"),
            MarketDataError::UnsupportedExchange(exchange) => {
                write!(f, "No market data provider for exchange {}", exchange)
            }
            MarketDataError::NotFound(ticker) => write!(f, "No market data for {}", ticker),
        }
    }
}

impl std::error::Error for MarketDataError {}
