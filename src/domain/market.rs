//! Market quotes and dividend announcements supplied by market-data providers.

use crate::domain::{Decimal, Exchange, SecurityId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Latest trading figures for one ticker on one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub exchange: Exchange,
    pub last_price: Decimal,
    pub change: Decimal,
    pub change_percent: Decimal,
    pub volume: i64,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn new(ticker: impl Into<String>, exchange: Exchange, last_price: Decimal) -> Self {
        Self {
            ticker: ticker.into(),
            exchange,
            last_price,
            change: Decimal::zero(),
            change_percent: Decimal::zero(),
            volume: 0,
            timestamp: Utc::now(),
        }
    }

    /// Key under which batch results are merged.
    pub fn key(&self) -> QuoteKey {
        (self.exchange.clone(), self.ticker.clone())
    }
}

/// `(exchange, ticker)`; tickers are only unique within an exchange.
pub type QuoteKey = (Exchange, String);

/// A dividend announcement for a security.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dividend {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_id: Option<SecurityId>,
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ex_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<NaiveDate>,
    /// Payment per share.
    pub amount: Decimal,
    pub currency: String,
}
