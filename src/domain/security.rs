//! Securities and portfolios: read-mostly reference data owned by the CRUD layers.

use crate::domain::{Decimal, Exchange, PortfolioId, SecurityId, SecurityType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tradable instrument. Identity is `(ticker, exchange)`; price fields are
/// refreshed from the market-data collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Security {
    pub id: SecurityId,
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isin: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub security_type: SecurityType,
    pub exchange: Exchange,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<String>,
    pub lot_size: i64,
    pub is_active: bool,
    pub last_price: Decimal,
    pub price_change: Decimal,
    pub price_change_percent: Decimal,
    pub volume: i64,
}

impl Security {
    /// A new active security with no price history yet.
    pub fn new(
        ticker: impl Into<String>,
        name: impl Into<String>,
        security_type: SecurityType,
        exchange: Exchange,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id: SecurityId::new_v4(),
            ticker: ticker.into(),
            isin: None,
            name: name.into(),
            security_type,
            exchange,
            currency: currency.into(),
            sector: None,
            lot_size: 1,
            is_active: true,
            last_price: Decimal::zero(),
            price_change: Decimal::zero(),
            price_change_percent: Decimal::zero(),
            volume: 0,
        }
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn with_isin(mut self, isin: impl Into<String>) -> Self {
        self.isin = Some(isin.into());
        self
    }
}

/// The slice of a portfolio this core needs: its base currency for defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: PortfolioId,
    pub name: String,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<Uuid>,
}

impl Portfolio {
    pub fn new(name: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            id: PortfolioId::new_v4(),
            name: name.into(),
            currency: currency.into(),
            account_id: None,
        }
    }
}
