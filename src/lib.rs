pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod marketdata;
pub mod service;

pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Decimal, Exchange, Holding, InvestmentTransaction, NewTransaction, Portfolio, PortfolioId,
    Security, SecurityId, SecurityType, TransactionId, TransactionType,
};
pub use error::AppError;
pub use marketdata::{ExchangeRouter, MarketDataProvider, MockMarketData, MoexProvider};
pub use service::{LedgerError, Services};
