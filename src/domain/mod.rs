//! Domain types for the investment holdings ledger.
//!
//! This module provides:
//! - Lossless numeric handling via the Decimal wrapper
//! - Identifiers and enumerations (Exchange, SecurityType, TransactionType)
//! - Securities, portfolios, holdings and investment transactions
//! - Market quotes and dividend announcements

pub mod decimal;
pub mod holding;
pub mod market;
pub mod primitives;
pub mod security;
pub mod transaction;

pub use decimal::Decimal;
pub use holding::{EnrichedHolding, Holding, HoldingState};
pub use market::{Dividend, Quote, QuoteKey};
pub use primitives::{
    Exchange, HoldingId, PortfolioId, SecurityId, SecurityType, TransactionId, TransactionType,
    UnknownVariant,
};
pub use security::{Portfolio, Security};
pub use transaction::{InvestmentTransaction, NewTransaction};
