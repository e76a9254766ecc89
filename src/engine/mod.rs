//! Pure computations behind the ledger: no I/O, deterministic given inputs.

pub mod analytics;
pub mod enrichment;
pub mod ledger;
pub mod tax;

pub use analytics::PortfolioAnalytics;
pub use enrichment::PortfolioSummary;
pub use ledger::{HoldingMutation, RuleViolation};
pub use tax::{RealizedSale, TaxReport};
