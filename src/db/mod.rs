//! SQLite storage for the ledger.
//!
//! This module provides:
//! - Database initialization and the embedded schema
//! - SQLite pragma configuration
//! - The `Repository`, its unit of work, and the per-table stores

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{HoldingStore, PortfolioStore, Repository, SecurityStore, TransactionStore};
