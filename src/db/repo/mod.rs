//! Repository layer for ledger storage.
//!
//! Storage functions live on zero-sized store types and take an explicit
//! `&mut SqliteConnection`, so the same code runs standalone or inside a unit of
//! work started by [`Repository::execute`]:
//! - `holdings.rs` - the Holding Store
//! - `transactions.rs` - investment transaction rows
//! - `securities.rs` - securities and portfolios (reference data)

mod holdings;
mod securities;
mod transactions;

pub use holdings::HoldingStore;
pub use securities::{PortfolioStore, SecurityStore};
pub use transactions::TransactionStore;

use crate::domain::{
    Decimal, Holding, InvestmentTransaction, Portfolio, PortfolioId, Quote, Security, SecurityId,
    TransactionType,
};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::warn;

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    // =========================================================================
    // Unit of work
    // =========================================================================

    /// Run `f` inside one write transaction.
    ///
    /// The transaction starts with `BEGIN IMMEDIATE`, taking SQLite's write
    /// lock up front so concurrent read-modify-write cycles on the same holding
    /// serialize instead of losing updates. It commits when `f` returns `Ok`
    /// and rolls back when it returns `Err`. If the returned future is dropped
    /// before completion the connection is detached from the pool and closed,
    /// which discards the open transaction.
    ///
    /// `f` receives the connection and must capture only owned data:
    ///
    /// ```ignore
    /// repo.execute(|conn| Box::pin(async move {
    ///     TransactionStore::delete(conn, id).await
    /// }))
    /// .await?;
    /// ```
    ///
    /// # Errors
    /// Returns the error produced by `f`, or a database error from beginning or
    /// committing the transaction.
    pub async fn execute<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, E>>,
        E: From<sqlx::Error>,
    {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        let mut work = OpenTransaction(Some(conn));

        let outcome = f(work.conn()?).await;
        match outcome {
            Ok(value) => {
                sqlx::query("COMMIT").execute(work.conn()?).await?;
                work.finish();
                Ok(value)
            }
            Err(e) => {
                match sqlx::query("ROLLBACK").execute(work.conn()?).await {
                    Ok(_) => work.finish(),
                    Err(rollback_err) => {
                        warn!(error = %rollback_err, "Rollback failed, discarding connection");
                    }
                }
                Err(e)
            }
        }
    }

    /// Check that the database answers queries.
    ///
    /// # Errors
    /// Returns an error if the pool cannot serve a trivial query.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn acquire(&self) -> Result<PoolConnection<Sqlite>, sqlx::Error> {
        self.pool.acquire().await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_holding(
        &self,
        portfolio_id: PortfolioId,
        security_id: SecurityId,
    ) -> Result<Option<Holding>, sqlx::Error> {
        let mut conn = self.acquire().await?;
        HoldingStore::get(&mut conn, portfolio_id, security_id).await
    }

    /// All holdings of a portfolio joined with their securities.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_holdings(
        &self,
        portfolio_id: PortfolioId,
    ) -> Result<Vec<(Holding, Option<Security>)>, sqlx::Error> {
        let mut conn = self.acquire().await?;
        HoldingStore::get_all_for_portfolio(&mut conn, portfolio_id).await
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_transactions(
        &self,
        portfolio_id: PortfolioId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InvestmentTransaction>, sqlx::Error> {
        let mut conn = self.acquire().await?;
        TransactionStore::list(&mut conn, portfolio_id, limit, offset).await
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub async fn transactions_between(
        &self,
        portfolio_id: PortfolioId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<InvestmentTransaction>, sqlx::Error> {
        let mut conn = self.acquire().await?;
        TransactionStore::between(&mut conn, portfolio_id, start, end).await
    }

    /// Sum of `amount` over transactions of one type dated in `[start, end]`.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn sum_amounts_between(
        &self,
        portfolio_id: PortfolioId,
        transaction_type: TransactionType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Decimal, sqlx::Error> {
        let mut conn = self.acquire().await?;
        TransactionStore::sum_amounts_between(&mut conn, portfolio_id, transaction_type, start, end)
            .await
    }

    // =========================================================================
    // Reference data
    // =========================================================================

    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_portfolio(&self, portfolio: &Portfolio) -> Result<(), sqlx::Error> {
        let mut conn = self.acquire().await?;
        PortfolioStore::insert(&mut conn, portfolio).await
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_portfolio(&self, id: PortfolioId) -> Result<Option<Portfolio>, sqlx::Error> {
        let mut conn = self.acquire().await?;
        PortfolioStore::get(&mut conn, id).await
    }

    /// Insert a security, or refresh the descriptive fields of the existing
    /// `(ticker, exchange)` row. Returns the stored row.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn upsert_security(&self, security: &Security) -> Result<Security, sqlx::Error> {
        let mut conn = self.acquire().await?;
        SecurityStore::upsert(&mut conn, security).await
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_security(&self, id: SecurityId) -> Result<Option<Security>, sqlx::Error> {
        let mut conn = self.acquire().await?;
        SecurityStore::get(&mut conn, id).await
    }

    /// Persist the latest market figures for a security.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn update_security_price(
        &self,
        id: SecurityId,
        quote: &Quote,
    ) -> Result<(), sqlx::Error> {
        let mut conn = self.acquire().await?;
        SecurityStore::update_price(&mut conn, id, quote).await
    }
}

/// Connection with an open `BEGIN IMMEDIATE`. Dropping it while armed detaches
/// the connection from the pool so the transaction cannot leak to other users.
struct OpenTransaction(Option<PoolConnection<Sqlite>>);

impl OpenTransaction {
    fn conn(&mut self) -> Result<&mut SqliteConnection, sqlx::Error> {
        self.0.as_deref_mut().ok_or(sqlx::Error::PoolClosed)
    }

    /// Return the connection to the pool; the transaction is closed.
    fn finish(mut self) {
        self.0.take();
    }
}

impl Drop for OpenTransaction {
    fn drop(&mut self) {
        if let Some(conn) = self.0.take() {
            warn!("Unit of work abandoned mid-transaction, closing its connection");
            drop(conn.detach());
        }
    }
}

// =============================================================================
// Row decoding
// =============================================================================

/// Read a decimal column, falling back to zero on malformed text.
pub(crate) fn decimal_col(row: &SqliteRow, column: &str) -> Decimal {
    let raw: String = row.get(column);
    Decimal::from_str(&raw).unwrap_or_else(|e| {
        warn!(column = column, value = %raw, error = %e, "Failed to parse stored decimal, using default");
        Decimal::default()
    })
}

/// Read a text column through `FromStr`.
pub(crate) fn parsed_col<T>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

/// Like [`parsed_col`] for nullable columns.
pub(crate) fn parsed_opt_col<T>(row: &SqliteRow, column: &str) -> Result<Option<T>, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|raw| {
        raw.parse().map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
    })
    .transpose()
}

pub(crate) fn timestamp_col(row: &SqliteRow, column: &str) -> DateTime<Utc> {
    let ms: i64 = row.get(column);
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_default()
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
