//! The Holding Store: one aggregate row per `(portfolio, security)`.
//!
//! Write functions are crate-private; the ledger service is the only caller.

use crate::domain::{
    Decimal, Holding, HoldingId, HoldingState, PortfolioId, Security, SecurityId,
};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::securities::security_from_row;
use super::{decimal_col, now_ms, parsed_col, timestamp_col};

/// Storage functions for holdings.
pub struct HoldingStore;

const HOLDING_COLUMNS: &str = "h.id AS id, h.portfolio_id AS portfolio_id, \
     h.security_id AS security_id, h.quantity AS quantity, h.average_price AS average_price, \
     h.total_cost AS total_cost, h.created_at AS created_at, h.updated_at AS updated_at";

impl HoldingStore {
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get(
        conn: &mut SqliteConnection,
        portfolio_id: PortfolioId,
        security_id: SecurityId,
    ) -> Result<Option<Holding>, sqlx::Error> {
        let sql = format!(
            "SELECT {HOLDING_COLUMNS} FROM holdings h \
             WHERE h.portfolio_id = ? AND h.security_id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(portfolio_id.to_string())
            .bind(security_id.to_string())
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(holding_from_row).transpose()
    }

    /// Every holding of the portfolio with its security, ordered by ticker.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_all_for_portfolio(
        conn: &mut SqliteConnection,
        portfolio_id: PortfolioId,
    ) -> Result<Vec<(Holding, Option<Security>)>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {HOLDING_COLUMNS},
                   s.id AS s_id, s.ticker AS s_ticker, s.isin AS s_isin, s.name AS s_name,
                   s.type AS s_type, s.exchange AS s_exchange, s.currency AS s_currency,
                   s.sector AS s_sector, s.lot_size AS s_lot_size, s.is_active AS s_is_active,
                   s.last_price AS s_last_price, s.price_change AS s_price_change,
                   s.price_change_percent AS s_price_change_percent, s.volume AS s_volume
            FROM holdings h
            LEFT JOIN securities s ON s.id = h.security_id
            WHERE h.portfolio_id = ?
            ORDER BY s.ticker ASC, h.security_id ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(portfolio_id.to_string())
            .fetch_all(&mut *conn)
            .await?;

        rows.iter()
            .map(|row| {
                let holding = holding_from_row(row)?;
                let security = match row.try_get::<Option<String>, _>("s_id")? {
                    Some(_) => Some(security_from_row(row, "s_")?),
                    None => None,
                };
                Ok((holding, security))
            })
            .collect()
    }

    /// Insert-or-merge: add `quantity` and `total_cost` to the existing row, or
    /// create it. The average price is recomputed from the merged totals.
    ///
    /// Decimal arithmetic happens here rather than in SQL so no value passes
    /// through SQLite's floating point. Callers must hold the write lock of a
    /// unit of work.
    ///
    /// # Errors
    /// Returns an error if the read or write fails, or if the merged totals
    /// overflow.
    pub(crate) async fn upsert(
        conn: &mut SqliteConnection,
        portfolio_id: PortfolioId,
        security_id: SecurityId,
        quantity: Decimal,
        total_cost: Decimal,
    ) -> Result<Holding, sqlx::Error> {
        let existing = Self::get(&mut *conn, portfolio_id, security_id).await?;
        let id = existing.as_ref().map_or_else(HoldingId::new_v4, |h| h.id);
        let merged =
            HoldingState::checked_merge(existing.map(|h| h.state()), quantity, total_cost)
                .ok_or_else(|| sqlx::Error::Protocol("holding merge out of range".to_string()))?;
        let HoldingState {
            quantity,
            average_price,
            total_cost,
        } = merged;
        let now = now_ms();

        sqlx::query(
            r#"
            INSERT INTO holdings (
                id, portfolio_id, security_id, quantity, average_price, total_cost,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(portfolio_id, security_id) DO UPDATE SET
                quantity = excluded.quantity,
                average_price = excluded.average_price,
                total_cost = excluded.total_cost,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id.to_string())
        .bind(portfolio_id.to_string())
        .bind(security_id.to_string())
        .bind(quantity.to_canonical_string())
        .bind(average_price.to_canonical_string())
        .bind(total_cost.to_canonical_string())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Self::get(&mut *conn, portfolio_id, security_id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Overwrite a row with an absolute state. Returns false if the row is gone.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub(crate) async fn set_exact(
        conn: &mut SqliteConnection,
        id: HoldingId,
        state: HoldingState,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE holdings
            SET quantity = ?, average_price = ?, total_cost = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(state.quantity.to_canonical_string())
        .bind(state.average_price.to_canonical_string())
        .bind(state.total_cost.to_canonical_string())
        .bind(now_ms())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete the row only if its quantity is zero or negative.
    ///
    /// Quantities are TEXT, which SQLite would compare to `0` as strings, hence
    /// the cast. The cast is only used for the sign test.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub(crate) async fn delete_if_non_positive(
        conn: &mut SqliteConnection,
        portfolio_id: PortfolioId,
        security_id: SecurityId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM holdings
            WHERE portfolio_id = ? AND security_id = ? AND CAST(quantity AS REAL) <= 0
            "#,
        )
        .bind(portfolio_id.to_string())
        .bind(security_id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn holding_from_row(row: &SqliteRow) -> Result<Holding, sqlx::Error> {
    Ok(Holding {
        id: parsed_col(row, "id")?,
        portfolio_id: parsed_col(row, "portfolio_id")?,
        security_id: parsed_col(row, "security_id")?,
        quantity: decimal_col(row, "quantity"),
        average_price: decimal_col(row, "average_price"),
        total_cost: decimal_col(row, "total_cost"),
        created_at: timestamp_col(row, "created_at"),
        updated_at: timestamp_col(row, "updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::{seed, setup_test_db};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    #[tokio::test]
    async fn test_upsert_merges_into_existing_row() {
        let (repo, _temp) = setup_test_db().await;
        let (portfolio, security) = seed(&repo).await;
        let mut conn = repo.pool.acquire().await.unwrap();

        let first = HoldingStore::upsert(&mut conn, portfolio.id, security.id, d("100"), d("1005"))
            .await
            .unwrap();
        let merged = HoldingStore::upsert(&mut conn, portfolio.id, security.id, d("50"), d("600"))
            .await
            .unwrap();

        assert_eq!(first.id, merged.id);
        assert_eq!(merged.quantity, d("150"));
        assert_eq!(merged.total_cost, d("1605"));
        assert_eq!(merged.average_price, d("10.7"));
    }

    #[tokio::test]
    async fn test_upsert_rejects_overflowing_merge() {
        let (repo, _temp) = setup_test_db().await;
        let (portfolio, security) = seed(&repo).await;
        let mut conn = repo.pool.acquire().await.unwrap();

        let max = d("79228162514264337593543950335");
        HoldingStore::upsert(&mut conn, portfolio.id, security.id, d("1"), max)
            .await
            .unwrap();
        let result =
            HoldingStore::upsert(&mut conn, portfolio.id, security.id, d("1"), d("1")).await;
        assert!(matches!(result, Err(sqlx::Error::Protocol(_))));

        let held = HoldingStore::get(&mut conn, portfolio.id, security.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(held.quantity, d("1"));
        assert_eq!(held.total_cost, max);
    }

    #[tokio::test]
    async fn test_decimals_survive_storage_exactly() {
        let (repo, _temp) = setup_test_db().await;
        let (portfolio, security) = seed(&repo).await;
        let mut conn = repo.pool.acquire().await.unwrap();

        let qty = d("0.000000000123456789");
        let cost = d("98765432109876.54321");
        HoldingStore::upsert(&mut conn, portfolio.id, security.id, qty, cost)
            .await
            .unwrap();

        let held = HoldingStore::get(&mut conn, portfolio.id, security.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(held.quantity, qty);
        assert_eq!(held.total_cost, cost);
    }

    #[tokio::test]
    async fn test_delete_if_non_positive_guards_positive_rows() {
        let (repo, _temp) = setup_test_db().await;
        let (portfolio, security) = seed(&repo).await;
        let mut conn = repo.pool.acquire().await.unwrap();

        let held = HoldingStore::upsert(&mut conn, portfolio.id, security.id, d("9"), d("90"))
            .await
            .unwrap();
        assert!(
            !HoldingStore::delete_if_non_positive(&mut conn, portfolio.id, security.id)
                .await
                .unwrap()
        );

        HoldingStore::set_exact(&mut conn, held.id, HoldingState::default())
            .await
            .unwrap();
        assert!(
            HoldingStore::delete_if_non_positive(&mut conn, portfolio.id, security.id)
                .await
                .unwrap()
        );
        assert!(HoldingStore::get(&mut conn, portfolio.id, security.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_get_all_joins_security() {
        let (repo, _temp) = setup_test_db().await;
        let (portfolio, security) = seed(&repo).await;
        let mut conn = repo.pool.acquire().await.unwrap();

        HoldingStore::upsert(&mut conn, portfolio.id, security.id, d("1"), d("2"))
            .await
            .unwrap();

        let rows = HoldingStore::get_all_for_portfolio(&mut conn, portfolio.id)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let joined = rows[0].1.as_ref().unwrap();
        assert_eq!(joined.ticker, "SBER");
        assert_eq!(joined.sector.as_deref(), Some("Finance"));
        assert_eq!(joined.id, security.id);
    }
}
