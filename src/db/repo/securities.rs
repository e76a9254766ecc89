//! Securities and portfolios. Owned by the CRUD layers; the ledger reads them
//! and refreshes security prices.

use crate::domain::{Portfolio, PortfolioId, Quote, Security, SecurityId};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::{decimal_col, now_ms, parsed_col, parsed_opt_col};

/// Storage functions for securities.
pub struct SecurityStore;

/// Storage functions for portfolios.
pub struct PortfolioStore;

const SECURITY_COLUMNS: &str = "id, ticker, isin, name, type, exchange, currency, sector, \
     lot_size, is_active, last_price, price_change, price_change_percent, volume";

impl SecurityStore {
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get(
        conn: &mut SqliteConnection,
        id: SecurityId,
    ) -> Result<Option<Security>, sqlx::Error> {
        let sql = format!("SELECT {SECURITY_COLUMNS} FROM securities WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(|r| security_from_row(r, "")).transpose()
    }

    /// Insert by `(ticker, exchange)`; an existing row keeps its id and price
    /// fields and takes the incoming descriptive fields.
    ///
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn upsert(
        conn: &mut SqliteConnection,
        security: &Security,
    ) -> Result<Security, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO securities (
                id, ticker, isin, name, type, exchange, currency, sector,
                lot_size, is_active, last_price, price_change, price_change_percent,
                volume, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(ticker, exchange) DO UPDATE SET
                isin = COALESCE(excluded.isin, securities.isin),
                name = excluded.name,
                type = excluded.type,
                currency = excluded.currency,
                sector = COALESCE(excluded.sector, securities.sector),
                lot_size = excluded.lot_size,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(security.id.to_string())
        .bind(&security.ticker)
        .bind(security.isin.as_deref())
        .bind(&security.name)
        .bind(security.security_type.as_str())
        .bind(security.exchange.as_str())
        .bind(&security.currency)
        .bind(security.sector.as_deref())
        .bind(security.lot_size)
        .bind(security.is_active)
        .bind(security.last_price.to_canonical_string())
        .bind(security.price_change.to_canonical_string())
        .bind(security.price_change_percent.to_canonical_string())
        .bind(security.volume)
        .bind(now_ms())
        .execute(&mut *conn)
        .await?;

        let sql = format!("SELECT {SECURITY_COLUMNS} FROM securities WHERE ticker = ? AND exchange = ?");
        let row = sqlx::query(&sql)
            .bind(&security.ticker)
            .bind(security.exchange.as_str())
            .fetch_one(&mut *conn)
            .await?;

        security_from_row(&row, "")
    }

    /// # Errors
    /// Returns an error if the update fails.
    pub async fn update_price(
        conn: &mut SqliteConnection,
        id: SecurityId,
        quote: &Quote,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE securities
            SET last_price = ?, price_change = ?, price_change_percent = ?, volume = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(quote.last_price.to_canonical_string())
        .bind(quote.change.to_canonical_string())
        .bind(quote.change_percent.to_canonical_string())
        .bind(quote.volume)
        .bind(now_ms())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}

impl PortfolioStore {
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert(conn: &mut SqliteConnection, portfolio: &Portfolio) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO portfolios (id, name, currency, account_id, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(portfolio.id.to_string())
        .bind(&portfolio.name)
        .bind(&portfolio.currency)
        .bind(portfolio.account_id.map(|id| id.to_string()))
        .bind(now_ms())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get(
        conn: &mut SqliteConnection,
        id: PortfolioId,
    ) -> Result<Option<Portfolio>, sqlx::Error> {
        let row = sqlx::query("SELECT id, name, currency, account_id FROM portfolios WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await?;

        row.map(|row| {
            Ok(Portfolio {
                id: parsed_col(&row, "id")?,
                name: row.try_get("name")?,
                currency: row.try_get("currency")?,
                account_id: parsed_opt_col(&row, "account_id")?,
            })
        })
        .transpose()
    }
}

/// Decode a security from columns named `{prefix}{column}`.
pub(crate) fn security_from_row(row: &SqliteRow, prefix: &str) -> Result<Security, sqlx::Error> {
    let col = |name: &str| format!("{prefix}{name}");
    let exchange: String = row.try_get(col("exchange").as_str())?;

    Ok(Security {
        id: parsed_col(row, &col("id"))?,
        ticker: row.try_get(col("ticker").as_str())?,
        isin: row.try_get(col("isin").as_str())?,
        name: row.try_get(col("name").as_str())?,
        security_type: parsed_col(row, &col("type"))?,
        exchange: exchange.into(),
        currency: row.try_get(col("currency").as_str())?,
        sector: row.try_get(col("sector").as_str())?,
        lot_size: row.try_get(col("lot_size").as_str())?,
        is_active: row.try_get(col("is_active").as_str())?,
        last_price: decimal_col(row, &col("last_price")),
        price_change: decimal_col(row, &col("price_change")),
        price_change_percent: decimal_col(row, &col("price_change_percent")),
        volume: row.try_get(col("volume").as_str())?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::{seed, setup_test_db};
    use crate::domain::{Decimal, Exchange, SecurityType};

    #[tokio::test]
    async fn test_upsert_security_keeps_identity() {
        let (repo, _temp) = setup_test_db().await;
        let (_, first) = seed(&repo).await;

        let again = repo
            .upsert_security(&Security::new(
                "SBER",
                "Sberbank PAO",
                SecurityType::Stock,
                Exchange::new("moex"),
                "RUB",
            ))
            .await
            .unwrap();

        assert_eq!(again.id, first.id);
        assert_eq!(again.name, "Sberbank PAO");
        assert_eq!(again.sector.as_deref(), Some("Finance"));
    }

    #[tokio::test]
    async fn test_update_security_price() {
        let (repo, _temp) = setup_test_db().await;
        let (_, security) = seed(&repo).await;

        let mut quote = Quote::new("SBER", Exchange::moex(), Decimal::from_str_canonical("301.25").unwrap());
        quote.change = Decimal::from_str_canonical("-1.5").unwrap();
        quote.volume = 1200;
        repo.update_security_price(security.id, &quote).await.unwrap();

        let stored = repo.get_security(security.id).await.unwrap().unwrap();
        assert_eq!(stored.last_price, quote.last_price);
        assert_eq!(stored.price_change, quote.change);
        assert_eq!(stored.volume, 1200);
    }

    #[tokio::test]
    async fn test_portfolio_round_trip() {
        let (repo, _temp) = setup_test_db().await;
        let portfolio = Portfolio::new("IIS", "RUB");
        repo.insert_portfolio(&portfolio).await.unwrap();

        assert_eq!(repo.get_portfolio(portfolio.id).await.unwrap(), Some(portfolio));
        assert_eq!(repo.get_portfolio(PortfolioId::new_v4()).await.unwrap(), None);
    }
}
