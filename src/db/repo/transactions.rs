//! Investment transaction rows. Inserted and deleted, never updated.

use crate::domain::{
    Decimal, InvestmentTransaction, PortfolioId, TransactionId, TransactionType,
};
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;

use super::{decimal_col, parsed_col, timestamp_col};

/// Storage functions for investment transactions.
pub struct TransactionStore;

const TRANSACTION_COLUMNS: &str = "id, portfolio_id, security_id, type, date, quantity, price, \
     amount, commission, currency, exchange_rate, notes, broker_ref, created_at";

impl TransactionStore {
    /// # Errors
    /// Returns an error if the insert fails.
    pub(crate) async fn insert(
        conn: &mut SqliteConnection,
        tx: &InvestmentTransaction,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO investment_transactions (
                id, portfolio_id, security_id, type, date, quantity, price, amount,
                commission, currency, exchange_rate, notes, broker_ref, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(tx.id.to_string())
        .bind(tx.portfolio_id.to_string())
        .bind(tx.security_id.to_string())
        .bind(tx.transaction_type.as_str())
        .bind(tx.date.to_string())
        .bind(tx.quantity.to_canonical_string())
        .bind(tx.price.to_canonical_string())
        .bind(tx.amount.to_canonical_string())
        .bind(tx.commission.to_canonical_string())
        .bind(&tx.currency)
        .bind(tx.exchange_rate.to_canonical_string())
        .bind(tx.notes.as_deref())
        .bind(tx.broker_ref.as_deref())
        .bind(tx.created_at.timestamp_millis())
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get(
        conn: &mut SqliteConnection,
        id: TransactionId,
    ) -> Result<Option<InvestmentTransaction>, sqlx::Error> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM investment_transactions WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    /// # Errors
    /// Returns an error if the delete fails.
    pub(crate) async fn delete(
        conn: &mut SqliteConnection,
        id: TransactionId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM investment_transactions WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Newest first: by date, then by insertion time.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list(
        conn: &mut SqliteConnection,
        portfolio_id: PortfolioId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<InvestmentTransaction>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM investment_transactions
            WHERE portfolio_id = ?
            ORDER BY date DESC, created_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(portfolio_id.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    /// Transactions dated within `[start, end]`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn between(
        conn: &mut SqliteConnection,
        portfolio_id: PortfolioId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<InvestmentTransaction>, sqlx::Error> {
        let sql = format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM investment_transactions
            WHERE portfolio_id = ? AND date >= ? AND date <= ?
            ORDER BY date ASC, created_at ASC, id ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(portfolio_id.to_string())
            .bind(start.to_string())
            .bind(end.to_string())
            .fetch_all(&mut *conn)
            .await?;

        rows.iter().map(transaction_from_row).collect()
    }

    /// Sum of `amount` for one transaction type within `[start, end]`.
    ///
    /// Summed in Rust so the result stays exact.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn sum_amounts_between(
        conn: &mut SqliteConnection,
        portfolio_id: PortfolioId,
        transaction_type: TransactionType,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Decimal, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT amount FROM investment_transactions
            WHERE portfolio_id = ? AND type = ? AND date >= ? AND date <= ?
            "#,
        )
        .bind(portfolio_id.to_string())
        .bind(transaction_type.as_str())
        .bind(start.to_string())
        .bind(end.to_string())
        .fetch_all(&mut *conn)
        .await?;

        Ok(rows.iter().map(|row| decimal_col(row, "amount")).sum())
    }
}

fn transaction_from_row(row: &SqliteRow) -> Result<InvestmentTransaction, sqlx::Error> {
    Ok(InvestmentTransaction {
        id: parsed_col(row, "id")?,
        portfolio_id: parsed_col(row, "portfolio_id")?,
        security_id: parsed_col(row, "security_id")?,
        transaction_type: parsed_col(row, "type")?,
        date: parsed_col(row, "date")?,
        quantity: decimal_col(row, "quantity"),
        price: decimal_col(row, "price"),
        amount: decimal_col(row, "amount"),
        commission: decimal_col(row, "commission"),
        currency: row.try_get("currency")?,
        exchange_rate: decimal_col(row, "exchange_rate"),
        notes: row.try_get("notes")?,
        broker_ref: row.try_get("broker_ref")?,
        created_at: timestamp_col(row, "created_at"),
        security: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repo::test_support::{seed, setup_test_db};
    use crate::domain::SecurityId;
    use chrono::{Duration, Utc};

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn row(
        portfolio_id: PortfolioId,
        security_id: SecurityId,
        ty: TransactionType,
        date: &str,
        amount: &str,
    ) -> InvestmentTransaction {
        InvestmentTransaction {
            id: TransactionId::new_v4(),
            portfolio_id,
            security_id,
            transaction_type: ty,
            date: date.parse().unwrap(),
            quantity: d("1"),
            price: d(amount),
            amount: d(amount),
            commission: Decimal::zero(),
            currency: "RUB".to_string(),
            exchange_rate: Decimal::one(),
            notes: Some("note".to_string()),
            broker_ref: None,
            created_at: Utc::now(),
            security: None,
        }
    }

    #[tokio::test]
    async fn test_insert_get_delete() {
        let (repo, _temp) = setup_test_db().await;
        let (portfolio, security) = seed(&repo).await;
        let mut conn = repo.pool.acquire().await.unwrap();

        let tx = row(portfolio.id, security.id, TransactionType::Buy, "2024-02-03", "10.5");
        TransactionStore::insert(&mut conn, &tx).await.unwrap();

        let stored = TransactionStore::get(&mut conn, tx.id).await.unwrap().unwrap();
        assert_eq!(stored.amount, d("10.5"));
        assert_eq!(stored.date, tx.date);
        assert_eq!(stored.notes.as_deref(), Some("note"));
        assert_eq!(stored.created_at.timestamp_millis(), tx.created_at.timestamp_millis());

        assert!(TransactionStore::delete(&mut conn, tx.id).await.unwrap());
        assert!(!TransactionStore::delete(&mut conn, tx.id).await.unwrap());
        assert!(TransactionStore::get(&mut conn, tx.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_paginated() {
        let (repo, _temp) = setup_test_db().await;
        let (portfolio, security) = seed(&repo).await;
        let mut conn = repo.pool.acquire().await.unwrap();

        let base = Utc::now();
        for (i, date) in ["2024-01-05", "2024-03-01", "2023-12-31"].iter().enumerate() {
            let mut tx = row(portfolio.id, security.id, TransactionType::Buy, date, "1");
            tx.created_at = base + Duration::milliseconds(i as i64);
            TransactionStore::insert(&mut conn, &tx).await.unwrap();
        }

        let page = TransactionStore::list(&mut conn, portfolio.id, 2, 0).await.unwrap();
        let dates: Vec<String> = page.iter().map(|t| t.date.to_string()).collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-01-05"]);

        let rest = TransactionStore::list(&mut conn, portfolio.id, 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].date.to_string(), "2023-12-31");
    }

    #[tokio::test]
    async fn test_between_and_sum_respect_inclusive_bounds() {
        let (repo, _temp) = setup_test_db().await;
        let (portfolio, security) = seed(&repo).await;
        let mut conn = repo.pool.acquire().await.unwrap();

        for (ty, date, amount) in [
            (TransactionType::Dividend, "2023-12-31", "100"),
            (TransactionType::Dividend, "2024-01-01", "10.1"),
            (TransactionType::Dividend, "2024-12-31", "20.2"),
            (TransactionType::Coupon, "2024-06-01", "5"),
            (TransactionType::Dividend, "2025-01-01", "1000"),
        ] {
            let tx = row(portfolio.id, security.id, ty, date, amount);
            TransactionStore::insert(&mut conn, &tx).await.unwrap();
        }

        let start: NaiveDate = "2024-01-01".parse().unwrap();
        let end: NaiveDate = "2024-12-31".parse().unwrap();

        let in_year = TransactionStore::between(&mut conn, portfolio.id, start, end)
            .await
            .unwrap();
        assert_eq!(in_year.len(), 3);
        assert_eq!(in_year[0].date, start);

        let dividends = TransactionStore::sum_amounts_between(
            &mut conn,
            portfolio.id,
            TransactionType::Dividend,
            start,
            end,
        )
        .await
        .unwrap();
        assert_eq!(dividends, d("30.3"));
    }
}
