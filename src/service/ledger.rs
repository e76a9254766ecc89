//! The write path: recording and deleting investment transactions.
//!
//! Every write runs in one unit of work so the transaction row and the holding
//! it moves are committed together or not at all. This is the only code that
//! writes holding rows.

use crate::db::{HoldingStore, PortfolioStore, Repository, SecurityStore, TransactionStore};
use crate::domain::{
    Decimal, Holding, HoldingState, InvestmentTransaction, NewTransaction, PortfolioId,
    SecurityId, TransactionId, TransactionType,
};
use crate::engine::ledger::{plan_apply, plan_revert, HoldingMutation, RuleViolation};
use chrono::Utc;
use sqlx::sqlite::SqliteConnection;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by ledger and portfolio operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("insufficient shares: held {held}, requested {requested}")]
    InsufficientShares { held: Decimal, requested: Decimal },
    #[error("security not found: {0}")]
    SecurityNotFound(SecurityId),
    #[error("portfolio not found: {0}")]
    PortfolioNotFound(PortfolioId),
    #[error("transaction not found: {0}")]
    TransactionNotFound(TransactionId),
    #[error("no holding of security {security_id} in portfolio {portfolio_id}")]
    HoldingNotFound {
        portfolio_id: PortfolioId,
        security_id: SecurityId,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

impl From<RuleViolation> for LedgerError {
    fn from(err: RuleViolation) -> Self {
        match err {
            RuleViolation::InsufficientShares { held, requested } => {
                LedgerError::InsufficientShares { held, requested }
            }
            RuleViolation::InvalidInput(msg) => LedgerError::InvalidInput(msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerService {
    repo: Arc<Repository>,
}

impl LedgerService {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Record a transaction and apply it to the holding.
    ///
    /// Validation (including the held-quantity check for sells) happens before
    /// any write. The returned transaction embeds its security.
    ///
    /// # Errors
    /// `PortfolioNotFound`, `SecurityNotFound`, `InsufficientShares` or
    /// `InvalidInput` for rejected requests; `Db` when storage fails, in which
    /// case nothing was written.
    pub async fn add_transaction(
        &self,
        input: NewTransaction,
    ) -> Result<InvestmentTransaction, LedgerError> {
        let amount = validate(&input)?;

        let tx = self
            .repo
            .execute(|conn| {
                Box::pin(async move {
                    let portfolio = PortfolioStore::get(&mut *conn, input.portfolio_id)
                        .await?
                        .ok_or(LedgerError::PortfolioNotFound(input.portfolio_id))?;
                    let security = SecurityStore::get(&mut *conn, input.security_id)
                        .await?
                        .ok_or(LedgerError::SecurityNotFound(input.security_id))?;

                    let current =
                        HoldingStore::get(&mut *conn, input.portfolio_id, input.security_id)
                            .await?;
                    let mutation = plan_apply(
                        input.transaction_type,
                        current.as_ref().map(Holding::state),
                        input.quantity,
                        input.price,
                        input.commission,
                    )?;

                    let tx = InvestmentTransaction {
                        id: TransactionId::new_v4(),
                        portfolio_id: input.portfolio_id,
                        security_id: input.security_id,
                        transaction_type: input.transaction_type,
                        date: input.date,
                        quantity: input.quantity,
                        price: input.price,
                        amount,
                        commission: input.commission,
                        currency: input
                            .currency
                            .filter(|c| !c.trim().is_empty())
                            .unwrap_or(portfolio.currency),
                        exchange_rate: input
                            .exchange_rate
                            .filter(|rate| !rate.is_zero())
                            .unwrap_or_else(Decimal::one),
                        notes: input.notes,
                        broker_ref: input.broker_ref,
                        created_at: Utc::now(),
                        security: None,
                    };

                    TransactionStore::insert(&mut *conn, &tx).await?;
                    apply_mutation(conn, &tx, current.as_ref(), mutation).await?;

                    Ok::<_, LedgerError>(InvestmentTransaction {
                        security: Some(security),
                        ..tx
                    })
                })
            })
            .await?;

        info!(
            transaction_id = %tx.id,
            portfolio_id = %tx.portfolio_id,
            security_id = %tx.security_id,
            kind = %tx.transaction_type,
            quantity = %tx.quantity,
            price = %tx.price,
            "Transaction recorded"
        );
        Ok(tx)
    }

    /// Delete a transaction and revert its effect on the holding.
    ///
    /// Lookup, row deletion and reversal share one unit of work. Returns the
    /// deleted transaction.
    ///
    /// # Errors
    /// `TransactionNotFound` if the id is unknown; `Db` when storage fails, in
    /// which case nothing changed.
    pub async fn delete_transaction(
        &self,
        id: TransactionId,
    ) -> Result<InvestmentTransaction, LedgerError> {
        let tx = self
            .repo
            .execute(|conn| {
                Box::pin(async move {
                    let tx = TransactionStore::get(&mut *conn, id)
                        .await?
                        .ok_or(LedgerError::TransactionNotFound(id))?;

                    TransactionStore::delete(&mut *conn, id).await?;

                    let current =
                        HoldingStore::get(&mut *conn, tx.portfolio_id, tx.security_id).await?;
                    let mutation = plan_revert(&tx, current.as_ref().map(Holding::state))?;
                    apply_mutation(conn, &tx, current.as_ref(), mutation).await?;

                    Ok::<_, LedgerError>(tx)
                })
            })
            .await?;

        info!(
            transaction_id = %tx.id,
            portfolio_id = %tx.portfolio_id,
            kind = %tx.transaction_type,
            "Transaction deleted and reverted"
        );
        Ok(tx)
    }
}

/// Reject malformed input and return the resolved cash amount.
fn validate(input: &NewTransaction) -> Result<Decimal, LedgerError> {
    let moves_units = matches!(
        input.transaction_type,
        TransactionType::Buy
            | TransactionType::Sell
            | TransactionType::Split
            | TransactionType::TransferIn
            | TransactionType::TransferOut
    );
    if moves_units && !input.quantity.is_positive() {
        return Err(LedgerError::InvalidInput(
            "quantity must be greater than zero".to_string(),
        ));
    }
    if input.quantity.is_negative() {
        return Err(LedgerError::InvalidInput(
            "quantity must not be negative".to_string(),
        ));
    }
    if input.price.is_negative() {
        return Err(LedgerError::InvalidInput("price must not be negative".to_string()));
    }
    if input.commission.is_negative() {
        return Err(LedgerError::InvalidInput(
            "commission must not be negative".to_string(),
        ));
    }
    if input.amount.is_some_and(|a| a.is_negative()) {
        return Err(LedgerError::InvalidInput("amount must not be negative".to_string()));
    }
    if input.exchange_rate.is_some_and(|r| r.is_negative()) {
        return Err(LedgerError::InvalidInput(
            "exchange_rate must not be negative".to_string(),
        ));
    }
    input
        .resolved_amount()
        .ok_or_else(|| LedgerError::InvalidInput("value out of range".to_string()))
}

/// Write a planned mutation to the holding of `tx`.
///
/// Full liquidation zeroes the row first and then relies on the guarded
/// delete, so a row that is still positive is never removed.
async fn apply_mutation(
    conn: &mut SqliteConnection,
    tx: &InvestmentTransaction,
    current: Option<&Holding>,
    mutation: HoldingMutation,
) -> Result<(), sqlx::Error> {
    debug!(transaction_id = %tx.id, mutation = ?mutation, "Applying holding mutation");
    match (mutation, current) {
        (HoldingMutation::Merge { quantity, total_cost }, _) => {
            HoldingStore::upsert(conn, tx.portfolio_id, tx.security_id, quantity, total_cost)
                .await?;
        }
        (HoldingMutation::SetExact(state), Some(holding)) => {
            HoldingStore::set_exact(conn, holding.id, state).await?;
        }
        (HoldingMutation::Delete, Some(holding)) => {
            HoldingStore::set_exact(&mut *conn, holding.id, HoldingState::default()).await?;
            HoldingStore::delete_if_non_positive(conn, tx.portfolio_id, tx.security_id).await?;
        }
        (HoldingMutation::SetExact(_), None)
        | (HoldingMutation::Delete, None)
        | (HoldingMutation::Unchanged, _) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::domain::{Exchange, Portfolio, Security, SecurityType};
    use chrono::NaiveDate;
    use sqlx::SqlitePool;
    use tempfile::TempDir;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    struct Fixture {
        repo: Arc<Repository>,
        pool: SqlitePool,
        ledger: LedgerService,
        portfolio: Portfolio,
        security: Security,
        _temp: TempDir,
    }

    async fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("ledger.db").to_string_lossy().to_string();
        let pool = init_db(&db_path).await.unwrap();
        let repo = Arc::new(Repository::new(pool.clone()));

        let portfolio = Portfolio::new("Main", "RUB");
        repo.insert_portfolio(&portfolio).await.unwrap();
        let security = repo
            .upsert_security(&Security::new(
                "GAZP",
                "Gazprom",
                SecurityType::Stock,
                Exchange::moex(),
                "RUB",
            ))
            .await
            .unwrap();

        Fixture {
            ledger: LedgerService::new(Arc::clone(&repo)),
            repo,
            pool,
            portfolio,
            security,
            _temp: temp,
        }
    }

    impl Fixture {
        fn draft(&self, ty: TransactionType, qty: &str, price: &str) -> NewTransaction {
            NewTransaction::new(
                self.portfolio.id,
                self.security.id,
                ty,
                NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
                d(qty),
                d(price),
            )
        }

        async fn block_holdings(&self, event: &str) {
            sqlx::query(&format!(
                "CREATE TRIGGER block_holdings BEFORE {event} ON holdings \
                 BEGIN SELECT RAISE(ABORT, 'holdings locked'); END"
            ))
            .execute(&self.pool)
            .await
            .unwrap();
        }

        async fn state(&self) -> Option<HoldingState> {
            self.repo
                .get_holding(self.portfolio.id, self.security.id)
                .await
                .unwrap()
                .map(|h| h.state())
        }
    }

    #[tokio::test]
    async fn test_buy_then_partial_sell() {
        let f = fixture().await;

        let buy = f
            .ledger
            .add_transaction(f.draft(TransactionType::Buy, "100", "10").with_commission(d("5")))
            .await
            .unwrap();
        assert_eq!(buy.amount, d("1005"));
        assert_eq!(buy.currency, "RUB");
        assert_eq!(buy.exchange_rate, Decimal::one());
        assert_eq!(buy.security.as_ref().map(|s| s.id), Some(f.security.id));
        assert_eq!(f.state().await, Some(HoldingState::new(d("100"), d("10.05"), d("1005"))));

        f.ledger
            .add_transaction(f.draft(TransactionType::Sell, "40", "12"))
            .await
            .unwrap();
        assert_eq!(f.state().await, Some(HoldingState::new(d("60"), d("10.05"), d("603"))));
    }

    #[tokio::test]
    async fn test_oversell_writes_nothing() {
        let f = fixture().await;
        f.ledger
            .add_transaction(f.draft(TransactionType::Buy, "10", "5"))
            .await
            .unwrap();

        let err = f
            .ledger
            .add_transaction(f.draft(TransactionType::Sell, "11", "5"))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientShares { .. }));

        assert_eq!(f.state().await, Some(HoldingState::new(d("10"), d("5"), d("50"))));
        let rows = f.repo.list_transactions(f.portfolio.id, 100, 0).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_full_sell_removes_holding() {
        let f = fixture().await;
        f.ledger
            .add_transaction(f.draft(TransactionType::Buy, "10", "5"))
            .await
            .unwrap();
        f.ledger
            .add_transaction(f.draft(TransactionType::Sell, "10", "6"))
            .await
            .unwrap();
        assert_eq!(f.state().await, None);
    }

    #[tokio::test]
    async fn test_delete_reverses_each_kind() {
        let f = fixture().await;
        f.ledger
            .add_transaction(f.draft(TransactionType::Buy, "30", "10"))
            .await
            .unwrap();
        let before = f.state().await.unwrap();

        // A reverted sell buys back at the sale's terms, so it restores the
        // holding exactly only when sold at the average price without commission.
        for (ty, qty, price, commission) in [
            (TransactionType::Buy, "20", "13.7", "0.5"),
            (TransactionType::Sell, "7", "10", "0"),
            (TransactionType::Split, "3", "0", "0"),
            (TransactionType::TransferIn, "4", "9", "0.5"),
            (TransactionType::Dividend, "30", "1.2", "0"),
        ] {
            let tx = f
                .ledger
                .add_transaction(f.draft(ty, qty, price).with_commission(d(commission)))
                .await
                .unwrap();
            f.ledger.delete_transaction(tx.id).await.unwrap();

            let after = f.state().await.unwrap();
            assert!(after.approx_eq(&before, d("0.00000001")), "{ty}: {after:?}");
        }
    }

    #[tokio::test]
    async fn test_delete_only_buy_leaves_no_holding() {
        let f = fixture().await;
        let tx = f
            .ledger
            .add_transaction(f.draft(TransactionType::Buy, "3", "7.77").with_commission(d("1")))
            .await
            .unwrap();
        let deleted = f.ledger.delete_transaction(tx.id).await.unwrap();

        assert_eq!(deleted.id, tx.id);
        assert_eq!(f.state().await, None);
        assert!(matches!(
            f.ledger.delete_transaction(tx.id).await,
            Err(LedgerError::TransactionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_references_are_rejected() {
        let f = fixture().await;

        let mut draft = f.draft(TransactionType::Buy, "1", "1");
        draft.security_id = SecurityId::new_v4();
        assert!(matches!(
            f.ledger.add_transaction(draft).await,
            Err(LedgerError::SecurityNotFound(_))
        ));

        let mut draft = f.draft(TransactionType::Buy, "1", "1");
        draft.portfolio_id = PortfolioId::new_v4();
        assert!(matches!(
            f.ledger.add_transaction(draft).await,
            Err(LedgerError::PortfolioNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected_before_storage() {
        let f = fixture().await;
        for draft in [
            f.draft(TransactionType::Buy, "0", "1"),
            f.draft(TransactionType::Sell, "-1", "1"),
            f.draft(TransactionType::Buy, "1", "-1"),
            f.draft(TransactionType::Buy, "1", "1").with_commission(d("-0.01")),
        ] {
            assert!(matches!(
                f.ledger.add_transaction(draft).await,
                Err(LedgerError::InvalidInput(_))
            ));
        }
        assert!(f.repo.list_transactions(f.portfolio.id, 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_income_rows_use_explicit_amount() {
        let f = fixture().await;
        let mut draft = f
            .draft(TransactionType::Coupon, "0", "0")
            .with_amount(d("36.9"));
        draft.currency = Some("USD".to_string());
        draft.exchange_rate = Some(d("92.5"));

        let tx = f.ledger.add_transaction(draft).await.unwrap();
        assert_eq!(tx.amount, d("36.9"));
        assert_eq!(tx.currency, "USD");
        assert_eq!(tx.exchange_rate, d("92.5"));
        assert_eq!(f.state().await, None);
    }

    #[tokio::test]
    async fn test_concurrent_buys_are_serialized() {
        let f = fixture().await;
        let buys = (1..=10).map(|i| {
            let draft = f
                .draft(TransactionType::Buy, &i.to_string(), "10.5")
                .with_commission(d("0.25"));
            f.ledger.add_transaction(draft)
        });
        for result in futures::future::join_all(buys).await {
            result.unwrap();
        }

        let held = f.state().await.unwrap();
        assert_eq!(held.quantity, d("55"));
        assert_eq!(held.total_cost, d("580"));
        assert_eq!(
            f.repo.list_transactions(f.portfolio.id, 20, 0).await.unwrap().len(),
            10
        );
    }

    #[tokio::test]
    async fn test_failed_holding_write_rolls_back_the_insert() {
        let f = fixture().await;
        f.block_holdings("INSERT").await;

        let result = f
            .ledger
            .add_transaction(f.draft(TransactionType::Buy, "10", "100"))
            .await;
        assert!(matches!(result, Err(LedgerError::Db(_))), "{result:?}");
        assert!(f.repo.list_transactions(f.portfolio.id, 10, 0).await.unwrap().is_empty());
        assert_eq!(f.state().await, None);
    }

    #[tokio::test]
    async fn test_failed_revert_keeps_the_transaction() {
        let f = fixture().await;
        let tx = f
            .ledger
            .add_transaction(f.draft(TransactionType::Buy, "10", "100"))
            .await
            .unwrap();
        let before = f.state().await;
        f.block_holdings("UPDATE").await;

        let result = f.ledger.delete_transaction(tx.id).await;
        assert!(matches!(result, Err(LedgerError::Db(_))), "{result:?}");

        let remaining = f.repo.list_transactions(f.portfolio.id, 10, 0).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, tx.id);
        assert_eq!(f.state().await, before);
    }

    #[tokio::test]
    async fn test_out_of_range_buy_writes_nothing() {
        let f = fixture().await;
        let result = f
            .ledger
            .add_transaction(f.draft(
                TransactionType::Buy,
                "79228162514264337593543950335",
                "2",
            ))
            .await;
        assert_eq!(
            result.unwrap_err().to_string(),
            LedgerError::InvalidInput("value out of range".to_string()).to_string()
        );
        assert!(f.repo.list_transactions(f.portfolio.id, 10, 0).await.unwrap().is_empty());
    }
}
