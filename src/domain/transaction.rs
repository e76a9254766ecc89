//! Investment transactions: immutable historical events that drive holdings.

use crate::domain::{Decimal, PortfolioId, Security, SecurityId, TransactionId, TransactionType};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A recorded trade or income event. Created once, only ever deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestmentTransaction {
    pub id: TransactionId,
    pub portfolio_id: PortfolioId,
    pub security_id: SecurityId,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub date: NaiveDate,
    /// Units traded; the ratio for splits.
    pub quantity: Decimal,
    pub price: Decimal,
    pub amount: Decimal,
    pub commission: Decimal,
    pub currency: String,
    pub exchange_rate: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<Security>,
}

/// Request to record a new transaction.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewTransaction {
    pub portfolio_id: PortfolioId,
    pub security_id: SecurityId,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub date: NaiveDate,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub commission: Decimal,
    /// Explicit payment amount for dividend/coupon/fee/tax rows.
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub exchange_rate: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub broker_ref: Option<String>,
}

impl NewTransaction {
    /// A transaction with zero commission and no optional fields.
    pub fn new(
        portfolio_id: PortfolioId,
        security_id: SecurityId,
        transaction_type: TransactionType,
        date: NaiveDate,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            portfolio_id,
            security_id,
            transaction_type,
            date,
            quantity,
            price,
            commission: Decimal::zero(),
            amount: None,
            currency: None,
            exchange_rate: None,
            notes: None,
            broker_ref: None,
        }
    }

    pub fn with_commission(mut self, commission: Decimal) -> Self {
        self.commission = commission;
        self
    }

    pub fn with_amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    /// The cash amount recorded on the row.
    ///
    /// Buys cost `q*p + commission`, sells yield `q*p - commission`, splits
    /// move no cash, and income/fee/tax rows use the explicit amount if given.
    /// `None` when the arithmetic overflows.
    pub fn resolved_amount(&self) -> Option<Decimal> {
        let gross = || self.quantity.checked_mul(self.price);
        match self.transaction_type {
            TransactionType::Buy | TransactionType::TransferIn => {
                gross()?.checked_add(self.commission)
            }
            TransactionType::Sell | TransactionType::TransferOut => {
                gross()?.checked_sub(self.commission)
            }
            TransactionType::Split => Some(Decimal::zero()),
            TransactionType::Dividend
            | TransactionType::Coupon
            | TransactionType::Fee
            | TransactionType::Tax => self.amount.or_else(gross),
        }
    }
}
