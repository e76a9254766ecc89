//! Holdings: the aggregate position of one security within one portfolio.

use crate::domain::{Decimal, HoldingId, PortfolioId, Security, SecurityId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three running aggregates the ledger maintains for a position.
///
/// `average_price == total_cost / quantity` whenever `quantity > 0`; the
/// buy/sell/split formulas keep this true rather than re-deriving it on read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingState {
    pub quantity: Decimal,
    pub average_price: Decimal,
    pub total_cost: Decimal,
}

impl HoldingState {
    pub fn new(quantity: Decimal, average_price: Decimal, total_cost: Decimal) -> Self {
        Self {
            quantity,
            average_price,
            total_cost,
        }
    }

    /// Add `quantity` and `total_cost` to `current` (or start from them) and
    /// recompute the average. `None` when a sum or the average overflows.
    pub fn checked_merge(
        current: Option<HoldingState>,
        quantity: Decimal,
        total_cost: Decimal,
    ) -> Option<HoldingState> {
        let (quantity, total_cost) = match current {
            Some(held) => (
                held.quantity.checked_add(quantity)?,
                held.total_cost.checked_add(total_cost)?,
            ),
            None => (quantity, total_cost),
        };
        let average_price = if quantity.is_zero() {
            Decimal::zero()
        } else {
            total_cost.checked_div(quantity)?
        };
        Some(HoldingState::new(quantity, average_price, total_cost))
    }

    /// Equality within `tolerance` on every field.
    pub fn approx_eq(&self, other: &HoldingState, tolerance: Decimal) -> bool {
        self.quantity.approx_eq(other.quantity, tolerance)
            && self.average_price.approx_eq(other.average_price, tolerance)
            && self.total_cost.approx_eq(other.total_cost, tolerance)
    }
}

/// A persisted holding row. Exactly one exists per `(portfolio_id, security_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Holding {
    pub id: HoldingId,
    pub portfolio_id: PortfolioId,
    pub security_id: SecurityId,
    pub quantity: Decimal,
    pub average_price: Decimal,
    pub total_cost: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Holding {
    pub fn state(&self) -> HoldingState {
        HoldingState::new(self.quantity, self.average_price, self.total_cost)
    }
}

/// A holding joined with its security and market-derived figures.
///
/// The derived fields are computed at read time and never persisted; they stay
/// zero when no quote could be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedHolding {
    #[serde(flatten)]
    pub holding: Holding,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security: Option<Security>,
    pub current_price: Decimal,
    pub current_value: Decimal,
    pub profit: Decimal,
    pub profit_percent: Decimal,
    pub weight: Decimal,
    /// Whether a quote was resolved. A resolved quote may still carry a zero
    /// price, so the derived fields alone cannot tell.
    pub priced: bool,
}

impl EnrichedHolding {
    /// Wrap a holding with zero-valued derived fields and `priced: false`.
    pub fn unpriced(holding: Holding, security: Option<Security>) -> Self {
        Self {
            holding,
            security,
            current_price: Decimal::zero(),
            current_value: Decimal::zero(),
            profit: Decimal::zero(),
            profit_percent: Decimal::zero(),
            weight: Decimal::zero(),
            priced: false,
        }
    }
}
