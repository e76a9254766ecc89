//! Weighted-average cost accounting for holdings.
//!
//! Each function turns a transaction (or its reversal) plus the current holding
//! state into a [`HoldingMutation`]. Planning is pure; the service layer applies
//! the mutation through the holding store inside one unit of work.
//!
//! Sells reduce cost basis proportionally to the quantity sold. This is an
//! average-cost approximation, not lot-level (FIFO/LIFO) accounting, and the tax
//! report relies on the same approximation.

use crate::domain::{Decimal, HoldingState, InvestmentTransaction, TransactionType};
use thiserror::Error;

/// How a holding row must change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldingMutation {
    /// Insert the row, or add both deltas to the existing row and recompute
    /// `average_price = total_cost / quantity`.
    Merge {
        quantity: Decimal,
        total_cost: Decimal,
    },
    /// Overwrite the row with an absolute state.
    SetExact(HoldingState),
    /// Drop the row; quantity reached zero or below.
    Delete,
    Unchanged,
}

impl HoldingMutation {
    /// Apply the mutation to an in-memory holding state.
    ///
    /// Mirrors what the holding store does to the persisted row. A merge that
    /// overflows also yields `None`; planning rejects those before they get here.
    pub fn apply_to(self, current: Option<HoldingState>) -> Option<HoldingState> {
        match self {
            HoldingMutation::Merge {
                quantity,
                total_cost,
            } => HoldingState::checked_merge(current, quantity, total_cost),
            HoldingMutation::SetExact(state) => current.map(|_| state),
            HoldingMutation::Delete => None,
            HoldingMutation::Unchanged => current,
        }
    }
}

/// A transaction the ledger refuses to apply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleViolation {
    #[error("insufficient shares for sale: held {held}, requested {requested}")]
    InsufficientShares { held: Decimal, requested: Decimal },
    #[error("{0}")]
    InvalidInput(String),
}

fn out_of_range() -> RuleViolation {
    RuleViolation::InvalidInput("value out of range".to_string())
}

fn require_positive(value: Decimal, field: &str) -> Result<(), RuleViolation> {
    if value.is_positive() {
        Ok(())
    } else {
        Err(RuleViolation::InvalidInput(format!(
            "{field} must be greater than zero"
        )))
    }
}

fn require_non_negative(value: Decimal, field: &str) -> Result<(), RuleViolation> {
    if value.is_negative() {
        Err(RuleViolation::InvalidInput(format!(
            "{field} must not be negative"
        )))
    } else {
        Ok(())
    }
}

/// Buy `quantity` units at `price` paying `commission`.
pub fn plan_buy(
    quantity: Decimal,
    price: Decimal,
    commission: Decimal,
) -> Result<HoldingMutation, RuleViolation> {
    require_positive(quantity, "quantity")?;
    require_non_negative(price, "price")?;
    require_non_negative(commission, "commission")?;

    let total_cost = quantity
        .checked_mul(price)
        .and_then(|gross| gross.checked_add(commission))
        .ok_or_else(out_of_range)?;
    Ok(HoldingMutation::Merge {
        quantity,
        total_cost,
    })
}

/// Sell `quantity` units out of `current`.
///
/// The average price of the remaining units is unchanged; total cost shrinks
/// by `quantity / held * total_cost`.
pub fn plan_sell(
    current: Option<HoldingState>,
    quantity: Decimal,
) -> Result<HoldingMutation, RuleViolation> {
    require_positive(quantity, "quantity")?;

    let held = match current {
        Some(held) if held.quantity >= quantity => held,
        other => {
            return Err(RuleViolation::InsufficientShares {
                held: other.map(|h| h.quantity).unwrap_or_default(),
                requested: quantity,
            })
        }
    };

    let remaining = held.quantity - quantity;
    if !remaining.is_positive() {
        return Ok(HoldingMutation::Delete);
    }

    let cost_reduction = held
        .total_cost
        .checked_mul(quantity)
        .and_then(|scaled| scaled.checked_div(held.quantity))
        .ok_or_else(out_of_range)?;
    Ok(HoldingMutation::SetExact(HoldingState::new(
        remaining,
        held.average_price,
        held.total_cost - cost_reduction,
    )))
}

/// Split by `ratio` (2 for 2:1). A split on an untracked security is a no-op.
pub fn plan_split(
    current: Option<HoldingState>,
    ratio: Decimal,
) -> Result<HoldingMutation, RuleViolation> {
    require_positive(ratio, "split ratio")?;

    let Some(held) = current else {
        return Ok(HoldingMutation::Unchanged);
    };
    let quantity = held.quantity.checked_mul(ratio).ok_or_else(out_of_range)?;
    let average_price = held
        .average_price
        .checked_div(ratio)
        .ok_or_else(out_of_range)?;
    Ok(HoldingMutation::SetExact(HoldingState::new(
        quantity,
        average_price,
        held.total_cost,
    )))
}

/// Undo a buy: remove its quantity and its full amount (price plus commission).
///
/// The average price is recomputed from the remaining totals because later
/// transactions may have moved it since the buy was applied.
pub fn plan_revert_buy(
    current: Option<HoldingState>,
    quantity: Decimal,
    amount: Decimal,
) -> Result<HoldingMutation, RuleViolation> {
    let Some(held) = current else {
        return Ok(HoldingMutation::Unchanged);
    };

    let quantity = held.quantity.checked_sub(quantity).ok_or_else(out_of_range)?;
    let total_cost = held.total_cost.checked_sub(amount).ok_or_else(out_of_range)?;
    if !quantity.is_positive() || !total_cost.is_positive() {
        return Ok(HoldingMutation::Delete);
    }

    let average_price = total_cost.checked_div(quantity).ok_or_else(out_of_range)?;
    Ok(HoldingMutation::SetExact(HoldingState::new(
        quantity,
        average_price,
        total_cost,
    )))
}

/// Undo a sell by buying back at the sale's original terms.
pub fn plan_revert_sell(
    quantity: Decimal,
    price: Decimal,
    commission: Decimal,
) -> Result<HoldingMutation, RuleViolation> {
    plan_buy(quantity, price, commission)
}

/// Undo a split by splitting with the reciprocal ratio.
pub fn plan_revert_split(
    current: Option<HoldingState>,
    ratio: Decimal,
) -> Result<HoldingMutation, RuleViolation> {
    let reciprocal = Decimal::one()
        .checked_div(ratio)
        .ok_or_else(|| RuleViolation::InvalidInput("stored split ratio is zero".to_string()))?;
    plan_split(current, reciprocal)
}

/// Plan the holding change for a newly recorded transaction.
pub fn plan_apply(
    transaction_type: TransactionType,
    current: Option<HoldingState>,
    quantity: Decimal,
    price: Decimal,
    commission: Decimal,
) -> Result<HoldingMutation, RuleViolation> {
    let mutation = match transaction_type {
        TransactionType::Buy | TransactionType::TransferIn => {
            plan_buy(quantity, price, commission)?
        }
        TransactionType::Sell | TransactionType::TransferOut => plan_sell(current, quantity)?,
        TransactionType::Split => plan_split(current, quantity)?,
        TransactionType::Dividend
        | TransactionType::Coupon
        | TransactionType::Fee
        | TransactionType::Tax => HoldingMutation::Unchanged,
    };
    ensure_merge_fits(mutation, current)
}

/// Plan the compensating change for deleting `tx`.
pub fn plan_revert(
    tx: &InvestmentTransaction,
    current: Option<HoldingState>,
) -> Result<HoldingMutation, RuleViolation> {
    let mutation = match tx.transaction_type {
        TransactionType::Buy | TransactionType::TransferIn => {
            plan_revert_buy(current, tx.quantity, tx.amount)?
        }
        TransactionType::Sell | TransactionType::TransferOut => {
            plan_revert_sell(tx.quantity, tx.price, tx.commission)?
        }
        TransactionType::Split => plan_revert_split(current, tx.quantity)?,
        TransactionType::Dividend
        | TransactionType::Coupon
        | TransactionType::Fee
        | TransactionType::Tax => HoldingMutation::Unchanged,
    };
    ensure_merge_fits(mutation, current)
}

/// A merge must not overflow the row it lands on.
fn ensure_merge_fits(
    mutation: HoldingMutation,
    current: Option<HoldingState>,
) -> Result<HoldingMutation, RuleViolation> {
    if let HoldingMutation::Merge {
        quantity,
        total_cost,
    } = mutation
    {
        HoldingState::checked_merge(current, quantity, total_cost).ok_or_else(out_of_range)?;
    }
    Ok(mutation)
}
