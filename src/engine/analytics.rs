//! Portfolio-level aggregation over enriched holdings.

use crate::domain::{Decimal, EnrichedHolding, PortfolioId, SecurityType};
use serde::Serialize;
use std::collections::BTreeMap;

/// Return figures and allocation breakdowns for one portfolio.
///
/// Allocation maps hold percentages of `total_value`; they are empty when the
/// portfolio has no current value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortfolioAnalytics {
    pub portfolio_id: PortfolioId,
    pub total_value: Decimal,
    pub total_invested: Decimal,
    pub total_return: Decimal,
    pub total_return_percent: Decimal,
    pub allocation_by_type: BTreeMap<SecurityType, Decimal>,
    pub allocation_by_sector: BTreeMap<String, Decimal>,
    pub allocation_by_currency: BTreeMap<String, Decimal>,
    /// Trailing twelve months of dividends relative to `total_value`.
    pub dividend_yield: Decimal,
}

/// Aggregate `holdings`; `trailing_dividends` is the sum of dividend amounts
/// received over the last twelve months.
pub fn compute(
    portfolio_id: PortfolioId,
    holdings: &[EnrichedHolding],
    trailing_dividends: Decimal,
) -> PortfolioAnalytics {
    let mut by_type: BTreeMap<SecurityType, Decimal> = BTreeMap::new();
    let mut by_sector: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut by_currency: BTreeMap<String, Decimal> = BTreeMap::new();
    let mut total_value = Decimal::zero();
    let mut total_invested = Decimal::zero();

    for h in holdings {
        total_value += h.current_value;
        total_invested += h.holding.total_cost;

        let Some(security) = &h.security else {
            continue;
        };
        *by_type.entry(security.security_type).or_default() += h.current_value;
        if let Some(sector) = security.sector.as_deref().filter(|s| !s.is_empty()) {
            *by_sector.entry(sector.to_string()).or_default() += h.current_value;
        }
        *by_currency.entry(security.currency.clone()).or_default() += h.current_value;
    }

    let total_return = total_value - total_invested;
    let total_return_percent = if total_invested.is_positive() {
        total_return.percent_of(total_invested)
    } else {
        Decimal::zero()
    };

    let has_value = total_value.is_positive();
    PortfolioAnalytics {
        portfolio_id,
        total_value,
        total_invested,
        total_return,
        total_return_percent,
        allocation_by_type: normalize(by_type, total_value, has_value),
        allocation_by_sector: normalize(by_sector, total_value, has_value),
        allocation_by_currency: normalize(by_currency, total_value, has_value),
        dividend_yield: if has_value {
            trailing_dividends.percent_of(total_value)
        } else {
            Decimal::zero()
        },
    }
}

fn normalize<K: Ord>(
    buckets: BTreeMap<K, Decimal>,
    total: Decimal,
    has_value: bool,
) -> BTreeMap<K, Decimal> {
    if !has_value {
        return BTreeMap::new();
    }
    buckets
        .into_iter()
        .map(|(key, value)| (key, value.percent_of(total)))
        .collect()
}
