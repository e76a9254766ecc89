//! Joins holdings with market quotes to derive value, profit and weight.

use crate::domain::{Decimal, EnrichedHolding, Exchange, Holding, Quote, QuoteKey, Security};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Tickers to quote, grouped by exchange. Each ticker appears once per exchange.
pub fn group_by_exchange<'a, I>(securities: I) -> BTreeMap<Exchange, Vec<String>>
where
    I: IntoIterator<Item = &'a Security>,
{
    let mut groups: BTreeMap<Exchange, BTreeSet<String>> = BTreeMap::new();
    for security in securities {
        groups
            .entry(security.exchange.clone())
            .or_default()
            .insert(security.ticker.clone());
    }
    groups
        .into_iter()
        .map(|(exchange, tickers)| (exchange, tickers.into_iter().collect()))
        .collect()
}

/// Compute derived fields for every holding.
///
/// Holdings whose `(exchange, ticker)` has no quote keep zero-valued derived
/// fields. Weights are relative to the sum of current values of the priced
/// holdings.
pub fn enrich(
    rows: Vec<(Holding, Option<Security>)>,
    quotes: &BTreeMap<QuoteKey, Quote>,
) -> Vec<EnrichedHolding> {
    let mut enriched: Vec<EnrichedHolding> = rows
        .into_iter()
        .map(|(holding, security)| {
            let quote = security
                .as_ref()
                .and_then(|s| quotes.get(&(s.exchange.clone(), s.ticker.clone())));
            match quote {
                Some(quote) => priced(holding, security, quote.last_price),
                None => EnrichedHolding::unpriced(holding, security),
            }
        })
        .collect();

    let total_value: Decimal = enriched.iter().map(|h| h.current_value).sum();
    for holding in &mut enriched {
        holding.weight = holding.current_value.percent_of(total_value);
    }
    enriched
}

fn priced(holding: Holding, security: Option<Security>, price: Decimal) -> EnrichedHolding {
    // A value too large to represent is treated like a missing quote.
    let Some(current_value) = holding.quantity.checked_mul(price) else {
        return EnrichedHolding::unpriced(holding, security);
    };
    let profit = current_value - holding.total_cost;
    let profit_percent = if holding.total_cost.is_positive() {
        profit.percent_of(holding.total_cost)
    } else {
        Decimal::zero()
    };

    EnrichedHolding {
        current_price: price,
        current_value,
        profit,
        profit_percent,
        weight: Decimal::zero(),
        priced: true,
        holding,
        security,
    }
}

/// Portfolio-level totals over enriched holdings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortfolioSummary {
    pub total_value: Decimal,
    pub total_invested: Decimal,
    pub total_profit: Decimal,
    pub total_profit_percent: Decimal,
    pub holdings_count: usize,
    /// Holdings that could not be priced.
    pub unpriced_count: usize,
}

pub fn summarize(holdings: &[EnrichedHolding]) -> PortfolioSummary {
    let total_value: Decimal = holdings.iter().map(|h| h.current_value).sum();
    let total_invested: Decimal = holdings.iter().map(|h| h.holding.total_cost).sum();
    let total_profit = total_value - total_invested;

    PortfolioSummary {
        total_value,
        total_invested,
        total_profit,
        total_profit_percent: if total_invested.is_positive() {
            total_profit.percent_of(total_invested)
        } else {
            Decimal::zero()
        },
        holdings_count: holdings.len(),
        unpriced_count: holdings.iter().filter(|h| !h.priced).count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{HoldingId, PortfolioId, SecurityType};
    use chrono::Utc;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn security(ticker: &str, exchange: &str) -> Security {
        Security::new(
            ticker,
            ticker,
            SecurityType::Stock,
            Exchange::new(exchange),
            "RUB",
        )
    }

    fn holding(security: &Security, quantity: &str, total_cost: &str) -> Holding {
        let quantity = d(quantity);
        let total_cost = d(total_cost);
        Holding {
            id: HoldingId::new_v4(),
            portfolio_id: PortfolioId::new_v4(),
            security_id: security.id,
            quantity,
            average_price: total_cost / quantity,
            total_cost,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn quotes(entries: &[(&str, &str, &str)]) -> BTreeMap<QuoteKey, Quote> {
        entries
            .iter()
            .map(|(exchange, ticker, price)| {
                let quote = Quote::new(*ticker, Exchange::new(exchange), d(price));
                (quote.key(), quote)
            })
            .collect()
    }

    #[test]
    fn test_group_by_exchange_dedupes_tickers() {
        let a = security("SBER", "MOEX");
        let b = security("GAZP", "moex");
        let c = security("SBER", "MOEX");
        let e = security("AAPL", "SPB");

        let groups = group_by_exchange([&a, &b, &c, &e]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&Exchange::moex()], vec!["GAZP", "SBER"]);
        assert_eq!(groups[&Exchange::new("SPB")], vec!["AAPL"]);
    }

    #[test]
    fn test_enrich_computes_value_profit_and_weight() {
        let sber = security("SBER", "MOEX");
        let gazp = security("GAZP", "MOEX");
        let rows = vec![
            (holding(&sber, "10", "100"), Some(sber.clone())),
            (holding(&gazp, "30", "600"), Some(gazp.clone())),
        ];
        let enriched = enrich(rows, &quotes(&[("MOEX", "SBER", "15"), ("MOEX", "GAZP", "15")]));

        assert_eq!(enriched[0].current_value, d("150"));
        assert_eq!(enriched[0].profit, d("50"));
        assert_eq!(enriched[0].profit_percent, d("50"));
        assert_eq!(enriched[0].weight, d("25"));

        assert_eq!(enriched[1].current_value, d("450"));
        assert_eq!(enriched[1].profit, d("-150"));
        assert_eq!(enriched[1].profit_percent, d("-25"));
        assert_eq!(enriched[1].weight, d("75"));
    }

    #[test]
    fn test_weights_sum_to_hundred() {
        let rows: Vec<_> = [("A", "3", "7"), ("B", "11", "13"), ("C", "0.7", "1")]
            .iter()
            .map(|(ticker, qty, cost)| {
                let s = security(ticker, "MOEX");
                (holding(&s, qty, cost), Some(s))
            })
            .collect();
        let quotes = quotes(&[("MOEX", "A", "3.33"), ("MOEX", "B", "1.7"), ("MOEX", "C", "99")]);

        let total: Decimal = enrich(rows, &quotes).iter().map(|h| h.weight).sum();
        assert!(total.approx_eq(Decimal::hundred(), d("0.00000001")), "{total}");
    }

    #[test]
    fn test_unquoted_holdings_keep_zero_fields() {
        let sber = security("SBER", "MOEX");
        let aapl = security("AAPL", "SPB");
        let rows = vec![
            (holding(&sber, "10", "100"), Some(sber.clone())),
            (holding(&aapl, "5", "500"), Some(aapl.clone())),
        ];
        let enriched = enrich(rows, &quotes(&[("MOEX", "SBER", "12")]));

        assert_eq!(enriched[0].weight, Decimal::hundred());
        assert_eq!(enriched[1].current_price, Decimal::zero());
        assert_eq!(enriched[1].current_value, Decimal::zero());
        assert_eq!(enriched[1].profit, Decimal::zero());
        assert_eq!(enriched[1].weight, Decimal::zero());
        assert!(enriched[0].priced);
        assert!(!enriched[1].priced);
    }

    #[test]
    fn test_zero_price_quote_still_counts_as_priced() {
        let s = security("DELIST", "MOEX");
        let rows = vec![(holding(&s, "10", "100"), Some(s.clone()))];
        let enriched = enrich(rows, &quotes(&[("MOEX", "DELIST", "0")]));

        assert!(enriched[0].priced);
        assert_eq!(enriched[0].current_value, Decimal::zero());
        assert_eq!(enriched[0].profit, d("-100"));

        let summary = summarize(&enriched);
        assert_eq!(summary.unpriced_count, 0);
        assert_eq!(summary.total_profit, d("-100"));
    }

    #[test]
    fn test_quotes_are_keyed_by_exchange() {
        let moex = security("ABC", "MOEX");
        let rows = vec![(holding(&moex, "1", "1"), Some(moex.clone()))];
        let enriched = enrich(rows, &quotes(&[("SPB", "ABC", "5")]));
        assert_eq!(enriched[0].current_price, Decimal::zero());
    }

    #[test]
    fn test_zero_cost_holding_has_zero_profit_percent() {
        let s = security("GIFT", "MOEX");
        let rows = vec![(
            Holding {
                total_cost: Decimal::zero(),
                average_price: Decimal::zero(),
                ..holding(&s, "4", "1")
            },
            Some(s.clone()),
        )];
        let enriched = enrich(rows, &quotes(&[("MOEX", "GIFT", "2")]));
        assert_eq!(enriched[0].profit, d("8"));
        assert_eq!(enriched[0].profit_percent, Decimal::zero());
    }

    #[test]
    fn test_summarize_totals() {
        let sber = security("SBER", "MOEX");
        let aapl = security("AAPL", "SPB");
        let rows = vec![
            (holding(&sber, "10", "100"), Some(sber.clone())),
            (holding(&aapl, "5", "500"), Some(aapl.clone())),
        ];
        let summary = summarize(&enrich(rows, &quotes(&[("MOEX", "SBER", "30")])));

        assert_eq!(summary.total_value, d("300"));
        assert_eq!(summary.total_invested, d("600"));
        assert_eq!(summary.total_profit, d("-300"));
        assert_eq!(summary.total_profit_percent, d("-50"));
        assert_eq!(summary.holdings_count, 2);
        assert_eq!(summary.unpriced_count, 1);
    }
}
