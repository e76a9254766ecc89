//! Annual tax report: income plus realized gains, taxed at a flat rate.
//!
//! Cost basis of a sale is `quantity * average_price` of the holding as it
//! exists when the report is built, or the sale's own price when the holding is
//! gone. The average price at the time of the sale is not reconstructed, so
//! figures drift when other trades happen between the sale and the report.

use crate::domain::{
    Decimal, InvestmentTransaction, PortfolioId, SecurityId, TransactionId, TransactionType,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;

/// Gain or loss realized by one sell transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RealizedSale {
    pub transaction_id: TransactionId,
    pub security_id: SecurityId,
    pub date: NaiveDate,
    pub quantity: Decimal,
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub profit_loss: Decimal,
    /// True when no holding remained and the sale price stood in for cost.
    pub sale_price_basis: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaxReport {
    pub year: i32,
    pub portfolio_id: PortfolioId,
    pub total_dividends: Decimal,
    pub total_coupons: Decimal,
    pub realized_gains: Decimal,
    /// Absolute value of realized losses.
    pub realized_losses: Decimal,
    /// `realized_gains - realized_losses`; may be negative.
    pub net_gain: Decimal,
    pub taxable_amount: Decimal,
    pub tax_rate: Decimal,
    pub estimated_tax: Decimal,
    pub sales: Vec<RealizedSale>,
    pub transactions: Vec<InvestmentTransaction>,
}

/// First and last day of `year`, inclusive.
pub fn year_bounds(year: i32) -> Option<(NaiveDate, NaiveDate)> {
    Some((
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    ))
}

/// Build the report for `year`.
///
/// `transactions` must already be limited to the year. `average_prices` maps
/// each still-held security to its current average price.
pub fn build_report(
    portfolio_id: PortfolioId,
    year: i32,
    transactions: Vec<InvestmentTransaction>,
    average_prices: &HashMap<SecurityId, Decimal>,
    tax_rate: Decimal,
) -> TaxReport {
    let mut total_dividends = Decimal::zero();
    let mut total_coupons = Decimal::zero();
    let mut realized_gains = Decimal::zero();
    let mut realized_losses = Decimal::zero();
    let mut sales = Vec::new();

    for tx in &transactions {
        match tx.transaction_type {
            TransactionType::Dividend => total_dividends += tx.amount,
            TransactionType::Coupon => total_coupons += tx.amount,
            TransactionType::Sell => {
                let sale = realize(tx, average_prices.get(&tx.security_id).copied());
                if sale.profit_loss.is_negative() {
                    realized_losses += sale.profit_loss.abs();
                } else {
                    realized_gains += sale.profit_loss;
                }
                sales.push(sale);
            }
            _ => {}
        }
    }

    let net_gain = realized_gains - realized_losses;
    let mut taxable_amount = total_dividends + total_coupons;
    if net_gain.is_positive() {
        taxable_amount += net_gain;
    }

    TaxReport {
        year,
        portfolio_id,
        total_dividends,
        total_coupons,
        realized_gains,
        realized_losses,
        net_gain,
        taxable_amount,
        tax_rate,
        estimated_tax: taxable_amount * tax_rate,
        sales,
        transactions,
    }
}

fn realize(tx: &InvestmentTransaction, average_price: Option<Decimal>) -> RealizedSale {
    let proceeds = tx.quantity * tx.price - tx.commission;
    let cost_basis = tx.quantity * average_price.unwrap_or(tx.price);

    RealizedSale {
        transaction_id: tx.id,
        security_id: tx.security_id,
        date: tx.date,
        quantity: tx.quantity,
        proceeds,
        cost_basis,
        profit_loss: proceeds - cost_basis,
        sale_price_basis: average_price.is_none(),
    }
}
