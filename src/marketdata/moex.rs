//! Moscow Exchange ISS client.
//!
//! ISS answers with column tables: every block (`marketdata`, `securities`,
//! `dividends`) is `{"columns": [...], "data": [[...], ...]}`.

use super::{MarketDataError, MarketDataProvider};
use crate::domain::{Decimal, Dividend, Exchange, Quote};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use chrono::{Duration as ChronoDuration, NaiveDate};
use reqwest::Client;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://iss.moex.com/iss";

/// ISS quote provider for MOEX and SPB listings.
#[derive(Debug, Clone)]
pub struct MoexProvider {
    client: Client,
    base_url: String,
    max_elapsed: Duration,
}

/// Where a ticker trades inside ISS: engine, market and primary board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct IssMarket {
    pub engine: &'static str,
    pub market: &'static str,
    pub board: &'static str,
}

impl IssMarket {
    const fn new(engine: &'static str, market: &'static str, board: &'static str) -> Self {
        Self {
            engine,
            market,
            board,
        }
    }
}

const ETF_TICKERS: &[&str] = &[
    "FXGD", "FXRB", "FXRL", "FXRU", "FXUS", "FXDE", "FXCN", "TMOS", "TBIO", "TECH", "TGLD",
    "TSPX", "SBGB", "SBPR", "VTBX", "VTBH", "VTBE", "VTBA",
];

const CURRENCY_CODES: &[&str] = &["RUB", "USD", "EUR", "CNY", "GBP", "CHF", "JPY", "TRY", "HKD", "KZT"];

/// Guess the ISS market of a ticker from its shape.
pub fn detect_market(ticker: &str) -> IssMarket {
    let t = ticker.to_uppercase();

    if let Some((_, expiry)) = t.split_once('-') {
        if expiry.contains('.') {
            return IssMarket::new("futures", "forts", "RFUD");
        }
    }
    if t.starts_with("RU000A10") || t.starts_with("PIF") {
        return IssMarket::new("stock", "shares", "TQPI");
    }
    if t.starts_with("SU") || t.starts_with("RU") || t.starts_with("XS") {
        return IssMarket::new("stock", "bonds", "TQOB");
    }
    if CURRENCY_CODES.iter().any(|code| t.contains(code)) {
        if t.contains("TOM") || t.contains("TOD") {
            return IssMarket::new("currency", "selt", "CETS");
        }
        if t.contains("SWAP") {
            return IssMarket::new("currency", "swap", "CRTS");
        }
    }
    if t.ends_with("-RM") || t.ends_with("-SPB") {
        return IssMarket::new("stock", "foreignshares", "FQBR");
    }
    if ETF_TICKERS.contains(&t.as_str()) {
        return IssMarket::new("stock", "shares", "TQTF");
    }
    if t.ends_with("DR") {
        return IssMarket::new("stock", "dr", "TQDR");
    }
    if t.starts_with("IMOEX") || t.starts_with("RTS") {
        return IssMarket::new("futures", "forts", "RFUD");
    }
    IssMarket::new("stock", "shares", "TQBR")
}

impl MoexProvider {
    /// Create a provider; `timeout` bounds each HTTP call and the retry loop.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build configured HTTP client, using defaults");
            Client::new()
        });
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_elapsed: timeout,
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value, MarketDataError> {
        debug!(url = %url, "ISS request");
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };

        retry(backoff, || async {
            let response = self.client.get(url).send().await.map_err(|e| {
                backoff::Error::transient(MarketDataError::NetworkError(e.to_string()))
            })?;

            let status = response.status();
            if status == 429 {
                return Err(backoff::Error::transient(MarketDataError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(MarketDataError::HttpError {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            if !status.is_success() {
                return Err(backoff::Error::permanent(MarketDataError::HttpError {
                    status: status.as_u16(),
                    message: "Client error".to_string(),
                }));
            }

            response.json::<Value>().await.map_err(|e| {
                backoff::Error::permanent(MarketDataError::ParseError(e.to_string()))
            })
        })
        .await
    }
}

#[async_trait]
impl MarketDataProvider for MoexProvider {
    fn name(&self) -> &str {
        "moex"
    }

    fn supported_exchanges(&self) -> Vec<Exchange> {
        vec![Exchange::moex(), Exchange::new(Exchange::SPB)]
    }

    async fn get_quote(&self, ticker: &str, exchange: &Exchange) -> Result<Quote, MarketDataError> {
        let m = detect_market(ticker);
        let url = format!(
            "{}/engines/{}/markets/{}/boards/{}/securities/{}.json?iss.meta=off",
            self.base_url, m.engine, m.market, m.board, ticker
        );
        let body = self.get_json(&url).await?;

        parse_quotes(&body, exchange, None)?
            .remove(ticker)
            .ok_or_else(|| MarketDataError::NotFound(ticker.to_string()))
    }

    async fn get_quotes(
        &self,
        tickers: &[String],
        exchange: &Exchange,
    ) -> Result<HashMap<String, Quote>, MarketDataError> {
        let mut by_market: BTreeMap<(&str, &str), Vec<&str>> = BTreeMap::new();
        let mut boards: HashMap<String, &str> = HashMap::new();
        for ticker in tickers {
            let m = detect_market(ticker);
            by_market
                .entry((m.engine, m.market))
                .or_default()
                .push(ticker.as_str());
            boards.insert(ticker.clone(), m.board);
        }

        let mut quotes = HashMap::new();
        for ((engine, market), group) in by_market {
            let url = format!(
                "{}/engines/{}/markets/{}/securities.json?iss.meta=off&securities={}",
                self.base_url,
                engine,
                market,
                group.join(",")
            );
            let body = self.get_json(&url).await?;
            quotes.extend(parse_quotes(&body, exchange, Some(&boards))?);
        }

        debug!(
            exchange = %exchange,
            requested = tickers.len(),
            resolved = quotes.len(),
            "ISS batch quotes"
        );
        Ok(quotes)
    }

    async fn get_dividends(
        &self,
        ticker: &str,
        _exchange: &Exchange,
    ) -> Result<Vec<Dividend>, MarketDataError> {
        let url = format!(
            "{}/securities/{}/dividends.json?iss.meta=off",
            self.base_url, ticker
        );
        let body = self.get_json(&url).await?;
        parse_dividends(&body, ticker)
    }
}

// =============================================================================
// ISS table parsing
// =============================================================================

struct IssTable<'a> {
    columns: HashMap<&'a str, usize>,
    data: &'a [Value],
}

impl<'a> IssTable<'a> {
    fn from_block(body: &'a Value, block: &str) -> Result<Self, MarketDataError> {
        let table = body
            .get(block)
            .ok_or_else(|| MarketDataError::ParseError(format!("Missing {} block", block)))?;
        let columns = table
            .get("columns")
            .and_then(|v| v.as_array())
            .ok_or_else(|| MarketDataError::ParseError(format!("Missing {} columns", block)))?
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_str().map(|name| (name, i)))
            .collect();
        let data = table
            .get("data")
            .and_then(|v| v.as_array())
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(Self { columns, data })
    }

    fn rows(&self) -> impl Iterator<Item = IssRow<'_>> {
        self.data.iter().filter_map(|row| {
            row.as_array().map(|cells| IssRow {
                columns: &self.columns,
                cells,
            })
        })
    }
}

struct IssRow<'a> {
    columns: &'a HashMap<&'a str, usize>,
    cells: &'a [Value],
}

impl IssRow<'_> {
    fn cell(&self, column: &str) -> Option<&Value> {
        self.columns
            .get(column)
            .and_then(|&i| self.cells.get(i))
            .filter(|v| !v.is_null())
    }

    fn str(&self, column: &str) -> Option<&str> {
        self.cell(column).and_then(Value::as_str)
    }

    /// First non-null, parseable column among `columns`.
    fn decimal(&self, columns: &[&str]) -> Option<Decimal> {
        columns
            .iter()
            .find_map(|c| self.cell(c).and_then(json_decimal))
    }

    fn i64(&self, column: &str) -> Option<i64> {
        self.cell(column)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
    }
}

fn json_decimal(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return None,
    };
    Decimal::from_str_canonical(&text)
        .ok()
        .or_else(|| rust_decimal::Decimal::from_scientific(&text).ok().map(Decimal::from))
}

/// Quotes from a `marketdata` block, keyed by SECID.
///
/// With `boards`, rows from boards other than the ticker's primary board are
/// ignored. A missing last price falls back to `PREVPRICE` from the
/// `securities` block.
fn parse_quotes(
    body: &Value,
    exchange: &Exchange,
    boards: Option<&HashMap<String, &str>>,
) -> Result<HashMap<String, Quote>, MarketDataError> {
    let marketdata = IssTable::from_block(body, "marketdata")?;
    let mut quotes = HashMap::new();

    for row in marketdata.rows() {
        let Some(ticker) = row.str("SECID") else {
            continue;
        };
        if let (Some(boards), Some(board)) = (boards, row.str("BOARDID")) {
            if boards.get(ticker).is_some_and(|primary| *primary != board) {
                continue;
            }
        }

        let mut quote = Quote::new(
            ticker,
            exchange.clone(),
            row.decimal(&["LAST", "CURRENTVALUE"]).unwrap_or_default(),
        );
        quote.change = row.decimal(&["CHANGE"]).unwrap_or_default();
        quote.change_percent = row
            .decimal(&["LASTTOPREVPRICE", "CHANGEPERCENT"])
            .unwrap_or_default();
        quote.volume = row.i64("VOLTODAY").unwrap_or_default();
        quotes.insert(ticker.to_string(), quote);
    }

    if let Ok(securities) = IssTable::from_block(body, "securities") {
        for row in securities.rows() {
            let Some(quote) = row.str("SECID").and_then(|t| quotes.get_mut(t)) else {
                continue;
            };
            if quote.last_price.is_zero() {
                if let Some(prev) = row.decimal(&["PREVPRICE", "PREVADMITTEDQUOTE"]) {
                    quote.last_price = prev;
                }
            }
        }
    }

    Ok(quotes)
}

/// Dividends from a `dividends` block. The ex-date is approximated as two
/// days before the registry close date.
fn parse_dividends(body: &Value, ticker: &str) -> Result<Vec<Dividend>, MarketDataError> {
    let table = IssTable::from_block(body, "dividends")?;

    Ok(table
        .rows()
        .map(|row| {
            let record_date = row
                .str("registryclosedate")
                .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());
            Dividend {
                security_id: None,
                ticker: row.str("secid").unwrap_or(ticker).to_string(),
                ex_date: record_date.map(|d| d - ChronoDuration::days(2)),
                record_date,
                payment_date: None,
                amount: row.decimal(&["value"]).unwrap_or_default(),
                currency: row.str("currencyid").unwrap_or("RUB").to_string(),
            }
        })
        .collect())
}
