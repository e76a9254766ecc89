#![allow(dead_code)]

use axum::http::StatusCode;
use portfolio_ledger::api;
use portfolio_ledger::config::Config;
use portfolio_ledger::db::init_db;
use portfolio_ledger::domain::{Decimal, Exchange, Portfolio, Security, SecurityType};
use portfolio_ledger::marketdata::{MarketDataProvider, MockMarketData};
use portfolio_ledger::{Repository, Services};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestApp {
    pub app: axum::Router,
    pub repo: Arc<Repository>,
    /// Raw pool for tests that need to tamper with the schema.
    pub pool: SqlitePool,
    pub portfolio: Portfolio,
    pub sber: Security,
    pub aapl: Security,
    _temp: TempDir,
}

pub async fn setup_test_app(market: MockMarketData) -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool.clone()));

    let mut env = HashMap::new();
    env.insert("DATABASE_PATH".to_string(), db_path);
    env.insert("MARKET_DATA_TIMEOUT_SECS".to_string(), "1".to_string());
    let config = Config::from_env_map(env).unwrap();

    let portfolio = Portfolio::new("Brokerage", "RUB");
    repo.insert_portfolio(&portfolio).await.unwrap();
    let sber = repo
        .upsert_security(
            &Security::new("SBER", "Sberbank", SecurityType::Stock, Exchange::moex(), "RUB")
                .with_sector("Finance"),
        )
        .await
        .unwrap();
    let aapl = repo
        .upsert_security(
            &Security::new(
                "AAPL",
                "Apple",
                SecurityType::Stock,
                Exchange::new(Exchange::SPB),
                "USD",
            )
            .with_sector("Technology"),
        )
        .await
        .unwrap();

    let market: Arc<dyn MarketDataProvider> = Arc::new(market);
    let services = Arc::new(Services::new(repo.clone(), market, &config));
    let app = api::create_router(api::AppState::new(services));

    TestApp {
        app,
        repo,
        pool,
        portfolio,
        sber,
        aapl,
        _temp: temp_dir,
    }
}

pub async fn request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Read a decimal field that was serialized as a JSON string.
pub fn dec(value: &serde_json::Value) -> Decimal {
    serde_json::from_value(value.clone()).unwrap()
}

pub fn d(s: &str) -> Decimal {
    Decimal::from_str_canonical(s).unwrap()
}

impl TestApp {
    pub async fn post_transaction(&self, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        request(&self.app, "POST", "/investments/transactions", Some(body)).await
    }

    pub fn trade(
        &self,
        security: &Security,
        kind: &str,
        date: &str,
        quantity: &str,
        price: &str,
        commission: &str,
    ) -> serde_json::Value {
        serde_json::json!({
            "portfolio_id": self.portfolio.id.to_string(),
            "security_id": security.id.to_string(),
            "type": kind,
            "date": date,
            "quantity": quantity,
            "price": price,
            "commission": commission,
        })
    }

    pub async fn holdings(&self) -> serde_json::Value {
        let (status, json) = request(
            &self.app,
            "GET",
            &format!("/portfolios/{}/holdings", self.portfolio.id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        json
    }
}
