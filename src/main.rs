use portfolio_ledger::marketdata::{ExchangeRouter, MarketDataProvider, MoexProvider};
use portfolio_ledger::{api, config::Config, db::init_db, Repository, Services};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));

    let mut router = ExchangeRouter::new();
    if config.moex_enabled {
        router = router.with_provider(Arc::new(MoexProvider::new(
            config.moex_api_url.clone(),
            config.market_data_timeout,
        )));
    } else {
        tracing::warn!("MOEX provider disabled, holdings will be served unpriced");
    }
    let market: Arc<dyn MarketDataProvider> = Arc::new(router);

    let services = Arc::new(Services::new(repo, market, &config));

    // Create router
    let app = api::create_router(api::AppState::new(services));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    // Run server
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
}
