//! checkout-server — flash-sale checkout coordinator
//!
//! Long-running service that:
//! - Reserves limited stock via time-limited holds (fast store)
//! - Converts holds into orders awaiting payment (durable ledger)
//! - Applies payment webhooks idempotently (commit or refund)
//! - Sweeps expired holds in a background reaper

use checkout_server::{AppState, Config, ExpiryReaper};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "checkout_server=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();

    tracing::info!("Starting checkout-server (env: {})", config.environment);

    // Initialize application state
    let state = AppState::new(&config).await?;

    // Spawn the expiry reaper
    let reaper = ExpiryReaper::new(
        state.fast.clone(),
        state.holds.clone(),
        state.ledger.clone(),
        &config,
    );
    tokio::spawn(reaper.run());

    // Build router and serve
    let app = checkout_server::api::router(state);
    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("checkout-server listening on {addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
