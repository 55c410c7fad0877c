//! Health check routes
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /health | GET | store probes + version |

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health routes - public (no auth)
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Status (ok | degraded)
    status: &'static str,
    /// Version
    version: &'static str,
    /// Fast store reachable
    fast_store: bool,
    /// Durable store reachable
    database: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let fast_store = state.fast.ping().await.is_ok();
    let database = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();

    Json(HealthResponse {
        status: if fast_store && database {
            "ok"
        } else {
            "degraded"
        },
        version: env!("CARGO_PKG_VERSION"),
        fast_store,
        database,
    })
}
