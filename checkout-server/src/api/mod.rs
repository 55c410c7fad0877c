//! API routing
//!
//! # Structure
//!
//! - [`health`] - liveness and store probes
//! - [`products`] - product read view with live stock counters
//! - [`holds`] - reservation lifecycle
//! - [`orders`] - order creation from a hold
//! - [`payments`] - payment-processor webhook
//! - [`admin`] - operational recompute endpoints

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod admin;
pub mod health;
pub mod holds;
pub mod orders;
pub mod payments;
pub mod products;

/// Compose the full application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(products::router())
        .merge(holds::router())
        .merge(orders::router())
        .merge(payments::router())
        .merge(admin::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
