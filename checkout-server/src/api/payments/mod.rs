//! Payment webhook API module

mod handler;

use axum::{routing::post, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/payments/webhook", post(handler::webhook))
}
