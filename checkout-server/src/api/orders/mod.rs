//! Order API module

mod handler;

use axum::{routing::post, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/orders", post(handler::create))
}
