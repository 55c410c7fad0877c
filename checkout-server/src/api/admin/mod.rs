//! Admin API module

mod handler;

use axum::{routing::post, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/admin/stock/{id}/refresh", post(handler::refresh_stock))
}
