//! Product API module

mod handler;

use axum::{routing::get, Router};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/products/{id}", get(handler::get_by_id))
}
