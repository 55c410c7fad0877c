//! Hold API module

mod handler;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/holds", post(handler::create))
        .route(
            "/holds/{id}",
            get(handler::get_by_id).delete(handler::release),
        )
}
