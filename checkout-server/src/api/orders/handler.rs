//! Order API Handlers

use axum::{extract::State, http::StatusCode, Json};

use crate::error::ServiceResult;
use crate::state::AppState;
use shared::error::AppError;
use shared::models::{OrderCreate, OrderCreated};

/// POST /orders - create a pending-payment order from an active hold
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<OrderCreate>,
) -> ServiceResult<(StatusCode, Json<OrderCreated>)> {
    if payload.hold_id.trim().is_empty() {
        return Err(AppError::validation("hold_id must not be empty").into());
    }

    let order = state.orders.create_from_hold(&payload.hold_id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}
