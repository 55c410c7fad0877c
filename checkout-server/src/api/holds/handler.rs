//! Hold API Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::error::ServiceResult;
use crate::state::AppState;
use shared::error::{AppError, ErrorCode};
use shared::models::{Hold, HoldCreate, HoldCreated, HoldReleased};

/// Upper bound on units per hold
const MAX_HOLD_QTY: i64 = 1000;

/// POST /holds - reserve units and create a hold
pub async fn create(
    State(state): State<AppState>,
    Json(payload): Json<HoldCreate>,
) -> ServiceResult<(StatusCode, Json<HoldCreated>)> {
    if payload.qty < 1 || payload.qty > MAX_HOLD_QTY {
        return Err(AppError::validation(format!(
            "qty must be between 1 and {MAX_HOLD_QTY}"
        ))
        .with_detail("qty", payload.qty)
        .into());
    }

    let created = state.holds.create(payload.product_id, payload.qty).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /holds/{id} - fetch a hold
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServiceResult<Json<Hold>> {
    let hold = state
        .holds
        .get(&id)
        .await?
        .ok_or_else(|| AppError::new(ErrorCode::HoldNotFound).with_detail("hold_id", id))?;
    Ok(Json(hold))
}

/// DELETE /holds/{id} - cancel an active hold, refunding its units
pub async fn release(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServiceResult<Json<HoldReleased>> {
    let released = state.holds.release(&id).await?;
    Ok(Json(released))
}
