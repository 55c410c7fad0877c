//! Admin handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::ServiceResult;
use crate::state::AppState;
use shared::models::StockSnapshot;

/// POST /admin/stock/{id}/refresh - recompute the fast-store counters from
/// durable state (`available = base − active_holds`, `reserved = active_holds`).
///
/// Recovery tool for cross-store divergence after a crash between the
/// durable commit and the fast-store commit.
pub async fn refresh_stock(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<StockSnapshot>> {
    let snapshot = state.ledger.refresh(id).await?;
    Ok(Json(snapshot))
}
