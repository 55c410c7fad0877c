//! Product API Handlers

use axum::{
    extract::{Path, State},
    Json,
};

use crate::db::products;
use crate::error::ServiceResult;
use crate::state::AppState;
use crate::stock::InitOutcome;
use shared::error::{AppError, ErrorCode};
use shared::models::ProductView;

/// GET /products/{id} - product with live stock counters
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ServiceResult<Json<ProductView>> {
    let product = products::find_by_id(&state.pool, id).await?.ok_or_else(|| {
        AppError::new(ErrorCode::ProductNotFound).with_detail("product_id", id)
    })?;

    if state.ledger.ensure_initialized(id).await? == InitOutcome::Uninitialized {
        return Err(AppError::new(ErrorCode::StockNotInitialized)
            .with_detail("product_id", id)
            .into());
    }
    let snapshot = state.ledger.snapshot(id).await?;
    let active_holds = state.ledger.active_holds(id).await?;

    Ok(Json(ProductView {
        id: product.id,
        name: product.name,
        price: product.price,
        total_stock: product.stock,
        available_stock: snapshot.available,
        reserved_stock: snapshot.reserved,
        active_holds,
        version: snapshot.version,
    }))
}
