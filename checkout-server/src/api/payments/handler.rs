//! Payment webhook handler

use axum::{extract::State, Json};

use crate::error::ServiceResult;
use crate::state::AppState;
use shared::error::AppError;
use shared::models::{WebhookRequest, WebhookResponse};

/// POST /payments/webhook - apply a payment-processor callback.
///
/// Duplicate deliveries (same idempotency key) return the recorded outcome
/// without mutating anything.
pub async fn webhook(
    State(state): State<AppState>,
    Json(payload): Json<WebhookRequest>,
) -> ServiceResult<Json<WebhookResponse>> {
    if payload.idempotency_key.trim().is_empty() {
        return Err(AppError::validation("idempotency_key must not be empty").into());
    }
    if payload.idempotency_key.len() > 100 {
        return Err(AppError::validation("idempotency_key must be at most 100 characters")
            .with_detail("length", payload.idempotency_key.len() as i64)
            .into());
    }

    let response = state.webhooks.apply(&payload).await?;
    Ok(Json(response))
}
