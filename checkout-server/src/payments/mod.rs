//! Idempotent payment-webhook coordinator
//!
//! The whole protocol runs against a locked order row inside a durable
//! transaction, retried on deadlock-class errors. Cross-store ordering: on
//! success the durable mutation commits before the fast-store commit script
//! runs; on failure the fast-store refund runs before the durable cancel
//! commits. Either way a crash between the two leaves the durable ledger
//! authoritative, and webhook retries land on the finalized short-circuit.
//!
//! State table (order × webhook × hold):
//!
//! | order           | webhook | hold           | action                                |
//! |-----------------|---------|----------------|---------------------------------------|
//! | pending_payment | success | active         | commit stock, delete hold, -> paid    |
//! | pending_payment | success | used           | -> paid (no-op on stock)              |
//! | pending_payment | success | payment_failed | 409 conflict                          |
//! | pending_payment | success | absent         | -> cancelled, 410                     |
//! | pending_payment | failure | active         | refund, delete hold, -> cancelled     |
//! | pending_payment | failure | used           | 409 conflict                          |
//! | pending_payment | failure | absent         | -> cancelled, 410                     |
//! | paid, cancelled | any     | any            | 200 "already finalized"               |

use chrono::Utc;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;

use shared::error::{AppError, ErrorCode};
use shared::models::{
    Hold, HoldStatus, OrderState, WebhookOutcome, WebhookRequest, WebhookResponse, WebhookStatus,
};

use crate::db::{self, idempotency, orders, products};
use crate::error::{ServiceError, ServiceResult};
use crate::holds::HoldRegistry;

/// Deadlock-class durable errors retry up to 3 times, 100 ms linear backoff
const MAX_DEADLOCK_RETRIES: u32 = 3;
const DEADLOCK_BACKOFF_MS: u64 = 100;

/// Applies payment-processor webhooks to the order ledger and the
/// reservation state
#[derive(Clone)]
pub struct WebhookProcessor {
    registry: HoldRegistry,
    pool: PgPool,
}

impl WebhookProcessor {
    pub fn new(registry: HoldRegistry, pool: PgPool) -> Self {
        Self { registry, pool }
    }

    /// Apply one webhook delivery; replays with the same key are no-ops
    pub async fn apply(&self, request: &WebhookRequest) -> ServiceResult<WebhookResponse> {
        let status: WebhookStatus = request.status.parse().map_err(|_| {
            AppError::new(ErrorCode::WebhookInvalidStatus).with_detail("status", request.status.clone())
        })?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_apply(request, status).await {
                Err(ServiceError::Db(err))
                    if db::is_deadlock(&err) && attempt < MAX_DEADLOCK_RETRIES =>
                {
                    tracing::warn!(
                        order_id = request.order_id,
                        attempt,
                        error = %err,
                        "Deadlock applying webhook, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(
                        DEADLOCK_BACKOFF_MS * attempt as u64,
                    ))
                    .await;
                }
                other => return other,
            }
        }
    }

    async fn try_apply(
        &self,
        request: &WebhookRequest,
        status: WebhookStatus,
    ) -> ServiceResult<WebhookResponse> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        // Exclusive lock on the order row for the whole protocol
        let Some(order) = orders::lock_by_id(&mut tx, request.order_id).await? else {
            return Err(AppError::new(ErrorCode::OrderNotFound)
                .with_detail("order_id", request.order_id)
                .into());
        };
        let order_state: OrderState = order
            .state
            .parse()
            .map_err(|_| AppError::new(ErrorCode::OrderStateInvalid).with_detail("state", order.state.clone()))?;

        // Finalization short-circuit: retries stay idempotent even without
        // a matching key
        if order_state.is_final() {
            idempotency::upsert(
                &mut tx,
                &request.idempotency_key,
                order.id,
                status.recorded_status(),
                now,
            )
            .await?;
            tx.commit().await?;
            return Ok(WebhookResponse {
                order_id: order.id,
                state: order_state,
                outcome: WebhookOutcome::AlreadyFinalized,
                message: Some("already finalized".into()),
            });
        }

        // Duplicate key: return the recorded state, mutate nothing
        if let Some(existing) =
            idempotency::find_by_key_for_update(&mut tx, &request.idempotency_key).await?
        {
            tx.commit().await?;
            return Ok(WebhookResponse {
                order_id: order.id,
                state: order_state,
                outcome: WebhookOutcome::Duplicate,
                message: Some(format!(
                    "duplicate delivery, recorded status: {}",
                    existing.status
                )),
            });
        }

        // First sighting: the insert claims the key and is the audit trail
        idempotency::insert(
            &mut tx,
            &request.idempotency_key,
            order.id,
            status.recorded_status(),
            now,
        )
        .await?;

        match status {
            WebhookStatus::Success => self.apply_success(tx, request, &order.hold_id, now).await,
            WebhookStatus::Failure => self.apply_failure(tx, request, &order.hold_id, now).await,
        }
    }

    async fn apply_success(
        &self,
        mut tx: Transaction<'_, Postgres>,
        request: &WebhookRequest,
        hold_id: &str,
        now: i64,
    ) -> ServiceResult<WebhookResponse> {
        let Some(hold) = self.registry.get(hold_id).await? else {
            // The hold aged out between order creation and now; the key
            // record must reflect the true outcome
            return self.cancel_for_vanished_hold(tx, request, now).await;
        };

        match hold.status {
            HoldStatus::Used => {
                // Fast path: an earlier delivery already committed the stock
                orders::update_state(&mut tx, request.order_id, OrderState::Paid.as_str(), now)
                    .await?;
                tx.commit().await?;
                Ok(WebhookResponse {
                    order_id: request.order_id,
                    state: OrderState::Paid,
                    outcome: WebhookOutcome::Applied,
                    message: Some("hold already committed".into()),
                })
            }
            HoldStatus::PaymentFailed => Err(AppError::new(ErrorCode::PaymentStateConflict)
                .with_detail("hold_id", hold_id)
                .into()),
            HoldStatus::Expired => Err(AppError::hold_invalid("hold is not active").into()),
            HoldStatus::Active => self.commit_payment(tx, request, &hold, now).await,
        }
    }

    /// Success against an active hold: guarded durable decrement, order to
    /// `paid`, then the scripted fast-store commit.
    async fn commit_payment(
        &self,
        mut tx: Transaction<'_, Postgres>,
        request: &WebhookRequest,
        hold: &Hold,
        now: i64,
    ) -> ServiceResult<WebhookResponse> {
        let affected =
            products::decrement_stock_guarded(&mut tx, hold.product_id, hold.qty, now).await?;
        if affected == 0 {
            let stock = products::get_stock(&mut tx, hold.product_id).await?;
            // Transaction dropped: the claimed key rolls back with it
            return Err(match stock {
                None => AppError::new(ErrorCode::ProductNotFound)
                    .with_detail("product_id", hold.product_id),
                Some(s) if s < hold.qty => AppError::new(ErrorCode::InsufficientStock)
                    .with_detail("stock", s)
                    .with_detail("qty", hold.qty),
                Some(_) => AppError::new(ErrorCode::ConcurrentStockModification)
                    .with_detail("product_id", hold.product_id),
            }
            .into());
        }

        orders::update_state(&mut tx, request.order_id, OrderState::Paid.as_str(), now).await?;
        tx.commit().await?;

        // Durable state is ahead of the cache from here; on script failure
        // the finalized short-circuit plus the admin refresh reconcile
        if let Err(err) = self.registry.commit(hold).await {
            tracing::error!(
                order_id = request.order_id,
                hold_id = %hold.id,
                error = ?err,
                "Order paid durably but fast-store commit failed"
            );
        }

        tracing::info!(
            order_id = request.order_id,
            hold_id = %hold.id,
            product_id = hold.product_id,
            qty = hold.qty,
            "Payment committed"
        );
        Ok(WebhookResponse {
            order_id: request.order_id,
            state: OrderState::Paid,
            outcome: WebhookOutcome::Applied,
            message: None,
        })
    }

    async fn apply_failure(
        &self,
        mut tx: Transaction<'_, Postgres>,
        request: &WebhookRequest,
        hold_id: &str,
        now: i64,
    ) -> ServiceResult<WebhookResponse> {
        let Some(hold) = self.registry.get(hold_id).await? else {
            return self.cancel_for_vanished_hold(tx, request, now).await;
        };

        match hold.status {
            HoldStatus::Used => Err(AppError::new(ErrorCode::PaymentStateConflict)
                .with_detail("hold_id", hold_id)
                .into()),
            HoldStatus::Active => {
                // Refund before the durable cancel commits: a crash between
                // the two leaves the order pending and the retry lands on
                // the vanished-hold path
                self.registry.release(hold_id).await?;
                orders::update_state(
                    &mut tx,
                    request.order_id,
                    OrderState::Cancelled.as_str(),
                    now,
                )
                .await?;
                tx.commit().await?;

                tracing::info!(
                    order_id = request.order_id,
                    hold_id = %hold.id,
                    qty = hold.qty,
                    "Payment failed, reservation refunded"
                );
                Ok(WebhookResponse {
                    order_id: request.order_id,
                    state: OrderState::Cancelled,
                    outcome: WebhookOutcome::Applied,
                    message: None,
                })
            }
            _ => Err(AppError::hold_invalid("hold is not active").into()),
        }
    }

    /// The hold no longer exists: the order cannot complete. Cancel it and
    /// respond 410; the key record is corrected to `failed`.
    async fn cancel_for_vanished_hold(
        &self,
        mut tx: Transaction<'_, Postgres>,
        request: &WebhookRequest,
        now: i64,
    ) -> ServiceResult<WebhookResponse> {
        idempotency::update_status(&mut tx, &request.idempotency_key, "failed", now).await?;
        orders::update_state(
            &mut tx,
            request.order_id,
            OrderState::Cancelled.as_str(),
            now,
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            order_id = request.order_id,
            "Hold expired before webhook, order cancelled"
        );
        Err(AppError::with_message(
            ErrorCode::HoldExpired,
            "hold expired before payment confirmation; order cancelled",
        )
        .with_detail("order_id", request.order_id)
        .into())
    }
}
