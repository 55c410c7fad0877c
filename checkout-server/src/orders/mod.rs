//! Order creation from a hold
//!
//! The order row does not mark the hold as used — that is deferred to
//! webhook success, so an unanswered webhook never strands inventory: the
//! hold simply ages out and the reaper releases the units.

use chrono::Utc;
use sqlx::PgPool;

use shared::error::{AppError, ErrorCode};
use shared::models::{OrderCreated, OrderState};

use crate::db::{self, orders};
use crate::error::{ServiceError, ServiceResult};
use crate::fast_store::FastStore;
use crate::holds::HoldRegistry;

/// Creates durable orders from validated active holds
#[derive(Clone)]
pub struct OrderService {
    fast: FastStore,
    registry: HoldRegistry,
    pool: PgPool,
}

impl OrderService {
    pub fn new(fast: FastStore, registry: HoldRegistry, pool: PgPool) -> Self {
        Self {
            fast,
            registry,
            pool,
        }
    }

    /// Create a `pending_payment` order from an active, unexpired hold
    pub async fn create_from_hold(&self, hold_id: &str) -> ServiceResult<OrderCreated> {
        // Fail fast when the fast store is down; the hold cannot be
        // validated without it
        if let Err(err) = self.fast.ping().await {
            tracing::error!(error = %err, "Fast store probe failed during order creation");
            return Err(AppError::fast_store_unavailable().into());
        }

        let hold = match self.registry.validate_for_order(hold_id).await {
            Ok(hold) => hold,
            Err(ServiceError::App(app)) if app.code == ErrorCode::ConcurrentModification => {
                return Err(AppError::with_message(
                    ErrorCode::CreateOrderFailed,
                    "hold validation kept conflicting; try again",
                )
                .with_detail("hold_id", hold_id)
                .into());
            }
            Err(other) => return Err(other),
        };

        let now = Utc::now().timestamp();
        let order_id = match orders::insert(&self.pool, hold_id, now).await {
            Ok(id) => id,
            // One live order per hold (partial unique index)
            Err(err) if db::is_unique_violation(&err) => {
                return Err(AppError::with_message(
                    ErrorCode::AlreadyExists,
                    "an order for this hold is already awaiting payment",
                )
                .with_detail("hold_id", hold_id)
                .into());
            }
            Err(err) => return Err(err.into()),
        };

        tracing::info!(order_id, %hold_id, product_id = hold.product_id, "Created order");
        Ok(OrderCreated {
            order_id,
            state: OrderState::PendingPayment,
            hold_id: hold_id.to_string(),
            product_id: hold.product_id,
            quantity: hold.qty,
        })
    }
}
