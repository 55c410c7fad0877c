//! Order repository
//!
//! Orders are the durable ledger: created in `pending_payment` from a
//! validated hold, finalized exactly once by the webhook processor.

use sqlx::{PgConnection, PgPool};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub hold_id: String,
    pub state: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Insert a fresh order in `pending_payment`; returns the generated id
pub async fn insert(pool: &PgPool, hold_id: &str, now: i64) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        "INSERT INTO orders (hold_id, state, created_at, updated_at)
         VALUES ($1, 'pending_payment', $2, $2)
         RETURNING id",
    )
    .bind(hold_id)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Lock the order row for the duration of webhook processing
pub async fn lock_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(conn)
        .await
}

/// Forward-only state transition stamp
pub async fn update_state(
    conn: &mut PgConnection,
    id: i64,
    state: &str,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET state = $2, updated_at = $3 WHERE id = $1")
        .bind(id)
        .bind(state)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}
