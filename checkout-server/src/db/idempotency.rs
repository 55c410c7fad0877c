//! Idempotency-key repository
//!
//! One row per unique webhook key. Presence means "this key has been
//! observed and acted upon"; the insert both claims the key and serves as
//! the audit trail.

use sqlx::PgConnection;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IdempotencyRecord {
    pub id: i64,
    pub key: String,
    pub order_id: i64,
    pub status: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Look up a key with a write lock (read-then-act on duplicates)
pub async fn find_by_key_for_update(
    conn: &mut PgConnection,
    key: &str,
) -> Result<Option<IdempotencyRecord>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM idempotency_keys WHERE key = $1 FOR UPDATE")
        .bind(key)
        .fetch_optional(conn)
        .await
}

/// Claim a key; the unique constraint rejects concurrent duplicates
pub async fn insert(
    conn: &mut PgConnection,
    key: &str,
    order_id: i64,
    status: &str,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO idempotency_keys (key, order_id, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $4)",
    )
    .bind(key)
    .bind(order_id)
    .bind(status)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}

/// Correct a claimed key when the dispatch outcome diverged from the
/// webhook's reported status (e.g. success webhook against a vanished hold)
pub async fn update_status(
    conn: &mut PgConnection,
    key: &str,
    status: &str,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE idempotency_keys SET status = $2, updated_at = $3 WHERE key = $1")
        .bind(key)
        .bind(status)
        .bind(now)
        .execute(conn)
        .await?;
    Ok(())
}

/// Record a key observed against an already-finalized order; first writer wins
pub async fn upsert(
    conn: &mut PgConnection,
    key: &str,
    order_id: i64,
    status: &str,
    now: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO idempotency_keys (key, order_id, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $4)
         ON CONFLICT (key) DO NOTHING",
    )
    .bind(key)
    .bind(order_id)
    .bind(status)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(())
}
