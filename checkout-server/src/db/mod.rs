//! Durable-store access layer

pub mod idempotency;
pub mod orders;
pub mod products;

/// Deadlock-class errors are retried by callers; everything else propagates.
///
/// Postgres: 40001 serialization_failure, 40P01 deadlock_detected.
pub fn is_deadlock(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
        }
        _ => false,
    }
}

/// Postgres 23505: unique constraint violation
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_deadlock_non_database_error() {
        assert!(!is_deadlock(&sqlx::Error::RowNotFound));
        assert!(!is_deadlock(&sqlx::Error::PoolClosed));
    }
}
