//! Unified service-layer error type
//!
//! `ServiceError` bridges the gap between store-layer errors (`sqlx::Error`,
//! `redis::RedisError`) and the API-layer error (`AppError`). It enables `?`
//! propagation without manual `.map_err(|e| { tracing::error!(...); ... })`
//! boilerplate.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};

/// Service-layer error — three variants, keeps things simple.
///
/// - `Db`: durable-store errors (auto-logged, mapped to DatabaseError)
/// - `Fast`: fast-store transport errors (auto-logged, mapped to
///   FastStoreUnavailable)
/// - `App`: business-rule errors (transparent pass-through to client)
#[derive(Debug)]
pub enum ServiceError {
    /// Durable store error
    Db(sqlx::Error),
    /// Fast store transport error
    Fast(redis::RedisError),
    /// Business-rule error (already an AppError with the correct ErrorCode)
    App(AppError),
}

impl From<sqlx::Error> for ServiceError {
    fn from(e: sqlx::Error) -> Self {
        ServiceError::Db(e)
    }
}

impl From<redis::RedisError> for ServiceError {
    fn from(e: redis::RedisError) -> Self {
        ServiceError::Fast(e)
    }
}

impl From<AppError> for ServiceError {
    fn from(e: AppError) -> Self {
        ServiceError::App(e)
    }
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::App(app_err) => app_err,
            ServiceError::Db(db_err) => {
                tracing::error!(error = %db_err, "Durable store error");
                AppError::new(ErrorCode::DatabaseError)
            }
            ServiceError::Fast(redis_err) => {
                tracing::error!(error = %redis_err, "Fast store error");
                AppError::new(ErrorCode::FastStoreUnavailable)
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

/// Convenience type alias for service-layer results
pub type ServiceResult<T> = Result<T, ServiceError>;
