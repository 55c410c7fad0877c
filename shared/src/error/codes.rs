//! Unified error codes for the checkout coordinator
//!
//! This module defines all error codes used across the server and clients.
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Hold errors
//! - 2xxx: Stock errors
//! - 3xxx: Product errors
//! - 4xxx: Order errors
//! - 5xxx: Payment/webhook errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,

    // ==================== 1xxx: Hold ====================
    /// Hold not found
    HoldNotFound = 1001,
    /// Hold has already been converted into an order and paid
    HoldAlreadyUsed = 1002,
    /// Hold has expired
    HoldExpired = 1003,
    /// Hold has not expired yet (premature expire attempt)
    HoldNotExpired = 1004,
    /// Hold is in an invalid state for the requested operation
    HoldInvalid = 1005,

    // ==================== 2xxx: Stock ====================
    /// Not enough available stock to satisfy the reservation
    InsufficientStock = 2001,
    /// Release would drive the reserved counter negative
    InvalidRelease = 2002,
    /// Durable stock row changed underneath a guarded decrement
    ConcurrentStockModification = 2003,
    /// Stock counters are not initialized for this product
    StockNotInitialized = 2004,

    // ==================== 3xxx: Product ====================
    /// Product not found
    ProductNotFound = 3001,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order creation failed after retries
    CreateOrderFailed = 4002,
    /// Order is in a conflicting state for the requested transition
    OrderStateConflict = 4003,
    /// Order state value is not one of the canonical states
    OrderStateInvalid = 4004,

    // ==================== 5xxx: Payment ====================
    /// Webhook outcome conflicts with the hold's payment state
    PaymentStateConflict = 5001,
    /// Webhook status is not 'success' or 'failure'
    WebhookInvalidStatus = 5002,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Fast store (reservation cache) is unavailable
    FastStoreUnavailable = 9003,
    /// Concurrent modification retries exhausted
    ConcurrentModification = 9004,
    /// Configuration error
    ConfigError = 9005,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",

            // Hold
            ErrorCode::HoldNotFound => "Hold not found",
            ErrorCode::HoldAlreadyUsed => "Hold has already been used",
            ErrorCode::HoldExpired => "Hold has expired",
            ErrorCode::HoldNotExpired => "Hold has not expired yet",
            ErrorCode::HoldInvalid => "Hold is in an invalid state",

            // Stock
            ErrorCode::InsufficientStock => "Insufficient available stock",
            ErrorCode::InvalidRelease => "Release exceeds reserved stock",
            ErrorCode::ConcurrentStockModification => "Stock was modified concurrently",
            ErrorCode::StockNotInitialized => "Stock counters are not initialized",

            // Product
            ErrorCode::ProductNotFound => "Product not found",

            // Order
            ErrorCode::OrderNotFound => "Order not found",
            ErrorCode::CreateOrderFailed => "Order creation failed",
            ErrorCode::OrderStateConflict => "Order state conflict",
            ErrorCode::OrderStateInvalid => "Order state is not canonical",

            // Payment
            ErrorCode::PaymentStateConflict => "Payment state conflict",
            ErrorCode::WebhookInvalidStatus => "Webhook status must be 'success' or 'failure'",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::FastStoreUnavailable => "Fast store is unavailable",
            ErrorCode::ConcurrentModification => "Concurrent modification, retries exhausted",
            ErrorCode::ConfigError => "Configuration error",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),

            // Hold
            1001 => Ok(ErrorCode::HoldNotFound),
            1002 => Ok(ErrorCode::HoldAlreadyUsed),
            1003 => Ok(ErrorCode::HoldExpired),
            1004 => Ok(ErrorCode::HoldNotExpired),
            1005 => Ok(ErrorCode::HoldInvalid),

            // Stock
            2001 => Ok(ErrorCode::InsufficientStock),
            2002 => Ok(ErrorCode::InvalidRelease),
            2003 => Ok(ErrorCode::ConcurrentStockModification),
            2004 => Ok(ErrorCode::StockNotInitialized),

            // Product
            3001 => Ok(ErrorCode::ProductNotFound),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::CreateOrderFailed),
            4003 => Ok(ErrorCode::OrderStateConflict),
            4004 => Ok(ErrorCode::OrderStateInvalid),

            // Payment
            5001 => Ok(ErrorCode::PaymentStateConflict),
            5002 => Ok(ErrorCode::WebhookInvalidStatus),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::FastStoreUnavailable),
            9004 => Ok(ErrorCode::ConcurrentModification),
            9005 => Ok(ErrorCode::ConfigError),

            other => Err(InvalidErrorCode(other)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}
