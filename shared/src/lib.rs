//! Shared types for the checkout coordinator
//!
//! Common types used across crates: domain models, error types and the
//! unified API response structure.

pub mod error;
pub mod models;

// Re-exports
pub use http;
pub use serde::{Deserialize, Serialize};
