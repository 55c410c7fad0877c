//! Flash-sale checkout coordinator
//!
//! Mediates a three-step purchase funnel against limited-inventory
//! products: reserve units (a *hold*), convert the hold into an order
//! awaiting payment, then commit or roll back when the payment processor
//! reports back via webhook. Stock correctness — no overselling, no stuck
//! reservations, no double-charging — is maintained under contention while
//! holds silently age out.
//!
//! # Module structure
//!
//! ```text
//! checkout-server/src/
//! ├── config.rs      # env-driven configuration
//! ├── state.rs       # shared AppState (pools, services)
//! ├── error.rs       # ServiceError bridge (stores -> AppError)
//! ├── fast_store/    # capability layer over the in-memory store
//! ├── stock/         # per-product counters (the stock ledger)
//! ├── holds/         # hold lifecycle + transition scripts
//! ├── orders/        # order creation from a validated hold
//! ├── payments/      # idempotent webhook coordinator
//! ├── reaper.rs      # background expiry sweeper
//! ├── db/            # durable-store repositories (sqlx)
//! └── api/           # HTTP routes and handlers
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod fast_store;
pub mod holds;
pub mod orders;
pub mod payments;
pub mod reaper;
pub mod state;
pub mod stock;

// Re-export common types
pub use config::Config;
pub use error::{ServiceError, ServiceResult};
pub use fast_store::FastStore;
pub use holds::HoldRegistry;
pub use reaper::ExpiryReaper;
pub use state::AppState;
pub use stock::StockLedger;
