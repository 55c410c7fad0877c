//! Hold Model
//!
//! A hold is a time-limited stock reservation living in the fast store.
//! Active holds contribute their quantity to the product's reserved counter;
//! terminal holds (`used`, `expired`, `payment_failed`) are deleted from the
//! fast store after their transition (the durable order row keeps the hold id
//! for audit).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::stock::StockSnapshot;

/// Hold lifecycle status
///
/// Wire representation is lowercase (`active`, `used`, ...), matching the
/// status strings stored in the fast-store hash and index keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    /// Reservation is live and counted in `reserved`
    Active,
    /// Converted to a paid order; units permanently consumed
    Used,
    /// Aged out; units were refunded to `available`
    Expired,
    /// Payment failed; units were refunded to `available`
    PaymentFailed,
}

impl HoldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Used => "used",
            Self::Expired => "expired",
            Self::PaymentFailed => "payment_failed",
        }
    }

    /// Terminal statuses delete the hold hash from the fast store
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl FromStr for HoldStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "used" => Ok(Self::Used),
            "expired" => Ok(Self::Expired),
            "payment_failed" => Ok(Self::PaymentFailed),
            other => Err(format!("unknown hold status: {other}")),
        }
    }
}

impl fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hold record as materialized from the fast-store hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hold {
    /// Globally unique hold id (UUID v4)
    pub id: String,
    pub product_id: i64,
    pub qty: i64,
    pub status: HoldStatus,
    /// Wall-clock creation time (RFC 3339)
    pub created_at: String,
    /// Wall-clock expiry (RFC 3339)
    pub expires_at: String,
    /// Expiry in integer epoch seconds; the expiring index scores by this
    pub expires_at_epoch: i64,
    /// Stock version captured at creation
    pub version: i64,
    /// Stamped when the hold is validated during order creation (audit)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<i64>,
}

/// Create hold payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldCreate {
    pub product_id: i64,
    pub qty: i64,
}

/// Response for a successful hold creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldCreated {
    pub hold_id: String,
    pub expires_at: String,
    pub product_id: i64,
    pub quantity: i64,
    pub available_stock: i64,
    pub reserved_stock: i64,
    pub version: i64,
}

impl HoldCreated {
    pub fn from_snapshot(
        hold_id: String,
        expires_at: String,
        product_id: i64,
        quantity: i64,
        snapshot: StockSnapshot,
    ) -> Self {
        Self {
            hold_id,
            expires_at,
            product_id,
            quantity,
            available_stock: snapshot.available,
            reserved_stock: snapshot.reserved,
            version: snapshot.version,
        }
    }
}

/// Result of releasing or expiring a hold
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoldReleased {
    pub hold_id: String,
    pub product_id: i64,
    /// Quantity returned to `available` (zero when already terminal)
    pub quantity_released: i64,
    pub available_stock: i64,
    pub reserved_stock: i64,
    pub version: i64,
}
