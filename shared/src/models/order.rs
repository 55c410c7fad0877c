//! Order and webhook models

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Order state (durable ledger)
///
/// Canonical set; transitions only move forward:
/// `pending_payment` → `paid` | `cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    PendingPayment,
    Paid,
    Cancelled,
}

impl OrderState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    /// Finalized orders never change state again
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }
}

impl FromStr for OrderState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_payment" => Ok(Self::PendingPayment),
            "paid" => Ok(Self::Paid),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown order state: {other}")),
        }
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Create order payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreate {
    pub hold_id: String,
}

/// Response for a successful order creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: i64,
    pub state: OrderState,
    pub hold_id: String,
    pub product_id: i64,
    pub quantity: i64,
}

/// Payment webhook payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub idempotency_key: String,
    pub order_id: i64,
    /// 'success' or 'failure'
    pub status: String,
}

/// Parsed webhook status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookStatus {
    Success,
    Failure,
}

impl WebhookStatus {
    /// Idempotency record status this webhook maps to
    pub fn recorded_status(&self) -> &'static str {
        match self {
            Self::Success => "paid",
            Self::Failure => "failed",
        }
    }
}

impl FromStr for WebhookStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            other => Err(format!("unknown webhook status: {other}")),
        }
    }
}

/// How a webhook delivery was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// First delivery for this key; the transition was applied
    Applied,
    /// Key seen before; recorded state returned, no mutations
    Duplicate,
    /// Order was already paid or cancelled; safe no-op
    AlreadyFinalized,
}

/// Canonical webhook response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub order_id: i64,
    pub state: OrderState,
    pub outcome: WebhookOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_state_roundtrip() {
        for state in [
            OrderState::PendingPayment,
            OrderState::Paid,
            OrderState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<OrderState>().unwrap(), state);
        }
    }

    #[test]
    fn test_order_state_rejects_legacy_seeder_values() {
        // The old seeder enum (pending/processing/completed) is not canonical
        assert!("pending".parse::<OrderState>().is_err());
        assert!("processing".parse::<OrderState>().is_err());
        assert!("completed".parse::<OrderState>().is_err());
    }

    #[test]
    fn test_order_state_is_final() {
        assert!(!OrderState::PendingPayment.is_final());
        assert!(OrderState::Paid.is_final());
        assert!(OrderState::Cancelled.is_final());
    }

    #[test]
    fn test_webhook_status_parse() {
        assert_eq!(
            "success".parse::<WebhookStatus>().unwrap(),
            WebhookStatus::Success
        );
        assert_eq!(
            "failure".parse::<WebhookStatus>().unwrap(),
            WebhookStatus::Failure
        );
        assert!("ok".parse::<WebhookStatus>().is_err());
    }

    #[test]
    fn test_webhook_status_recorded() {
        assert_eq!(WebhookStatus::Success.recorded_status(), "paid");
        assert_eq!(WebhookStatus::Failure.recorded_status(), "failed");
    }

    #[test]
    fn test_webhook_outcome_serialize() {
        assert_eq!(
            serde_json::to_string(&WebhookOutcome::AlreadyFinalized).unwrap(),
            "\"already_finalized\""
        );
    }
}
