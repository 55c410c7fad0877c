//! Stock snapshot model

use serde::{Deserialize, Serialize};

/// Point-in-time reading of a product's stock counters
///
/// `version` increases monotonically with every mutation and doubles as an
/// optimistic-concurrency signal for clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockSnapshot {
    /// Units currently free to be reserved
    pub available: i64,
    /// Units held by currently-active holds
    pub reserved: i64,
    /// Monotonic mutation counter
    pub version: i64,
}

impl StockSnapshot {
    pub fn new(available: i64, reserved: i64, version: i64) -> Self {
        Self {
            available,
            reserved,
            version,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_serialize() {
        let snap = StockSnapshot::new(7, 3, 12);
        let json = serde_json::to_string(&snap).unwrap();
        assert_eq!(json, r#"{"available":7,"reserved":3,"version":12}"#);
    }
}
