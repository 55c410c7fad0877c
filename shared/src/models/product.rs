//! Product Model

use serde::{Deserialize, Serialize};

/// Product view for API responses
///
/// Combines the durable row (`total_stock` = remaining base stock) with the
/// live fast-store counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductView {
    pub id: i64,
    pub name: String,
    pub price: f64,
    /// Remaining base stock in the durable store (decremented on paid orders)
    pub total_stock: i64,
    pub available_stock: i64,
    pub reserved_stock: i64,
    /// Sum of active hold quantities
    pub active_holds: i64,
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_view_serialize() {
        let view = ProductView {
            id: 1,
            name: "Limited Drop".into(),
            price: 99.0,
            total_stock: 10,
            available_stock: 7,
            reserved_stock: 3,
            active_holds: 3,
            version: 21,
        };
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("\"available_stock\":7"));
        assert!(json.contains("\"active_holds\":3"));
    }
}
