//! Fast-store key construction
//!
//! Key naming is part of the wire contract; everything that talks to the
//! fast store goes through these builders.

/// Hold hash: `hold:{id}`
pub fn hold(hold_id: &str) -> String {
    format!("hold:{hold_id}")
}

/// Available units counter: `available_stock:{product_id}`
pub fn available_stock(product_id: i64) -> String {
    format!("available_stock:{product_id}")
}

/// Reserved units counter: `reserved_stock:{product_id}`
pub fn reserved_stock(product_id: i64) -> String {
    format!("reserved_stock:{product_id}")
}

/// Monotonic version counter: `stock_version:{product_id}`
pub fn stock_version(product_id: i64) -> String {
    format!("stock_version:{product_id}")
}

/// Sum of active hold quantities: `active_holds:{product_id}`
pub fn active_holds(product_id: i64) -> String {
    format!("active_holds:{product_id}")
}

/// Set of hold ids per product: `product_holds:{product_id}`
pub fn product_holds(product_id: i64) -> String {
    format!("product_holds:{product_id}")
}

/// Sorted set of hold ids scored by expiry epoch: `expiring_index:{product_id}`
pub fn expiring_index(product_id: i64) -> String {
    format!("expiring_index:{product_id}")
}

/// Pattern matching every product's expiring index
pub const EXPIRING_INDEX_PATTERN: &str = "expiring_index:*";

/// Set of hold ids per status: `holds_by_status:{status}`
pub fn holds_by_status(status: &str) -> String {
    format!("holds_by_status:{status}")
}

/// Per-hold expiry mutual-exclusion lease: `expire_lock:{hold_id}`
pub fn expire_lock(hold_id: &str) -> String {
    format!("expire_lock:{hold_id}")
}

/// Per-product lazy-init guard (5 s lease): `stock_init:{product_id}`
pub fn stock_init(product_id: i64) -> String {
    format!("stock_init:{product_id}")
}

/// Reaper liveness heartbeat hash
pub const REAPER_HEARTBEAT: &str = "reaper:heartbeat";

/// Extract the product id from an `expiring_index:{p}` key
pub fn product_id_from_expiring_index(key: &str) -> Option<i64> {
    key.strip_prefix("expiring_index:")?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_formats() {
        assert_eq!(hold("abc"), "hold:abc");
        assert_eq!(available_stock(7), "available_stock:7");
        assert_eq!(reserved_stock(7), "reserved_stock:7");
        assert_eq!(stock_version(7), "stock_version:7");
        assert_eq!(active_holds(7), "active_holds:7");
        assert_eq!(product_holds(7), "product_holds:7");
        assert_eq!(expiring_index(7), "expiring_index:7");
        assert_eq!(holds_by_status("active"), "holds_by_status:active");
        assert_eq!(expire_lock("abc"), "expire_lock:abc");
        assert_eq!(stock_init(7), "stock_init:7");
    }

    #[test]
    fn test_product_id_from_expiring_index() {
        assert_eq!(product_id_from_expiring_index("expiring_index:42"), Some(42));
        assert_eq!(product_id_from_expiring_index("expiring_index:x"), None);
        assert_eq!(product_id_from_expiring_index("product_holds:42"), None);
    }
}
