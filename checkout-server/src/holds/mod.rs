//! Hold Registry
//!
//! Owns hold records and the three per-product indices (`product_holds`,
//! `expiring_index`, `holds_by_status:active`). Creation runs as one
//! optimistic transaction bundling the stock-ledger mutation with the hold
//! materialization; every transition out of `active` runs as a server-side
//! script, so a hold is never observable half-indexed.

pub mod scripts;

use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use shared::error::{AppError, ErrorCode};
use shared::models::{Hold, HoldCreated, HoldReleased, HoldStatus, StockSnapshot};

use crate::db::products;
use crate::error::ServiceResult;
use crate::fast_store::{keys, FastStore};
use crate::stock::{InitOutcome, StockLedger};

/// Bounded optimistic retries: 3 attempts, linear backoff (100 ms × attempt)
const MAX_TXN_ATTEMPTS: u32 = 3;
const TXN_BACKOFF_MS: u64 = 100;

/// Outcome of an expire attempt
#[derive(Debug, Clone)]
pub enum ExpireOutcome {
    /// The hold was expired; units refunded
    Expired(HoldReleased),
    /// The hold was already terminalized (or never existed); nothing released
    AlreadyGone,
    /// The hold's deadline has not passed yet
    NotExpired { seconds_remaining: i64 },
}

/// Outcome of a bulk expire round trip
#[derive(Debug, Clone)]
pub struct BulkExpired {
    pub expired: i64,
    pub quantity_released: i64,
    pub snapshot: StockSnapshot,
}

/// Lifecycle management for individual reservations
#[derive(Clone)]
pub struct HoldRegistry {
    fast: FastStore,
    ledger: StockLedger,
    pool: PgPool,
    hold_ttl_secs: i64,
}

impl HoldRegistry {
    pub fn new(fast: FastStore, ledger: StockLedger, pool: PgPool, hold_ttl_secs: i64) -> Self {
        Self {
            fast,
            ledger,
            pool,
            hold_ttl_secs,
        }
    }

    /// Create a hold: reserve `qty` units and materialize the record.
    ///
    /// One optimistic transaction watching the four product stock keys and
    /// the two product indices; on conflict, bounded linear retries; after
    /// exhaustion (or when the counters never initialized) the pessimistic
    /// row-lock path takes over.
    pub async fn create(&self, product_id: i64, qty: i64) -> ServiceResult<HoldCreated> {
        if self.ledger.ensure_initialized(product_id).await? == InitOutcome::Uninitialized {
            return self.create_under_lock(product_id, qty).await;
        }

        let hold_id = Uuid::new_v4().to_string();
        let created = Utc::now();
        let expires = created + ChronoDuration::seconds(self.hold_ttl_secs);
        let expires_at_epoch = expires.timestamp();

        let hold_key = keys::hold(&hold_id);
        let [available_key, reserved_key, version_key] = StockLedger::counter_keys(product_id);
        let active_key = keys::active_holds(product_id);
        let product_holds_key = keys::product_holds(product_id);
        let expiring_key = keys::expiring_index(product_id);
        let status_key = keys::holds_by_status(HoldStatus::Active.as_str());

        let watched = vec![
            available_key,
            reserved_key,
            version_key,
            active_key.clone(),
            product_holds_key.clone(),
            expiring_key.clone(),
        ];

        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let mut txn = self.fast.txn().await?;
            txn.watch(&watched).await?;

            let mut pipe = redis::pipe();
            pipe.atomic();
            let snapshot = self
                .ledger
                .stage_reserve(&mut txn, &mut pipe, product_id, qty)
                .await?;

            pipe.hset_multiple(
                &hold_key,
                &[
                    ("product_id", product_id.to_string()),
                    ("qty", qty.to_string()),
                    ("status", HoldStatus::Active.as_str().to_string()),
                    ("created_at", created.to_rfc3339()),
                    ("expires_at", expires.to_rfc3339()),
                    ("expires_at_epoch", expires_at_epoch.to_string()),
                    ("version", snapshot.version.to_string()),
                ],
            )
            .ignore();
            pipe.sadd(&product_holds_key, &hold_id).ignore();
            pipe.zadd(&expiring_key, &hold_id, expires_at_epoch).ignore();
            pipe.sadd(&status_key, &hold_id).ignore();
            pipe.incr(&active_key, qty).ignore();

            match txn.exec::<()>(&pipe).await? {
                Some(()) => {
                    tracing::debug!(%hold_id, product_id, qty, "Created hold");
                    return Ok(HoldCreated::from_snapshot(
                        hold_id,
                        expires.to_rfc3339(),
                        product_id,
                        qty,
                        snapshot,
                    ));
                }
                None => {
                    tracing::debug!(product_id, attempt, "Hold creation conflict, retrying");
                    tokio::time::sleep(Duration::from_millis(TXN_BACKOFF_MS * attempt as u64))
                        .await;
                }
            }
        }

        self.create_under_lock(product_id, qty).await
    }

    /// Pessimistic creation path: the durable product row lock serializes
    /// contenders across instances while a single script performs the
    /// check-and-reserve plus materialization (seeding absent counters from
    /// the locked row).
    async fn create_under_lock(&self, product_id: i64, qty: i64) -> ServiceResult<HoldCreated> {
        let mut tx = self.pool.begin().await?;
        let product = products::lock_by_id(&mut tx, product_id)
            .await?
            .ok_or_else(|| {
                AppError::new(ErrorCode::ProductNotFound).with_detail("product_id", product_id)
            })?;

        let hold_id = Uuid::new_v4().to_string();
        let created = Utc::now();
        let expires = created + ChronoDuration::seconds(self.hold_ttl_secs);
        let expires_at_epoch = expires.timestamp();

        let [available_key, reserved_key, version_key] = StockLedger::counter_keys(product_id);
        let script_keys = [
            available_key,
            reserved_key,
            version_key,
            keys::active_holds(product_id),
            keys::product_holds(product_id),
            keys::expiring_index(product_id),
            keys::holds_by_status(HoldStatus::Active.as_str()),
            keys::hold(&hold_id),
        ];
        let result: Vec<i64> = self
            .fast
            .eval(
                &scripts::CREATE_HOLD_LOCKED,
                &script_keys,
                &[
                    qty.to_string(),
                    product.stock.to_string(),
                    hold_id.clone(),
                    created.to_rfc3339(),
                    expires.to_rfc3339(),
                    expires_at_epoch.to_string(),
                    product_id.to_string(),
                ],
            )
            .await?;
        tx.commit().await?;

        let snapshot = StockSnapshot::new(result[1], result[2], result[3]);
        match result[0] {
            scripts::OK => {
                tracing::info!(%hold_id, product_id, qty, "Created hold via pessimistic path");
                Ok(HoldCreated::from_snapshot(
                    hold_id,
                    expires.to_rfc3339(),
                    product_id,
                    qty,
                    snapshot,
                ))
            }
            _ => Err(AppError::insufficient_stock(
                snapshot.available,
                snapshot.reserved,
                snapshot.version,
            )
            .into()),
        }
    }

    /// Fetch a single hold; absent hashes yield `None`
    pub async fn get(&self, hold_id: &str) -> ServiceResult<Option<Hold>> {
        let map = self.fast.hash_get_all(&keys::hold(hold_id)).await?;
        Ok(parse_hold(hold_id, &map))
    }

    /// Fetch many holds in one round trip; absent ids are skipped
    pub async fn get_many(&self, hold_ids: &[String]) -> ServiceResult<Vec<Hold>> {
        let hash_keys: Vec<String> = hold_ids.iter().map(|id| keys::hold(id)).collect();
        let maps = self.fast.hash_get_all_many(&hash_keys).await?;
        Ok(hold_ids
            .iter()
            .zip(maps.iter())
            .filter_map(|(id, map)| parse_hold(id, map))
            .collect())
    }

    /// List a product's live holds (index membership + hydration)
    pub async fn list_by_product(&self, product_id: i64) -> ServiceResult<Vec<Hold>> {
        let ids = self
            .fast
            .set_members(&keys::product_holds(product_id))
            .await?;
        self.get_many(&ids).await
    }

    /// Caller-initiated cancel: refund the units and drop the record.
    ///
    /// Also invoked by the webhook failure path (same mutation set).
    pub async fn release(&self, hold_id: &str) -> ServiceResult<HoldReleased> {
        let hold = self
            .get(hold_id)
            .await?
            .ok_or_else(|| AppError::new(ErrorCode::HoldNotFound).with_detail("hold_id", hold_id))?;

        let result: Vec<i64> = self
            .fast
            .eval(
                &scripts::RELEASE_HOLD,
                &release_keys(&hold, hold_id),
                &[hold_id.to_string()],
            )
            .await?;

        match result[0] {
            scripts::OK => Ok(HoldReleased {
                hold_id: hold_id.to_string(),
                product_id: hold.product_id,
                quantity_released: result[1],
                available_stock: result[2],
                reserved_stock: result[3],
                version: result[4],
            }),
            scripts::ABSENT => {
                Err(AppError::new(ErrorCode::HoldNotFound)
                    .with_detail("hold_id", hold_id)
                    .into())
            }
            scripts::NOT_ACTIVE => Err(AppError::hold_invalid("hold is not active").into()),
            _ => Err(invalid_release(hold_id, result[1], result[3]).into()),
        }
    }

    /// Timeout-driven transition; gated on `expires_at_epoch <= now`
    pub async fn expire(&self, hold_id: &str, now_epoch: i64) -> ServiceResult<ExpireOutcome> {
        let Some(hold) = self.get(hold_id).await? else {
            return Ok(ExpireOutcome::AlreadyGone);
        };

        let result: Vec<i64> = self
            .fast
            .eval(
                &scripts::EXPIRE_HOLD,
                &release_keys(&hold, hold_id),
                &[hold_id.to_string(), now_epoch.to_string()],
            )
            .await?;

        match result[0] {
            scripts::OK => Ok(ExpireOutcome::Expired(HoldReleased {
                hold_id: hold_id.to_string(),
                product_id: hold.product_id,
                quantity_released: result[1],
                available_stock: result[2],
                reserved_stock: result[3],
                version: result[4],
            })),
            scripts::ABSENT | scripts::NOT_ACTIVE => Ok(ExpireOutcome::AlreadyGone),
            scripts::NOT_EXPIRED => Ok(ExpireOutcome::NotExpired {
                seconds_remaining: result[1],
            }),
            _ => Err(invalid_release(hold_id, result[1], result[3]).into()),
        }
    }

    /// Commit a hold after confirmed payment: units permanently leave the
    /// system (`available` untouched, `reserved` drops)
    pub async fn commit(&self, hold: &Hold) -> ServiceResult<()> {
        let script_keys = [
            keys::hold(&hold.id),
            keys::reserved_stock(hold.product_id),
            keys::stock_version(hold.product_id),
            keys::active_holds(hold.product_id),
            keys::product_holds(hold.product_id),
            keys::expiring_index(hold.product_id),
            keys::holds_by_status(HoldStatus::Active.as_str()),
        ];
        let result: Vec<i64> = self
            .fast
            .eval(&scripts::COMMIT_HOLD, &script_keys, &[hold.id.clone()])
            .await?;

        match result[0] {
            scripts::OK => Ok(()),
            scripts::ABSENT | scripts::NOT_ACTIVE => {
                // Raced with the reaper after the durable side finalized;
                // the admin refresh reconciles the counters
                tracing::warn!(hold_id = %hold.id, code = result[0], "Hold vanished before commit");
                Ok(())
            }
            _ => Err(invalid_release(&hold.id, result[1], result[2]).into()),
        }
    }

    /// Find up to `limit` expired candidates across all products.
    ///
    /// Walks every product's expiring index with a bounded range query,
    /// hydrates candidates in one pipelined round trip and filters to those
    /// still active (a concurrent release may have terminalized them).
    pub async fn find_expired(&self, limit: usize, now_epoch: i64) -> ServiceResult<Vec<Hold>> {
        let index_keys = self.fast.keys_matching(keys::EXPIRING_INDEX_PATTERN).await?;

        let mut candidate_ids: Vec<String> = Vec::new();
        for index_key in index_keys {
            if candidate_ids.len() >= limit {
                break;
            }
            let remaining = limit - candidate_ids.len();
            let ids = self
                .fast
                .sorted_set_range_by_score(&index_key, 0, now_epoch, remaining)
                .await?;
            candidate_ids.extend(ids);
        }

        let mut holds = self.get_many(&candidate_ids).await?;
        holds.retain(|h| h.status == HoldStatus::Active && h.expires_at_epoch <= now_epoch);
        holds.truncate(limit);
        Ok(holds)
    }

    /// Expire several holds of one product in a single round trip
    pub async fn expire_bulk(
        &self,
        product_id: i64,
        hold_ids: &[String],
        now_epoch: i64,
    ) -> ServiceResult<BulkExpired> {
        let mut args = Vec::with_capacity(hold_ids.len() + 1);
        args.push(now_epoch.to_string());
        args.extend(hold_ids.iter().cloned());

        let [available_key, reserved_key, version_key] = StockLedger::counter_keys(product_id);
        let script_keys = [
            available_key,
            reserved_key,
            version_key,
            keys::active_holds(product_id),
            keys::product_holds(product_id),
            keys::expiring_index(product_id),
            keys::holds_by_status(HoldStatus::Active.as_str()),
        ];
        let result: Vec<i64> = self
            .fast
            .eval(&scripts::BULK_EXPIRE, &script_keys, &args)
            .await?;

        Ok(BulkExpired {
            expired: result[0],
            quantity_released: result[1],
            snapshot: StockSnapshot::new(result[2], result[3], result[4]),
        })
    }

    /// Validate a hold for order creation and stamp `last_accessed_at`.
    ///
    /// Optimistic transaction on the hold hash; classification per status,
    /// with an in-line expiry of aged holds (same script as [`Self::expire`]).
    pub async fn validate_for_order(&self, hold_id: &str) -> ServiceResult<Hold> {
        let hold_key = keys::hold(hold_id);
        let watched = vec![hold_key.clone()];

        for attempt in 1..=MAX_TXN_ATTEMPTS {
            let now_epoch = Utc::now().timestamp();
            let mut txn = self.fast.txn().await?;
            txn.watch(&watched).await?;

            let map = txn.hash_get_all(&hold_key).await?;
            let Some(hold) = parse_hold(hold_id, &map) else {
                txn.unwatch().await?;
                return Err(AppError::new(ErrorCode::HoldNotFound)
                    .with_detail("hold_id", hold_id)
                    .into());
            };

            match hold.status {
                HoldStatus::Used => {
                    txn.unwatch().await?;
                    return Err(AppError::new(ErrorCode::HoldAlreadyUsed).into());
                }
                HoldStatus::Expired => {
                    txn.unwatch().await?;
                    return Err(AppError::hold_expired(hold.expires_at).into());
                }
                HoldStatus::PaymentFailed => {
                    txn.unwatch().await?;
                    return Err(AppError::hold_invalid("prior payment failure").into());
                }
                HoldStatus::Active if hold.expires_at_epoch <= now_epoch => {
                    txn.unwatch().await?;
                    // Aged out but not yet reaped: transition in-line, then
                    // report the expiry to the caller
                    let _ = self.expire(hold_id, now_epoch).await?;
                    return Err(AppError::hold_expired(hold.expires_at).into());
                }
                HoldStatus::Active => {
                    let mut pipe = redis::pipe();
                    pipe.atomic();
                    pipe.hset(&hold_key, "last_accessed_at", now_epoch).ignore();
                    match txn.exec::<()>(&pipe).await? {
                        Some(()) => return Ok(hold),
                        None => {
                            tracing::debug!(%hold_id, attempt, "Hold changed during validation, retrying");
                            tokio::time::sleep(Duration::from_millis(
                                TXN_BACKOFF_MS * attempt as u64,
                            ))
                            .await;
                        }
                    }
                }
            }
        }

        Err(AppError::concurrent_modification(format!(
            "hold {hold_id} kept changing during validation"
        ))
        .into())
    }
}

fn invalid_release(hold_id: &str, qty: i64, reserved: i64) -> AppError {
    AppError::new(ErrorCode::InvalidRelease)
        .with_detail("hold_id", hold_id)
        .with_detail("qty", qty)
        .with_detail("reserved", reserved)
}

/// Keys for the release/expire scripts, in script order
fn release_keys(hold: &Hold, hold_id: &str) -> [String; 8] {
    [
        keys::hold(hold_id),
        keys::available_stock(hold.product_id),
        keys::reserved_stock(hold.product_id),
        keys::stock_version(hold.product_id),
        keys::active_holds(hold.product_id),
        keys::product_holds(hold.product_id),
        keys::expiring_index(hold.product_id),
        keys::holds_by_status(HoldStatus::Active.as_str()),
    ]
}

/// Materialize a hold from its hash fields, normalizing numerics.
///
/// An empty or malformed hash yields `None` (absent sentinel).
pub fn parse_hold(hold_id: &str, map: &HashMap<String, String>) -> Option<Hold> {
    if map.is_empty() {
        return None;
    }
    let status: HoldStatus = map.get("status")?.parse().ok()?;
    Some(Hold {
        id: hold_id.to_string(),
        product_id: map.get("product_id")?.parse().ok()?,
        qty: map.get("qty")?.parse().ok()?,
        status,
        created_at: map.get("created_at").cloned().unwrap_or_default(),
        expires_at: map.get("expires_at").cloned().unwrap_or_default(),
        expires_at_epoch: map.get("expires_at_epoch")?.parse().ok()?,
        version: map
            .get("version")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        last_accessed_at: map.get("last_accessed_at").and_then(|v| v.parse().ok()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hold_map(status: &str) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert("product_id".into(), "7".into());
        map.insert("qty".into(), "2".into());
        map.insert("status".into(), status.into());
        map.insert("created_at".into(), "2026-08-02T10:00:00+00:00".into());
        map.insert("expires_at".into(), "2026-08-02T10:02:00+00:00".into());
        map.insert("expires_at_epoch".into(), "1785578520".into());
        map.insert("version".into(), "4".into());
        map
    }

    #[test]
    fn test_parse_hold_active() {
        let hold = parse_hold("h-1", &hold_map("active")).unwrap();
        assert_eq!(hold.id, "h-1");
        assert_eq!(hold.product_id, 7);
        assert_eq!(hold.qty, 2);
        assert_eq!(hold.status, HoldStatus::Active);
        assert_eq!(hold.expires_at_epoch, 1785578520);
        assert_eq!(hold.version, 4);
        assert_eq!(hold.last_accessed_at, None);
    }

    #[test]
    fn test_parse_hold_absent() {
        assert!(parse_hold("h-1", &HashMap::new()).is_none());
    }

    #[test]
    fn test_parse_hold_unknown_status() {
        assert!(parse_hold("h-1", &hold_map("limbo")).is_none());
    }

    #[test]
    fn test_parse_hold_last_accessed() {
        let mut map = hold_map("active");
        map.insert("last_accessed_at".into(), "1785578400".into());
        let hold = parse_hold("h-1", &map).unwrap();
        assert_eq!(hold.last_accessed_at, Some(1785578400));
    }

    #[test]
    fn test_release_keys_order() {
        let hold = parse_hold("h-1", &hold_map("active")).unwrap();
        let keys = release_keys(&hold, "h-1");
        assert_eq!(keys[0], "hold:h-1");
        assert_eq!(keys[1], "available_stock:7");
        assert_eq!(keys[7], "holds_by_status:active");
    }
}
