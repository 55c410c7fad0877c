//! Stock Ledger
//!
//! Per-product counters in the fast store: `available_stock:{p}`,
//! `reserved_stock:{p}`, `stock_version:{p}`, plus the `active_holds:{p}`
//! aggregate. Invariants after every operation:
//!
//! - `available >= 0`, `reserved >= 0`
//! - `available + reserved + committed = base_stock_at_init`
//! - `version` strictly increases with every mutation
//!
//! Counters are lazily seeded from the durable product row under a 5-second
//! init lease. The reserve decision itself is staged into the hold-creation
//! transaction by [`StockLedger::stage_reserve`]; unconditional transitions
//! (release, expire, commit) run as server-side scripts owned by the hold
//! registry.

use redis::{Pipeline, Script};
use sqlx::PgPool;
use std::sync::LazyLock;
use std::time::Duration;
use uuid::Uuid;

use shared::error::{AppError, ErrorCode};
use shared::models::StockSnapshot;

use crate::db::products;
use crate::error::ServiceResult;
use crate::fast_store::keys;
use crate::fast_store::{FastStore, OptimisticTxn};

/// Init guard lease TTL
const INIT_LEASE_TTL_SECS: u64 = 5;
/// Bounded wait for another caller's initialization to land
const INIT_POLL_ATTEMPTS: u32 = 10;
const INIT_POLL_DELAY_MS: u64 = 50;

/// Outcome of the lazy-initialization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// Counters exist; the optimistic path may proceed
    Ready,
    /// Initialization did not complete within the poll budget;
    /// caller must take the pessimistic path
    Uninitialized,
}

/// Per-product stock accounting over the fast store
#[derive(Clone)]
pub struct StockLedger {
    fast: FastStore,
    pool: PgPool,
}

impl StockLedger {
    pub fn new(fast: FastStore, pool: PgPool) -> Self {
        Self { fast, pool }
    }

    /// The three counter keys, in watch order
    pub fn counter_keys(product_id: i64) -> [String; 3] {
        [
            keys::available_stock(product_id),
            keys::reserved_stock(product_id),
            keys::stock_version(product_id),
        ]
    }

    /// Lazily seed the counters from the durable product row.
    ///
    /// First caller takes the init lease and seeds; concurrent callers poll
    /// with bounded backoff. `Uninitialized` tells the caller to use the
    /// pessimistic path instead of spinning further.
    pub async fn ensure_initialized(&self, product_id: i64) -> ServiceResult<InitOutcome> {
        let available_key = keys::available_stock(product_id);
        if self.fast.exists(&available_key).await? {
            return Ok(InitOutcome::Ready);
        }

        let guard_key = keys::stock_init(product_id);
        let token = Uuid::new_v4().to_string();
        if self
            .fast
            .acquire_lease(&guard_key, &token, INIT_LEASE_TTL_SECS)
            .await?
        {
            let seeded = self.seed_counters(product_id).await;
            // Lease released on both outcomes; expiry covers a crashed holder
            let _ = self.fast.release_lease(&guard_key, &token).await;
            seeded?;
            return Ok(InitOutcome::Ready);
        }

        for _ in 0..INIT_POLL_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(INIT_POLL_DELAY_MS)).await;
            if self.fast.exists(&available_key).await? {
                return Ok(InitOutcome::Ready);
            }
        }
        tracing::warn!(
            product_id,
            "Stock init did not complete within poll budget, falling back to pessimistic path"
        );
        Ok(InitOutcome::Uninitialized)
    }

    async fn seed_counters(&self, product_id: i64) -> ServiceResult<()> {
        // Re-check under the lease: counters may have landed between the
        // exists probe and the lease acquisition
        if self.fast.exists(&keys::available_stock(product_id)).await? {
            return Ok(());
        }

        let product = products::find_by_id(&self.pool, product_id)
            .await?
            .ok_or_else(|| {
                AppError::new(ErrorCode::ProductNotFound)
                    .with_detail("product_id", product_id)
            })?;

        self.fast
            .set(&keys::available_stock(product_id), &product.stock.to_string())
            .await?;
        self.fast
            .set(&keys::reserved_stock(product_id), "0")
            .await?;
        self.fast
            .set(&keys::stock_version(product_id), "1")
            .await?;

        tracing::info!(product_id, base_stock = product.stock, "Seeded stock counters");
        Ok(())
    }

    /// Read the live snapshot
    pub async fn snapshot(&self, product_id: i64) -> ServiceResult<StockSnapshot> {
        let [available_key, reserved_key, version_key] = Self::counter_keys(product_id);
        let available = self.fast.get_int(&available_key).await?;
        let reserved = self.fast.get_int(&reserved_key).await?;
        let version = self.fast.get_int(&version_key).await?;
        match (available, reserved, version) {
            (Some(a), Some(r), Some(v)) => Ok(StockSnapshot::new(a, r, v)),
            _ => Err(AppError::new(ErrorCode::StockNotInitialized)
                .with_detail("product_id", product_id)
                .into()),
        }
    }

    /// Sum of active hold quantities (zero when the counter is absent)
    pub async fn active_holds(&self, product_id: i64) -> ServiceResult<i64> {
        Ok(self
            .fast
            .get_int(&keys::active_holds(product_id))
            .await?
            .unwrap_or(0))
    }

    /// Stage the reserve mutation into a caller-owned optimistic transaction.
    ///
    /// Reads the watched counters, verifies availability and queues
    /// `available -= qty; reserved += qty; version += 1`. Returns the
    /// post-commit snapshot the queued writes will produce. The caller
    /// bundles further writes into `pipe` and drives EXEC/retry.
    pub async fn stage_reserve(
        &self,
        txn: &mut OptimisticTxn,
        pipe: &mut Pipeline,
        product_id: i64,
        qty: i64,
    ) -> ServiceResult<StockSnapshot> {
        let [available_key, reserved_key, version_key] = Self::counter_keys(product_id);
        let available = txn.get_int(&available_key).await?.unwrap_or(0);
        let reserved = txn.get_int(&reserved_key).await?.unwrap_or(0);
        let version = txn.get_int(&version_key).await?.unwrap_or(0);

        if available < qty {
            txn.unwatch().await?;
            return Err(AppError::insufficient_stock(available, reserved, version).into());
        }

        pipe.set(&available_key, available - qty).ignore();
        pipe.set(&reserved_key, reserved + qty).ignore();
        pipe.set(&version_key, version + 1).ignore();

        Ok(StockSnapshot::new(
            available - qty,
            reserved + qty,
            version + 1,
        ))
    }

    /// Recompute the counters from authoritative inputs (admin operation).
    ///
    /// `available = base_stock − active_holds`, `reserved = active_holds`,
    /// version bumped; runs server-side as one step.
    pub async fn refresh(&self, product_id: i64) -> ServiceResult<StockSnapshot> {
        let product = products::find_by_id(&self.pool, product_id)
            .await?
            .ok_or_else(|| {
                AppError::new(ErrorCode::ProductNotFound)
                    .with_detail("product_id", product_id)
            })?;

        let [available_key, reserved_key, version_key] = Self::counter_keys(product_id);
        let script_keys = [
            available_key,
            reserved_key,
            version_key,
            keys::active_holds(product_id),
        ];
        let result: Vec<i64> = self
            .fast
            .eval(&REFRESH_SCRIPT, &script_keys, &[product.stock.to_string()])
            .await?;

        let snapshot = StockSnapshot::new(result[0], result[1], result[2]);
        tracing::info!(
            product_id,
            available = snapshot.available,
            reserved = snapshot.reserved,
            version = snapshot.version,
            "Refreshed stock counters from durable state"
        );
        Ok(snapshot)
    }
}

/// Recompute counters by fiat: available = base − active, reserved = active
static REFRESH_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local base = tonumber(ARGV[1])
local active = tonumber(redis.call('GET', KEYS[4]) or '0')
local available = base - active
if available < 0 then
    available = 0
end
redis.call('SET', KEYS[1], available)
redis.call('SET', KEYS[2], active)
local version = redis.call('INCR', KEYS[3])
return {available, active, version}
"#,
    )
});
