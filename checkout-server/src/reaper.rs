//! Expiry Reaper
//!
//! Background sweeper that drives aged-out holds through expiration. Runs
//! on a fixed cadence; each invocation works through batches of expired
//! candidates under a wall-clock budget, with a short per-hold lease so
//! concurrent reaper instances never stomp each other. Per-hold failures
//! are isolated: logged, counted, and never abort the batch.

use chrono::Utc;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use shared::models::Hold;

use crate::config::Config;
use crate::error::ServiceResult;
use crate::fast_store::{keys, FastStore};
use crate::holds::{ExpireOutcome, HoldRegistry};
use crate::stock::StockLedger;

/// Per-hold mutual-exclusion lease; well under the rescheduling interval
const EXPIRE_LEASE_TTL_SECS: u64 = 5;
/// First N per-hold failures are logged verbosely, the rest only counted
const VERBOSE_FAILURES: usize = 5;

/// One invocation's tally, also the heartbeat payload
#[derive(Debug, Default, Clone)]
pub struct ReaperReport {
    /// Candidates fetched across all batches
    pub scanned: usize,
    /// Holds actually transitioned to expired
    pub expired: usize,
    /// Total quantity refunded to available
    pub quantity_released: i64,
    /// Candidates skipped because another worker held the lease
    pub skipped: usize,
    /// Per-hold failures (never abort the batch)
    pub failures: usize,
    /// True when the runtime budget cut the invocation short
    pub budget_exhausted: bool,
}

/// Periodic sweeper for expired holds
pub struct ExpiryReaper {
    fast: FastStore,
    registry: HoldRegistry,
    ledger: StockLedger,
    interval: Duration,
    batch_size: usize,
    max_runtime: Duration,
}

impl ExpiryReaper {
    pub fn new(
        fast: FastStore,
        registry: HoldRegistry,
        ledger: StockLedger,
        config: &Config,
    ) -> Self {
        Self {
            fast,
            registry,
            ledger,
            interval: Duration::from_secs(config.reaper_interval_secs),
            batch_size: config.reaper_batch_size,
            max_runtime: Duration::from_secs(config.reaper_max_runtime_secs),
        }
    }

    /// Run forever on the configured cadence
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            batch_size = self.batch_size,
            "Expiry reaper started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match self.run_once().await {
                Ok(report) => {
                    if report.expired > 0 || report.failures > 0 {
                        tracing::info!(
                            scanned = report.scanned,
                            expired = report.expired,
                            qty = report.quantity_released,
                            skipped = report.skipped,
                            failures = report.failures,
                            budget_exhausted = report.budget_exhausted,
                            "Reaper pass finished"
                        );
                    }
                }
                Err(err) => {
                    tracing::error!(error = ?err, "Reaper pass failed");
                }
            }
        }
    }

    /// One complete invocation: batches until drained or out of budget
    pub async fn run_once(&self) -> ServiceResult<ReaperReport> {
        let started = Instant::now();
        let token = owner_token();
        let mut report = ReaperReport::default();

        'sweep: loop {
            if started.elapsed() >= self.max_runtime {
                report.budget_exhausted = true;
                break;
            }

            let now = Utc::now().timestamp();
            let candidates = self.registry.find_expired(self.batch_size, now).await?;
            if candidates.is_empty() {
                break;
            }
            report.scanned += candidates.len();

            let mut by_product: BTreeMap<i64, Vec<Hold>> = BTreeMap::new();
            for hold in candidates {
                by_product.entry(hold.product_id).or_default().push(hold);
            }

            for (product_id, group) in by_product {
                if started.elapsed() >= self.max_runtime {
                    report.budget_exhausted = true;
                    break 'sweep;
                }
                self.reap_product(product_id, group, &token, now, &mut report)
                    .await;
            }
        }

        if let Err(err) = self.write_heartbeat(&report).await {
            tracing::warn!(error = ?err, "Failed to write reaper heartbeat");
        }
        Ok(report)
    }

    /// Expire one product's candidates: bulk script when two or more leases
    /// were won, per-hold path for singletons
    async fn reap_product(
        &self,
        product_id: i64,
        group: Vec<Hold>,
        token: &str,
        now: i64,
        report: &mut ReaperReport,
    ) {
        let mut leased: Vec<String> = Vec::with_capacity(group.len());
        for hold in &group {
            match self
                .fast
                .acquire_lease(&keys::expire_lock(&hold.id), token, EXPIRE_LEASE_TTL_SECS)
                .await
            {
                Ok(true) => leased.push(hold.id.clone()),
                Ok(false) => report.skipped += 1,
                Err(err) => self.record_failure(report, &hold.id, &err.to_string()),
            }
        }

        if leased.len() >= 2 {
            match self.registry.expire_bulk(product_id, &leased, now).await {
                Ok(bulk) => {
                    report.expired += bulk.expired as usize;
                    report.quantity_released += bulk.quantity_released;
                }
                Err(err) => {
                    self.record_failure(report, &format!("product {product_id}"), &format!("{err:?}"))
                }
            }
        } else if let Some(hold_id) = leased.first() {
            match self.registry.expire(hold_id, now).await {
                Ok(ExpireOutcome::Expired(released)) => {
                    report.expired += 1;
                    report.quantity_released += released.quantity_released;
                }
                // Lost the race to a concurrent release or the clock moved;
                // either way nothing to do
                Ok(ExpireOutcome::AlreadyGone) | Ok(ExpireOutcome::NotExpired { .. }) => {}
                Err(err) => self.record_failure(report, hold_id, &format!("{err:?}")),
            }
        }

        // Scoped release on every path: leases are dropped even when the
        // expire attempt failed
        for hold_id in &leased {
            if let Err(err) = self
                .fast
                .release_lease(&keys::expire_lock(hold_id), token)
                .await
            {
                tracing::debug!(%hold_id, error = %err, "Expire lease release failed");
            }
        }
    }

    fn record_failure(&self, report: &mut ReaperReport, subject: &str, error: &str) {
        report.failures += 1;
        if report.failures <= VERBOSE_FAILURES {
            tracing::warn!(subject, error, "Reaper failed to expire hold");
        }
    }

    /// Liveness heartbeat: total active-hold count and per-product stock
    /// readings, written once per invocation
    async fn write_heartbeat(&self, report: &ReaperReport) -> ServiceResult<()> {
        let active_holds = self
            .fast
            .set_len(&keys::holds_by_status("active"))
            .await?;

        let mut stocks: BTreeMap<i64, serde_json::Value> = BTreeMap::new();
        for index_key in self.fast.keys_matching(keys::EXPIRING_INDEX_PATTERN).await? {
            if let Some(product_id) = keys::product_id_from_expiring_index(&index_key) {
                if let Ok(snapshot) = self.ledger.snapshot(product_id).await {
                    stocks.insert(
                        product_id,
                        serde_json::json!({
                            "available": snapshot.available,
                            "reserved": snapshot.reserved,
                            "version": snapshot.version,
                        }),
                    );
                }
            }
        }

        self.fast
            .hash_set_multi(
                keys::REAPER_HEARTBEAT,
                &[
                    ("timestamp", Utc::now().timestamp().to_string()),
                    ("active_holds", active_holds.to_string()),
                    ("expired", report.expired.to_string()),
                    ("failures", report.failures.to_string()),
                    (
                        "stocks",
                        serde_json::to_string(&stocks).unwrap_or_else(|_| "{}".into()),
                    ),
                ],
            )
            .await?;
        Ok(())
    }
}

/// Lease owner identity: `{hostname}:{pid}:{timestamp}`
fn owner_token() -> String {
    let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".into());
    format!(
        "{}:{}:{}",
        hostname,
        std::process::id(),
        Utc::now().timestamp()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_token_shape() {
        let token = owner_token();
        assert_eq!(token.split(':').count(), 3);
    }
}
