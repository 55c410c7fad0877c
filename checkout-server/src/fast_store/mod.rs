//! Fast-Store Adapter
//!
//! Thin capability layer over the in-memory store: typed commands, leases,
//! scripted atomics and optimistic multi-key transactions. The adapter
//! performs no retries; retry policy belongs to the callers.
//!
//! Two connection shapes:
//! - [`ConnectionManager`] for plain commands and scripts (multiplexed,
//!   shared, auto-reconnecting)
//! - a dedicated connection per optimistic transaction, because WATCH state
//!   is per-connection and must not interleave with unrelated commands

pub mod keys;

use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::{AsyncCommands, Client, FromRedisValue, Pipeline, RedisError, Script};
use std::collections::HashMap;

/// Capability layer over the in-memory store
#[derive(Clone)]
pub struct FastStore {
    client: Client,
    conn: ConnectionManager,
}

impl FastStore {
    /// Connect to the fast store
    pub async fn connect(url: &str) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, conn })
    }

    /// Availability probe
    pub async fn ping(&self) -> Result<(), RedisError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    // ==================== Plain commands ====================

    pub async fn get(&self, key: &str) -> Result<Option<String>, RedisError> {
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    pub async fn get_int(&self, key: &str) -> Result<Option<i64>, RedisError> {
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), RedisError> {
        let mut conn = self.conn.clone();
        conn.set(key, value).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool, RedisError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await
    }

    pub async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, RedisError> {
        let mut conn = self.conn.clone();
        conn.incr(key, delta).await
    }

    pub async fn decr_by(&self, key: &str, delta: i64) -> Result<i64, RedisError> {
        let mut conn = self.conn.clone();
        conn.decr(key, delta).await
    }

    pub async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, RedisError> {
        let mut conn = self.conn.clone();
        conn.hgetall(key).await
    }

    /// Pipelined HGETALL over many keys (single round trip)
    pub async fn hash_get_all_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<HashMap<String, String>>, RedisError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.hgetall(key);
        }
        pipe.query_async(&mut conn).await
    }

    pub async fn hash_set_multi(
        &self,
        key: &str,
        items: &[(&str, String)],
    ) -> Result<(), RedisError> {
        let mut conn = self.conn.clone();
        conn.hset_multiple(key, items).await
    }

    pub async fn set_add(&self, key: &str, member: &str) -> Result<(), RedisError> {
        let mut conn = self.conn.clone();
        conn.sadd(key, member).await
    }

    pub async fn set_remove(&self, key: &str, member: &str) -> Result<(), RedisError> {
        let mut conn = self.conn.clone();
        conn.srem(key, member).await
    }

    pub async fn set_len(&self, key: &str) -> Result<i64, RedisError> {
        let mut conn = self.conn.clone();
        conn.scard(key).await
    }

    pub async fn set_members(&self, key: &str) -> Result<Vec<String>, RedisError> {
        let mut conn = self.conn.clone();
        conn.smembers(key).await
    }

    pub async fn sorted_set_add(
        &self,
        key: &str,
        member: &str,
        score: i64,
    ) -> Result<(), RedisError> {
        let mut conn = self.conn.clone();
        conn.zadd(key, member, score).await
    }

    /// ZRANGEBYSCORE with a result limit
    pub async fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: i64,
        max: i64,
        limit: usize,
    ) -> Result<Vec<String>, RedisError> {
        let mut conn = self.conn.clone();
        conn.zrangebyscore_limit(key, min, max, 0, limit as isize)
            .await
    }

    pub async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, RedisError> {
        let mut conn = self.conn.clone();
        conn.keys(pattern).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), RedisError> {
        let mut conn = self.conn.clone();
        conn.del(key).await
    }

    // ==================== Leases ====================

    /// Acquire a short-lived lease: SET key token NX EX ttl.
    ///
    /// Returns false when another owner currently holds the key.
    pub async fn acquire_lease(
        &self,
        key: &str,
        token: &str,
        ttl_secs: u64,
    ) -> Result<bool, RedisError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    /// Release a lease only if we still own it (compare-and-delete).
    ///
    /// Returns false when the lease expired or was taken over meanwhile.
    pub async fn release_lease(&self, key: &str, token: &str) -> Result<bool, RedisError> {
        let mut conn = self.conn.clone();
        let released: i64 = RELEASE_LEASE_SCRIPT
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(released == 1)
    }

    // ==================== Scripted atomics ====================

    /// Execute a server-side script as one indivisible step
    pub async fn eval<T: FromRedisValue>(
        &self,
        script: &Script,
        keys: &[String],
        args: &[String],
    ) -> Result<T, RedisError> {
        let mut conn = self.conn.clone();
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        for arg in args {
            invocation.arg(arg.as_str());
        }
        invocation.invoke_async(&mut conn).await
    }

    // ==================== Optimistic transactions ====================

    /// Open a dedicated connection for a WATCH-based transaction
    pub async fn txn(&self) -> Result<OptimisticTxn, RedisError> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(OptimisticTxn { conn })
    }
}

/// One optimistic multi-key transaction: watch, read, queue, commit.
///
/// The commit ([`exec`](Self::exec)) returns `None` when any watched key was
/// mutated since `watch` — no writes took effect and the caller decides
/// whether to retry. WATCH state is cleared by EXEC on both outcomes.
pub struct OptimisticTxn {
    conn: MultiplexedConnection,
}

impl OptimisticTxn {
    pub async fn watch(&mut self, keys: &[String]) -> Result<(), RedisError> {
        let mut cmd = redis::cmd("WATCH");
        for key in keys {
            cmd.arg(key);
        }
        cmd.query_async::<()>(&mut self.conn).await
    }

    /// Drop the watch without committing (abort path)
    pub async fn unwatch(&mut self) -> Result<(), RedisError> {
        redis::cmd("UNWATCH").query_async::<()>(&mut self.conn).await
    }

    /// Read an integer counter inside the watch window
    pub async fn get_int(&mut self, key: &str) -> Result<Option<i64>, RedisError> {
        self.conn.get(key).await
    }

    /// Read a hash inside the watch window
    pub async fn hash_get_all(&mut self, key: &str) -> Result<HashMap<String, String>, RedisError> {
        self.conn.hgetall(key).await
    }

    /// Dispatch the queued writes; `None` means a watched key changed
    pub async fn exec<T: FromRedisValue>(
        &mut self,
        pipe: &Pipeline,
    ) -> Result<Option<T>, RedisError> {
        pipe.query_async(&mut self.conn).await
    }
}

/// Compare-and-delete: release a lease only when the stored token matches
static RELEASE_LEASE_SCRIPT: std::sync::LazyLock<Script> = std::sync::LazyLock::new(|| {
    Script::new(
        r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#,
    )
});

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> FastStore {
        let url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        FastStore::connect(&url).await.expect("redis connection")
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn counter_roundtrip() {
        let store = test_store().await;
        store.delete("test:counter").await.unwrap();

        assert_eq!(store.incr_by("test:counter", 5).await.unwrap(), 5);
        assert_eq!(store.decr_by("test:counter", 2).await.unwrap(), 3);
        assert_eq!(store.get_int("test:counter").await.unwrap(), Some(3));

        store.delete("test:counter").await.unwrap();
        assert_eq!(store.get("test:counter").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn sets_and_sorted_sets() {
        let store = test_store().await;
        store.delete("test:set").await.unwrap();
        store.delete("test:zset").await.unwrap();

        store.set_add("test:set", "a").await.unwrap();
        store.set_add("test:set", "b").await.unwrap();
        assert_eq!(store.set_len("test:set").await.unwrap(), 2);
        store.set_remove("test:set", "a").await.unwrap();
        assert_eq!(store.set_members("test:set").await.unwrap(), vec!["b"]);

        store.sorted_set_add("test:zset", "early", 10).await.unwrap();
        store.sorted_set_add("test:zset", "late", 99).await.unwrap();
        let in_range = store
            .sorted_set_range_by_score("test:zset", 0, 50, 10)
            .await
            .unwrap();
        assert_eq!(in_range, vec!["early"]);

        store.delete("test:set").await.unwrap();
        store.delete("test:zset").await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn lease_is_exclusive_and_owner_checked() {
        let store = test_store().await;
        store.delete("test:lease").await.unwrap();

        assert!(store.acquire_lease("test:lease", "owner-1", 5).await.unwrap());
        assert!(!store.acquire_lease("test:lease", "owner-2", 5).await.unwrap());

        // Wrong token does not release
        assert!(!store.release_lease("test:lease", "owner-2").await.unwrap());
        assert!(store.release_lease("test:lease", "owner-1").await.unwrap());

        // Gone after release
        assert!(store.acquire_lease("test:lease", "owner-2", 5).await.unwrap());
        store.delete("test:lease").await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn optimistic_txn_detects_conflict() {
        let store = test_store().await;
        store.set("test:watched", "0").await.unwrap();

        let watched = vec!["test:watched".to_string()];
        let mut txn = store.txn().await.unwrap();
        txn.watch(&watched).await.unwrap();
        let before = txn.get_int("test:watched").await.unwrap().unwrap();

        // Out-of-band mutation between read and commit
        store.set("test:watched", "99").await.unwrap();

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.set("test:watched", before + 1).ignore();
        let committed: Option<()> = txn.exec(&pipe).await.unwrap();
        assert!(committed.is_none(), "EXEC must return nil on conflict");

        // The conflicting write won; no partial effects
        assert_eq!(store.get_int("test:watched").await.unwrap(), Some(99));
        store.delete("test:watched").await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn optimistic_txn_commits_clean() {
        let store = test_store().await;
        store.set("test:clean", "7").await.unwrap();

        let watched = vec!["test:clean".to_string()];
        let mut txn = store.txn().await.unwrap();
        txn.watch(&watched).await.unwrap();
        let before = txn.get_int("test:clean").await.unwrap().unwrap();

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.set("test:clean", before + 1).ignore();
        let committed: Option<()> = txn.exec(&pipe).await.unwrap();
        assert!(committed.is_some());
        assert_eq!(store.get_int("test:clean").await.unwrap(), Some(8));
        store.delete("test:clean").await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn pipelined_hash_reads_skip_absent() {
        let store = test_store().await;
        store
            .hash_set_multi("test:hash:a", &[("f", "1".into())])
            .await
            .unwrap();
        store.delete("test:hash:b").await.unwrap();

        let maps = store
            .hash_get_all_many(&["test:hash:a".into(), "test:hash:b".into()])
            .await
            .unwrap();
        assert_eq!(maps.len(), 2);
        assert_eq!(maps[0].get("f").map(String::as_str), Some("1"));
        assert!(maps[1].is_empty());

        store.delete("test:hash:a").await.unwrap();
    }
}
