//! Server-side scripts for hold transitions
//!
//! Every transition out of `active` must atomically touch the stock
//! counters, the hold hash and all three index memberships — a hold is
//! either discoverable via every index or via none. Scripts execute without
//! interleaving, which collapses those cross-key races into server-side
//! serialization.
//!
//! Return convention: an integer array whose first element is a code:
//! `0` ok, `1` hold absent, `2` hold not active, `3` reserved underflow,
//! `4` not expired yet (expire script only).

use redis::Script;
use std::sync::LazyLock;

/// Script status codes
pub const OK: i64 = 0;
pub const ABSENT: i64 = 1;
pub const NOT_ACTIVE: i64 = 2;
pub const UNDERFLOW: i64 = 3;
pub const NOT_EXPIRED: i64 = 4;

/// Release an active hold: refund its units to `available`.
///
/// KEYS: hold, available_stock, reserved_stock, stock_version, active_holds,
///       product_holds, expiring_index, holds_by_status:active
/// ARGV: hold_id
///
/// Returns `{code, qty, available, reserved, version}`.
pub static RELEASE_HOLD: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local status = redis.call('HGET', KEYS[1], 'status')
if not status then
    return {1, 0, 0, 0, 0}
end
if status ~= 'active' then
    return {2, 0, 0, 0, 0}
end
local qty = tonumber(redis.call('HGET', KEYS[1], 'qty'))
local reserved = tonumber(redis.call('GET', KEYS[3]) or '0')
if reserved < qty then
    return {3, qty, 0, reserved, 0}
end
local available = redis.call('INCRBY', KEYS[2], qty)
reserved = redis.call('DECRBY', KEYS[3], qty)
local version = redis.call('INCR', KEYS[4])
redis.call('DECRBY', KEYS[5], qty)
redis.call('DEL', KEYS[1])
redis.call('SREM', KEYS[6], ARGV[1])
redis.call('ZREM', KEYS[7], ARGV[1])
redis.call('SREM', KEYS[8], ARGV[1])
return {0, qty, available, reserved, version}
"#,
    )
});

/// Expire an active hold whose deadline has passed (inclusive: a hold with
/// `expires_at_epoch == now` is expired).
///
/// Same body as release with an extra gate; KEYS as [`RELEASE_HOLD`],
/// ARGV: hold_id, now_epoch.
///
/// Returns `{code, qty_or_remaining, available, reserved, version}`; for
/// code 4 the second element is seconds remaining.
pub static EXPIRE_HOLD: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local status = redis.call('HGET', KEYS[1], 'status')
if not status then
    return {1, 0, 0, 0, 0}
end
if status ~= 'active' then
    return {2, 0, 0, 0, 0}
end
local expires = tonumber(redis.call('HGET', KEYS[1], 'expires_at_epoch') or '0')
local now = tonumber(ARGV[2])
if expires > now then
    return {4, expires - now, 0, 0, 0}
end
local qty = tonumber(redis.call('HGET', KEYS[1], 'qty'))
local reserved = tonumber(redis.call('GET', KEYS[3]) or '0')
if reserved < qty then
    return {3, qty, 0, reserved, 0}
end
local available = redis.call('INCRBY', KEYS[2], qty)
reserved = redis.call('DECRBY', KEYS[3], qty)
local version = redis.call('INCR', KEYS[4])
redis.call('DECRBY', KEYS[5], qty)
redis.call('DEL', KEYS[1])
redis.call('SREM', KEYS[6], ARGV[1])
redis.call('ZREM', KEYS[7], ARGV[1])
redis.call('SREM', KEYS[8], ARGV[1])
return {0, qty, available, reserved, version}
"#,
    )
});

/// Commit an active hold after a confirmed payment: the units leave the
/// system, so `available` is untouched — only `reserved` drops.
///
/// KEYS: hold, reserved_stock, stock_version, active_holds, product_holds,
///       expiring_index, holds_by_status:active
/// ARGV: hold_id
///
/// Returns `{code, qty, reserved, version}`.
pub static COMMIT_HOLD: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local status = redis.call('HGET', KEYS[1], 'status')
if not status then
    return {1, 0, 0, 0}
end
if status ~= 'active' then
    return {2, 0, 0, 0}
end
local qty = tonumber(redis.call('HGET', KEYS[1], 'qty'))
local reserved = tonumber(redis.call('GET', KEYS[2]) or '0')
if reserved < qty then
    return {3, qty, reserved, 0}
end
reserved = redis.call('DECRBY', KEYS[2], qty)
local version = redis.call('INCR', KEYS[3])
redis.call('DECRBY', KEYS[4], qty)
redis.call('DEL', KEYS[1])
redis.call('SREM', KEYS[5], ARGV[1])
redis.call('ZREM', KEYS[6], ARGV[1])
redis.call('SREM', KEYS[7], ARGV[1])
return {0, qty, reserved, version}
"#,
    )
});

/// Expire several holds of one product in a single round trip.
///
/// Eligible holds (still active, deadline passed) are aggregated first, then
/// the counters are mutated once and the hashes/index entries removed.
///
/// KEYS: available_stock, reserved_stock, stock_version, active_holds,
///       product_holds, expiring_index, holds_by_status:active
/// ARGV: now_epoch, hold_id...
///
/// Returns `{expired_count, total_qty, available, reserved, version}`.
pub static BULK_EXPIRE: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local now = tonumber(ARGV[1])
local reserved = tonumber(redis.call('GET', KEYS[2]) or '0')
local eligible = {}
local total = 0
for i = 2, #ARGV do
    local id = ARGV[i]
    local hk = 'hold:' .. id
    local status = redis.call('HGET', hk, 'status')
    if status == 'active' then
        local expires = tonumber(redis.call('HGET', hk, 'expires_at_epoch') or '0')
        if expires <= now then
            local qty = tonumber(redis.call('HGET', hk, 'qty'))
            if reserved - total - qty >= 0 then
                table.insert(eligible, {id, qty})
                total = total + qty
            end
        end
    end
end
if #eligible == 0 then
    local available = tonumber(redis.call('GET', KEYS[1]) or '0')
    local version = tonumber(redis.call('GET', KEYS[3]) or '0')
    return {0, 0, available, reserved, version}
end
local available = redis.call('INCRBY', KEYS[1], total)
reserved = redis.call('DECRBY', KEYS[2], total)
local version = redis.call('INCR', KEYS[3])
redis.call('DECRBY', KEYS[4], total)
for i = 1, #eligible do
    local id = eligible[i][1]
    redis.call('DEL', 'hold:' .. id)
    redis.call('SREM', KEYS[5], id)
    redis.call('ZREM', KEYS[6], id)
    redis.call('SREM', KEYS[7], id)
end
return {#eligible, total, available, reserved, version}
"#,
    )
});

/// Pessimistic-path hold creation, executed while the caller holds the
/// durable product row lock. Seeds the counters when they are missing
/// (fast store flushed or init never completed), then performs the
/// check-and-reserve plus hold materialization as one step.
///
/// KEYS: available_stock, reserved_stock, stock_version, active_holds,
///       product_holds, expiring_index, holds_by_status:active, hold
/// ARGV: qty, base_stock, hold_id, created_at, expires_at,
///       expires_at_epoch, product_id
///
/// Returns `{code, available, reserved, version}` (code 1 = insufficient).
pub static CREATE_HOLD_LOCKED: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
local qty = tonumber(ARGV[1])
if redis.call('EXISTS', KEYS[1]) == 0 then
    redis.call('SET', KEYS[1], ARGV[2])
    redis.call('SET', KEYS[2], 0)
    redis.call('SET', KEYS[3], 1)
end
local available = tonumber(redis.call('GET', KEYS[1]))
local reserved = tonumber(redis.call('GET', KEYS[2]) or '0')
local version = tonumber(redis.call('GET', KEYS[3]) or '1')
if available < qty then
    return {1, available, reserved, version}
end
available = redis.call('DECRBY', KEYS[1], qty)
reserved = redis.call('INCRBY', KEYS[2], qty)
version = redis.call('INCR', KEYS[3])
redis.call('INCRBY', KEYS[4], qty)
redis.call('HSET', KEYS[8],
    'product_id', ARGV[7],
    'qty', ARGV[1],
    'status', 'active',
    'created_at', ARGV[4],
    'expires_at', ARGV[5],
    'expires_at_epoch', ARGV[6],
    'version', version)
redis.call('SADD', KEYS[5], ARGV[3])
redis.call('ZADD', KEYS[6], ARGV[6], ARGV[3])
redis.call('SADD', KEYS[7], ARGV[3])
return {0, available, reserved, version}
"#,
    )
});
