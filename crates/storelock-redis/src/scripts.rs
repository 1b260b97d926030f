//! The atomic script library.
//!
//! Every operation that reads and then writes runs as one Lua script so
//! no other command interleaves between the check and the act. Plain
//! acquisition needs no script: `SET NX PX` is a single atomic command.

/// Compare-owner-then-delete. The naive get-then-del pair would race a
/// lease expiry and delete a lock a different owner now holds.
///
/// KEYS[1] lock key, ARGV[1] owner token.
pub(crate) const RELEASE: &str = r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('del', KEYS[1])
    end
    return 0
"#;

/// Compare-owner-then-extend.
///
/// KEYS[1] lock key, ARGV[1] owner token, ARGV[2] lease millis.
pub(crate) const RENEW: &str = r#"
    if redis.call('get', KEYS[1]) == ARGV[1] then
        return redis.call('pexpire', KEYS[1], ARGV[2])
    end
    return 0
"#;

/// Reentrant acquire: hash of hold counts keyed by owner identity.
/// A 0 -> 1 transition is a fresh acquisition; the same identity
/// re-entering never blocks itself; any other identity present fails.
///
/// KEYS[1] counter key, ARGV[1] owner identity, ARGV[2] lease millis.
pub(crate) const REENTRANT_ACQUIRE: &str = r#"
    if redis.call('hget', KEYS[1], ARGV[1]) then
        redis.call('hincrby', KEYS[1], ARGV[1], 1)
        redis.call('pexpire', KEYS[1], ARGV[2])
        return 1
    end
    if redis.call('hlen', KEYS[1]) == 0 then
        redis.call('hset', KEYS[1], ARGV[1], 1)
        redis.call('pexpire', KEYS[1], ARGV[2])
        return 1
    end
    return 0
"#;

/// Reentrant release: decrement, drop the field at zero, drop the key
/// when the structure empties. Returns 0 when the identity held
/// nothing.
///
/// KEYS[1] counter key, ARGV[1] owner identity.
pub(crate) const REENTRANT_RELEASE: &str = r#"
    local held = redis.call('hget', KEYS[1], ARGV[1])
    if not held then
        return 0
    end
    if tonumber(held) > 1 then
        redis.call('hincrby', KEYS[1], ARGV[1], -1)
    else
        redis.call('hdel', KEYS[1], ARGV[1])
        if redis.call('hlen', KEYS[1]) == 0 then
            redis.call('del', KEYS[1])
        end
    end
    return 1
"#;

/// KEYS[1] counter key, ARGV[1] owner identity, ARGV[2] lease millis.
pub(crate) const REENTRANT_RENEW: &str = r#"
    if redis.call('hexists', KEYS[1], ARGV[1]) == 1 then
        return redis.call('pexpire', KEYS[1], ARGV[2])
    end
    return 0
"#;

/// One fair attempt: enqueue-if-absent (list order is arrival order),
/// then take the lock only when it is free and we are the head, popping
/// ourselves on success. The queue TTL is re-stamped on every attempt
/// with a grace margin so only a crashed waiter's entry ages out.
///
/// KEYS[1] lock key, KEYS[2] queue key,
/// ARGV[1] owner token, ARGV[2] lease millis, ARGV[3] queue TTL millis.
pub(crate) const FAIR_ACQUIRE: &str = r#"
    if not redis.call('lpos', KEYS[2], ARGV[1]) then
        redis.call('rpush', KEYS[2], ARGV[1])
    end
    redis.call('pexpire', KEYS[2], ARGV[3])
    if redis.call('exists', KEYS[1]) == 0 and redis.call('lindex', KEYS[2], 0) == ARGV[1] then
        redis.call('lpop', KEYS[2])
        redis.call('set', KEYS[1], ARGV[1], 'PX', ARGV[2])
        return 1
    end
    return 0
"#;

/// Shared read acquire: refused while the writer key exists, otherwise
/// records the reader's token as a hash field and stretches the hash
/// TTL to at least the lease. Per-token fields fence release: a stale
/// handle holds no field and so cannot touch a later reader's state.
///
/// KEYS[1] readers hash, KEYS[2] writer key,
/// ARGV[1] reader token, ARGV[2] lease millis.
pub(crate) const READ_ACQUIRE: &str = r#"
    if redis.call('exists', KEYS[2]) == 1 then
        return 0
    end
    redis.call('hset', KEYS[1], ARGV[1], 1)
    if redis.call('pttl', KEYS[1]) < tonumber(ARGV[2]) then
        redis.call('pexpire', KEYS[1], ARGV[2])
    end
    return 1
"#;

/// Drops the caller's field, deleting the hash when the last reader
/// leaves. Returns 0 without mutation when the token holds nothing.
///
/// KEYS[1] readers hash, ARGV[1] reader token.
pub(crate) const READ_RELEASE: &str = r#"
    if redis.call('hdel', KEYS[1], ARGV[1]) == 0 then
        return 0
    end
    if redis.call('hlen', KEYS[1]) == 0 then
        redis.call('del', KEYS[1])
    end
    return 1
"#;

/// KEYS[1] readers hash, ARGV[1] reader token, ARGV[2] lease millis.
pub(crate) const READ_RENEW: &str = r#"
    if redis.call('hexists', KEYS[1], ARGV[1]) == 1 then
        return redis.call('pexpire', KEYS[1], ARGV[2])
    end
    return 0
"#;

/// Exclusive write acquire: refused while the writer key exists or any
/// reader field remains.
///
/// KEYS[1] writer key, KEYS[2] readers hash,
/// ARGV[1] owner token, ARGV[2] lease millis.
pub(crate) const WRITE_ACQUIRE: &str = r#"
    if redis.call('exists', KEYS[1]) == 1 then
        return 0
    end
    if redis.call('hlen', KEYS[2]) > 0 then
        return 0
    end
    redis.call('set', KEYS[1], ARGV[1], 'PX', ARGV[2])
    return 1
"#;
