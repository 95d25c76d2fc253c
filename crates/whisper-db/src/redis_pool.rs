//! Redis helpers — sessions, revocation sets, multi-node rate counters.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Set a key with expiration (sessions, challenges).
pub async fn set_ex(
    conn: &mut ConnectionManager,
    key: &str,
    value: &str,
    ttl_secs: u64,
) -> Result<(), redis::RedisError> {
    conn.set_ex(key, value, ttl_secs).await
}

/// Get a value by key.
pub async fn get(
    conn: &mut ConnectionManager,
    key: &str,
) -> Result<Option<String>, redis::RedisError> {
    conn.get(key).await
}

/// Delete a key.
pub async fn del(conn: &mut ConnectionManager, key: &str) -> Result<(), redis::RedisError> {
    conn.del(key).await
}

/// Add a member to a set and refresh the set's TTL.
pub async fn sadd_ex(
    conn: &mut ConnectionManager,
    key: &str,
    member: &str,
    ttl_secs: u64,
) -> Result<(), redis::RedisError> {
    let _: () = conn.sadd(key, member).await?;
    let _: () = conn.expire(key, ttl_secs as i64).await?;
    Ok(())
}

/// Read all members of a set.
pub async fn smembers(
    conn: &mut ConnectionManager,
    key: &str,
) -> Result<Vec<String>, redis::RedisError> {
    conn.smembers(key).await
}

/// Remove a member from a set.
pub async fn srem(
    conn: &mut ConnectionManager,
    key: &str,
    member: &str,
) -> Result<(), redis::RedisError> {
    let _: () = conn.srem(key, member).await?;
    Ok(())
}

/// Increment a counter, setting the TTL on first increment (rate limiting
/// across nodes).
pub async fn incr_expire(
    conn: &mut ConnectionManager,
    key: &str,
    ttl_secs: u64,
) -> Result<i64, redis::RedisError> {
    let count: i64 = conn.incr(key, 1).await?;
    if count == 1 {
        let _: () = conn.expire(key, ttl_secs as i64).await?;
    }
    Ok(count)
}
