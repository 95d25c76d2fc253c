//! Pending queue — durable per-recipient FIFO with cursor pagination.
//!
//! `seq` is a global BIGSERIAL; per recipient it is strictly increasing in
//! insertion order, so fetch order equals insertion order equals replay
//! order. The wire cursor is the decimal string of the last seen `seq` —
//! opaque to clients, valid across reconnects.

use sqlx::PgPool;
use uuid::Uuid;
use whisper_common::models::{NewEnvelope, PendingEnvelope};

/// Hard server-side cap on page size.
pub const MAX_PAGE_SIZE: u32 = 200;

/// Encode a replay cursor for the wire.
pub fn encode_cursor(seq: i64) -> String {
    seq.to_string()
}

/// Parse a wire cursor. Unparseable cursors read as `None` (start over) —
/// replay from the beginning is always safe under at-least-once.
pub fn parse_cursor(cursor: Option<&str>) -> Option<i64> {
    cursor.and_then(|c| c.parse::<i64>().ok())
}

/// Clamp a client-requested page size.
pub fn clamp_limit(requested: Option<u32>, default: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, MAX_PAGE_SIZE)
}

/// Append an envelope. `(recipient, message_id)` is unique; a second insert
/// of the same pair is ignored (idempotent under client retry). Returns
/// whether a row was actually written.
pub async fn enqueue(pool: &PgPool, env: &NewEnvelope) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO pending_envelopes (
            recipient, message_id, kind, msg_type, sender, timestamp,
            nonce, ciphertext, sig, reply_to, attachment,
            receipt_of, receipt_status, queued_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
        ON CONFLICT (recipient, message_id) DO NOTHING
        "#,
    )
    .bind(&env.recipient)
    .bind(env.message_id)
    .bind(env.kind)
    .bind(&env.msg_type)
    .bind(&env.sender)
    .bind(env.timestamp)
    .bind(&env.nonce)
    .bind(&env.ciphertext)
    .bind(&env.sig)
    .bind(env.reply_to)
    .bind(&env.attachment)
    .bind(env.receipt_of)
    .bind(&env.receipt_status)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Fetch one page of undelivered envelopes in insertion order.
///
/// Returns `(rows, next_cursor)`; `next_cursor` is `Some` iff more rows
/// remain past this page.
pub async fn fetch_page(
    pool: &PgPool,
    recipient: &str,
    cursor: Option<i64>,
    limit: u32,
) -> Result<(Vec<PendingEnvelope>, Option<i64>), sqlx::Error> {
    let limit = limit.clamp(1, MAX_PAGE_SIZE) as i64;
    // Fetch one extra row to learn whether another page exists.
    let mut rows = sqlx::query_as::<_, PendingEnvelope>(
        r#"
        SELECT * FROM pending_envelopes
        WHERE recipient = $1 AND seq > $2
        ORDER BY seq ASC
        LIMIT $3
        "#,
    )
    .bind(recipient)
    .bind(cursor.unwrap_or(0))
    .bind(limit + 1)
    .fetch_all(pool)
    .await?;

    let next_cursor = if rows.len() as i64 > limit {
        rows.truncate(limit as usize);
        rows.last().map(|r| r.seq)
    } else {
        None
    };
    Ok((rows, next_cursor))
}

/// Remove a delivered row. Idempotent: re-acking a missing row is a no-op.
pub async fn ack_delivered(
    pool: &PgPool,
    recipient: &str,
    message_id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM pending_envelopes WHERE recipient = $1 AND message_id = $2",
    )
    .bind(recipient)
    .bind(message_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// TTL sweep — drop rows older than `ttl_days`. Returns rows deleted.
pub async fn expire(pool: &PgPool, ttl_days: u32) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM pending_envelopes WHERE queued_at < NOW() - make_interval(days => $1)",
    )
    .bind(ttl_days as i32)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Queue depth for one recipient.
pub async fn count_for(pool: &PgPool, recipient: &str) -> Result<i64, sqlx::Error> {
    let row: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM pending_envelopes WHERE recipient = $1")
            .bind(recipient)
            .fetch_one(pool)
            .await?;
    Ok(row.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_round_trips() {
        assert_eq!(parse_cursor(Some(&encode_cursor(42))), Some(42));
        assert_eq!(parse_cursor(Some("9007199254740993")), Some(9_007_199_254_740_993));
    }

    #[test]
    fn garbage_cursor_restarts_replay() {
        assert_eq!(parse_cursor(Some("not-a-cursor")), None);
        assert_eq!(parse_cursor(Some("")), None);
        assert_eq!(parse_cursor(None), None);
    }

    #[test]
    fn limit_is_clamped_to_server_bounds() {
        assert_eq!(clamp_limit(None, 50), 50);
        assert_eq!(clamp_limit(Some(20), 50), 20);
        assert_eq!(clamp_limit(Some(0), 50), 1);
        assert_eq!(clamp_limit(Some(10_000), 50), MAX_PAGE_SIZE);
    }
}
