//! Attachment metadata and access grants.

use sqlx::PgPool;
use whisper_common::models::AttachmentMeta;

/// Record a presigned upload. The blob is not fetchable by anyone but the
/// owner until an accepted envelope references it.
pub async fn record_upload(
    pool: &PgPool,
    object_key: &str,
    owner: &str,
    size: i64,
    content_type: &str,
    ttl_days: u32,
) -> Result<AttachmentMeta, sqlx::Error> {
    sqlx::query_as::<_, AttachmentMeta>(
        r#"
        INSERT INTO attachments (object_key, owner, size, content_type, status, created_at, expires_at)
        VALUES ($1, $2, $3, $4, 'pending', NOW(), NOW() + make_interval(days => $5))
        RETURNING *
        "#,
    )
    .bind(object_key)
    .bind(owner)
    .bind(size)
    .bind(content_type)
    .bind(ttl_days as i32)
    .fetch_one(pool)
    .await
}

/// Find an unexpired attachment owned by `owner`.
pub async fn find_owned(
    pool: &PgPool,
    object_key: &str,
    owner: &str,
) -> Result<Option<AttachmentMeta>, sqlx::Error> {
    sqlx::query_as::<_, AttachmentMeta>(
        "SELECT * FROM attachments WHERE object_key = $1 AND owner = $2 AND expires_at > NOW()",
    )
    .bind(object_key)
    .bind(owner)
    .fetch_optional(pool)
    .await
}

/// Mark an attachment as referenced by an accepted envelope.
pub async fn mark_linked(pool: &PgPool, object_key: &str) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE attachments SET status = 'linked' WHERE object_key = $1")
        .bind(object_key)
        .execute(pool)
        .await?;
    Ok(())
}

/// Grant a recipient download access. Re-granting extends the expiry.
pub async fn grant_access(
    pool: &PgPool,
    object_key: &str,
    whisper_id: &str,
    ttl_days: u32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO attachment_grants (object_key, whisper_id, expires_at)
        VALUES ($1, $2, NOW() + make_interval(days => $3))
        ON CONFLICT (object_key, whisper_id)
        DO UPDATE SET expires_at = GREATEST(attachment_grants.expires_at, EXCLUDED.expires_at)
        "#,
    )
    .bind(object_key)
    .bind(whisper_id)
    .bind(ttl_days as i32)
    .execute(pool)
    .await?;
    Ok(())
}

/// Does the caller hold an unexpired grant (or own the blob)?
pub async fn has_valid_grant(
    pool: &PgPool,
    object_key: &str,
    whisper_id: &str,
) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM attachment_grants
            WHERE object_key = $1 AND whisper_id = $2 AND expires_at > NOW()
        ) OR EXISTS (
            SELECT 1 FROM attachments
            WHERE object_key = $1 AND owner = $2 AND expires_at > NOW()
        )
        "#,
    )
    .bind(object_key)
    .bind(whisper_id)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Drop expired metadata and grants. Returns rows deleted.
pub async fn expire(pool: &PgPool) -> Result<u64, sqlx::Error> {
    let grants = sqlx::query("DELETE FROM attachment_grants WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;
    let metas = sqlx::query("DELETE FROM attachments WHERE expires_at <= NOW()")
        .execute(pool)
        .await?;
    Ok(grants.rows_affected() + metas.rows_affected())
}
