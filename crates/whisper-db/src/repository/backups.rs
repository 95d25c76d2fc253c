//! Contact-backup store — one opaque encrypted blob per identity.

use sqlx::PgPool;
use whisper_common::models::ContactBackup;

/// Upsert the backup blob. Uploads overwrite; the relay never reads the
/// ciphertext.
pub async fn upsert(
    pool: &PgPool,
    whisper_id: &str,
    nonce: &str,
    ciphertext: &str,
    size_bytes: i64,
) -> Result<ContactBackup, sqlx::Error> {
    sqlx::query_as::<_, ContactBackup>(
        r#"
        INSERT INTO contact_backups (whisper_id, nonce, ciphertext, size_bytes, updated_at)
        VALUES ($1, $2, $3, $4, NOW())
        ON CONFLICT (whisper_id) DO UPDATE SET
            nonce = EXCLUDED.nonce,
            ciphertext = EXCLUDED.ciphertext,
            size_bytes = EXCLUDED.size_bytes,
            updated_at = NOW()
        RETURNING *
        "#,
    )
    .bind(whisper_id)
    .bind(nonce)
    .bind(ciphertext)
    .bind(size_bytes)
    .fetch_one(pool)
    .await
}

pub async fn get(pool: &PgPool, whisper_id: &str) -> Result<Option<ContactBackup>, sqlx::Error> {
    sqlx::query_as::<_, ContactBackup>("SELECT * FROM contact_backups WHERE whisper_id = $1")
        .bind(whisper_id)
        .fetch_optional(pool)
        .await
}

pub async fn delete(pool: &PgPool, whisper_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM contact_backups WHERE whisper_id = $1")
        .bind(whisper_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
