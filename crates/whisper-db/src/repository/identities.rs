//! Identity registry — immutable `(whisperId, encPub, signPub)` triples.

use sqlx::PgPool;
use whisper_common::error::{RelayError, RelayResult};
use whisper_common::models::{Identity, IdentityStatus};

/// Register an identity, or verify a re-registration.
///
/// The first successful registration for a WhisperID wins and the key pair
/// is immutable from then on. A later registration for the same ID must
/// present the same signing key (same seed) — a mismatch is `AUTH_FAILED`.
pub async fn create_or_verify(
    pool: &PgPool,
    whisper_id: &str,
    enc_public_key: &str,
    sign_public_key: &str,
) -> RelayResult<Identity> {
    let inserted = sqlx::query_as::<_, Identity>(
        r#"
        INSERT INTO identities (whisper_id, enc_public_key, sign_public_key, status, created_at, updated_at)
        VALUES ($1, $2, $3, 'active', NOW(), NOW())
        ON CONFLICT (whisper_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(whisper_id)
    .bind(enc_public_key)
    .bind(sign_public_key)
    .fetch_optional(pool)
    .await?;

    if let Some(identity) = inserted {
        return Ok(identity);
    }

    // Row already existed — this is a re-registration (same mnemonic, new
    // install) and must prove possession of the original signing key.
    let existing = find(pool, whisper_id)
        .await?
        .ok_or_else(|| RelayError::NotFound { resource: "identity".into() })?;
    if existing.sign_public_key != sign_public_key {
        return Err(RelayError::AuthFailed);
    }
    Ok(existing)
}

/// Look up an identity by WhisperID.
pub async fn find(pool: &PgPool, whisper_id: &str) -> Result<Option<Identity>, sqlx::Error> {
    sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE whisper_id = $1")
        .bind(whisper_id)
        .fetch_optional(pool)
        .await
}

/// Flip an identity between `active` and `banned`.
pub async fn set_status(
    pool: &PgPool,
    whisper_id: &str,
    status: IdentityStatus,
) -> Result<bool, sqlx::Error> {
    let status_str = match status {
        IdentityStatus::Active => "active",
        IdentityStatus::Banned => "banned",
    };
    let result =
        sqlx::query("UPDATE identities SET status = $2, updated_at = NOW() WHERE whisper_id = $1")
            .bind(whisper_id)
            .bind(status_str)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}
