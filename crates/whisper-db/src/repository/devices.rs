//! Device bindings — one row per `(whisperId, deviceId)`.

use sqlx::PgPool;
use uuid::Uuid;
use whisper_common::models::Device;

/// Bind (or re-bind) a device to an identity. Returns `true` when the
/// binding is new for this identity — the caller then revokes all prior
/// sessions to keep at most one active device.
pub async fn bind_device(
    pool: &PgPool,
    whisper_id: &str,
    device_id: Uuid,
    platform: &str,
    push_token: Option<&str>,
    voip_token: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let existing: Option<(Uuid,)> = sqlx::query_as(
        "SELECT device_id FROM devices WHERE whisper_id = $1 AND device_id = $2",
    )
    .bind(whisper_id)
    .bind(device_id)
    .fetch_optional(pool)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO devices (whisper_id, device_id, platform, push_token, voip_token, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
        ON CONFLICT (whisper_id, device_id) DO UPDATE SET
            platform = EXCLUDED.platform,
            push_token = COALESCE(EXCLUDED.push_token, devices.push_token),
            voip_token = COALESCE(EXCLUDED.voip_token, devices.voip_token),
            updated_at = NOW()
        "#,
    )
    .bind(whisper_id)
    .bind(device_id)
    .bind(platform)
    .bind(push_token)
    .bind(voip_token)
    .execute(pool)
    .await?;

    Ok(existing.is_none())
}

/// Find a device binding.
pub async fn find(
    pool: &PgPool,
    whisper_id: &str,
    device_id: Uuid,
) -> Result<Option<Device>, sqlx::Error> {
    sqlx::query_as::<_, Device>(
        "SELECT * FROM devices WHERE whisper_id = $1 AND device_id = $2",
    )
    .bind(whisper_id)
    .bind(device_id)
    .fetch_optional(pool)
    .await
}

/// Devices of an identity, newest binding first (push hand-off targets).
pub async fn list_for(pool: &PgPool, whisper_id: &str) -> Result<Vec<Device>, sqlx::Error> {
    sqlx::query_as::<_, Device>(
        "SELECT * FROM devices WHERE whisper_id = $1 ORDER BY updated_at DESC",
    )
    .bind(whisper_id)
    .fetch_all(pool)
    .await
}

/// Refresh push/VoIP tokens (`update_tokens` frame).
pub async fn update_tokens(
    pool: &PgPool,
    whisper_id: &str,
    device_id: Uuid,
    push_token: Option<&str>,
    voip_token: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE devices SET
            push_token = COALESCE($3, push_token),
            voip_token = COALESCE($4, voip_token),
            updated_at = NOW()
        WHERE whisper_id = $1 AND device_id = $2
        "#,
    )
    .bind(whisper_id)
    .bind(device_id)
    .bind(push_token)
    .bind(voip_token)
    .execute(pool)
    .await?;
    Ok(())
}
