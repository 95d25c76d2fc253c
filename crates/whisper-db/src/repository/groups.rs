//! Group registry — routing metadata for group fanout.

use sqlx::PgPool;
use uuid::Uuid;
use whisper_common::models::{Group, GroupRole};

/// Create a group with its initial member list. The creator becomes the
/// owner and is always a member.
pub async fn create_group(
    pool: &PgPool,
    group_id: Uuid,
    name: &str,
    owner: &str,
    members: &[String],
) -> Result<Group, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let group = sqlx::query_as::<_, Group>(
        r#"
        INSERT INTO groups (group_id, name, owner, created_at, updated_at)
        VALUES ($1, $2, $3, NOW(), NOW())
        RETURNING *
        "#,
    )
    .bind(group_id)
    .bind(name)
    .bind(owner)
    .fetch_one(&mut *tx)
    .await?;

    add_member_tx(&mut tx, group_id, owner, GroupRole::Owner).await?;
    for member in members {
        if member != owner {
            add_member_tx(&mut tx, group_id, member, GroupRole::Member).await?;
        }
    }

    tx.commit().await?;
    Ok(group)
}

async fn add_member_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    group_id: Uuid,
    whisper_id: &str,
    role: GroupRole,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO group_members (group_id, whisper_id, role, active, joined_at)
        VALUES ($1, $2, $3, TRUE, NOW())
        ON CONFLICT (group_id, whisper_id) DO UPDATE SET active = TRUE, role = EXCLUDED.role
        "#,
    )
    .bind(group_id)
    .bind(whisper_id)
    .bind(role)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

pub async fn find(pool: &PgPool, group_id: Uuid) -> Result<Option<Group>, sqlx::Error> {
    sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE group_id = $1")
        .bind(group_id)
        .fetch_optional(pool)
        .await
}

/// Rename and/or adjust membership. Removed members are deactivated, not
/// deleted.
pub async fn update_group(
    pool: &PgPool,
    group_id: Uuid,
    name: Option<&str>,
    add_members: &[String],
    remove_members: &[String],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    if let Some(name) = name {
        sqlx::query("UPDATE groups SET name = $2, updated_at = NOW() WHERE group_id = $1")
            .bind(group_id)
            .bind(name)
            .execute(&mut *tx)
            .await?;
    }

    for member in add_members {
        add_member_tx(&mut tx, group_id, member, GroupRole::Member).await?;
    }

    if !remove_members.is_empty() {
        sqlx::query(
            r#"
            UPDATE group_members SET active = FALSE
            WHERE group_id = $1 AND whisper_id = ANY($2) AND role <> 'owner'
            "#,
        )
        .bind(group_id)
        .bind(remove_members)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE groups SET updated_at = NOW() WHERE group_id = $1")
        .bind(group_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Is this identity an active member?
pub async fn is_active_member(
    pool: &PgPool,
    group_id: Uuid,
    whisper_id: &str,
) -> Result<bool, sqlx::Error> {
    let row: Option<(bool,)> = sqlx::query_as(
        "SELECT active FROM group_members WHERE group_id = $1 AND whisper_id = $2",
    )
    .bind(group_id)
    .bind(whisper_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(active,)| active).unwrap_or(false))
}

/// Active members of a group, in join order.
pub async fn list_active_members(
    pool: &PgPool,
    group_id: Uuid,
) -> Result<Vec<String>, sqlx::Error> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT whisper_id FROM group_members
        WHERE group_id = $1 AND active = TRUE
        ORDER BY joined_at ASC
        "#,
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
