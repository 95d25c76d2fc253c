//! PostgreSQL helpers.

use sqlx::PgPool;

/// Liveness probe — used by `/ready`.
pub async fn health_check(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").execute(pool).await.is_ok()
}
