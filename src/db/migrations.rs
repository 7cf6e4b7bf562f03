use sqlx::SqlitePool;
use tracing::{info, warn};

/// Run all pending database migrations
///
/// The SQL files under `migrations/` are embedded at compile time and
/// applied in order; sqlx records applied versions, so repeated runs are
/// no-ops.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("Running database migrations...");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await?;

    info!("Database migrations completed successfully");
    Ok(())
}

/// Drop the queue and the migration ledger so the next migration run
/// recreates the schema from scratch
///
/// Reset policy: the queue is not preserved across runs unless the caller
/// opts out of the reset.
pub async fn reset_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    warn!("Resetting job queue: dropping existing jobs table");

    sqlx::query("DROP TABLE IF EXISTS jobs")
        .execute(pool)
        .await?;
    sqlx::query("DROP TABLE IF EXISTS _sqlx_migrations")
        .execute(pool)
        .await?;

    Ok(())
}
