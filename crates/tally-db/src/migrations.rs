//! # Schema Migrations
//!
//! The schema ships inside the binary: every file under `migrations/sqlite/`
//! is embedded at compile time and applied in file-name order on first open.
//! sqlx records applied versions in `_sqlx_migrations`, so re-opening a
//! terminal store is a no-op.
//!
//! ```text
//!  001_initial_schema.sql   products, sales, sale_items, payments,
//!                           held_sessions, refunds
//! ```
//!
//! Applied files are never edited; schema changes go in a new `NNN_*.sql`.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies pending migrations, each in its own transaction.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    debug!(embedded = MIGRATOR.migrations.len(), "Applying schema migrations");
    MIGRATOR.run(pool).await?;
    info!("Schema up to date");
    Ok(())
}

/// `(embedded, applied)` migration counts. A store that was never migrated
/// reports zero applied.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let embedded = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .unwrap_or(0);

    Ok((embedded, applied as usize))
}
