//! # Hold Repository
//!
//! Durable copies of held sessions.
//!
//! The full `HoldRecord` is stored as a JSON snapshot; the other columns are
//! only there so the table can be inspected without parsing JSON. On start-up
//! every stored record is handed back to the in-memory `HoldStore`.

use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use tally_core::hold::HoldRecord;

#[derive(Debug, sqlx::FromRow)]
struct HeldRow {
    hold_id: String,
    snapshot: String,
}

/// Repository for held sessions.
#[derive(Debug, Clone)]
pub struct HoldRepository {
    pool: SqlitePool,
}

impl HoldRepository {
    pub fn new(pool: SqlitePool) -> Self {
        HoldRepository { pool }
    }

    /// Stores (or overwrites) a hold.
    pub async fn record(&self, record: &HoldRecord) -> DbResult<()> {
        debug!(hold_id = %record.hold_id, "Recording hold");

        let snapshot = serde_json::to_string(record)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO held_sessions (
                hold_id, session_id, captured_at, subtotal_cents, snapshot
            ) VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&record.hold_id)
        .bind(&record.session_id)
        .bind(record.captured_at)
        .bind(record.subtotal().cents())
        .bind(snapshot)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Removes a hold.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - No such hold stored
    pub async fn release(&self, hold_id: &str) -> DbResult<()> {
        debug!(hold_id = %hold_id, "Releasing hold");

        let result = sqlx::query("DELETE FROM held_sessions WHERE hold_id = ?1")
            .bind(hold_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Hold", hold_id));
        }

        Ok(())
    }

    /// Every stored hold, oldest capture first.
    ///
    /// A snapshot that no longer parses is skipped with a warning rather than
    /// blocking start-up; the row stays in place for inspection.
    pub async fn list(&self) -> DbResult<Vec<HoldRecord>> {
        let rows: Vec<HeldRow> = sqlx::query_as(
            "SELECT hold_id, snapshot FROM held_sessions ORDER BY captured_at, hold_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str::<HoldRecord>(&row.snapshot) {
                Ok(record) => records.push(record),
                Err(e) => warn!(hold_id = %row.hold_id, error = %e, "Skipping unreadable hold"),
            }
        }

        Ok(records)
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM held_sessions")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
