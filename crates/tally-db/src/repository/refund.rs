//! # Refund Repository
//!
//! Refunds are their own ledger. They reference a settled sale when they came
//! from one (`sale_id`), but never modify it.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tally_core::{Money, RefundRecord, RefundSource};

#[derive(Debug, sqlx::FromRow)]
struct RefundRow {
    id: String,
    source: String,
    product_id: Option<String>,
    description: String,
    amount_cents: i64,
    refunded_at: DateTime<Utc>,
}

impl TryFrom<RefundRow> for RefundRecord {
    type Error = crate::error::DbError;

    fn try_from(row: RefundRow) -> Result<Self, Self::Error> {
        let source: RefundSource = serde_json::from_str(&row.source)?;

        Ok(RefundRecord {
            id: row.id,
            source,
            product_id: row.product_id,
            description: row.description,
            amount: Money::from_cents(row.amount_cents),
            refunded_at: row.refunded_at,
        })
    }
}

fn source_kind(source: &RefundSource) -> &'static str {
    match source {
        RefundSource::CatalogLookup { .. } => "catalog_lookup",
        RefundSource::SettledLine { .. } => "settled_line",
        RefundSource::Manual { .. } => "manual",
    }
}

/// Repository for refunds.
#[derive(Debug, Clone)]
pub struct RefundRepository {
    pool: SqlitePool,
}

impl RefundRepository {
    pub fn new(pool: SqlitePool) -> Self {
        RefundRepository { pool }
    }

    pub async fn insert(&self, refund: &RefundRecord) -> DbResult<()> {
        debug!(id = %refund.id, amount = %refund.amount, "Inserting refund");

        let sale_id = match &refund.source {
            RefundSource::SettledLine { transaction_id, .. } => Some(transaction_id.as_str()),
            _ => None,
        };

        sqlx::query(
            r#"
            INSERT INTO refunds (
                id, source_kind, source, sale_id, product_id,
                description, amount_cents, refunded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&refund.id)
        .bind(source_kind(&refund.source))
        .bind(serde_json::to_string(&refund.source)?)
        .bind(sale_id)
        .bind(&refund.product_id)
        .bind(&refund.description)
        .bind(refund.amount.cents())
        .bind(refund.refunded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent refunds first.
    pub async fn list_recent(&self, limit: u32) -> DbResult<Vec<RefundRecord>> {
        let rows: Vec<RefundRow> = sqlx::query_as(
            r#"
            SELECT id, source, product_id, description, amount_cents, refunded_at
            FROM refunds
            ORDER BY refunded_at DESC, id
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RefundRecord::try_from).collect()
    }

    /// Refunds already issued against one settled sale.
    pub async fn for_sale(&self, sale_id: &str) -> DbResult<Vec<RefundRecord>> {
        let rows: Vec<RefundRow> = sqlx::query_as(
            r#"
            SELECT id, source, product_id, description, amount_cents, refunded_at
            FROM refunds
            WHERE sale_id = ?1
            ORDER BY refunded_at
            "#,
        )
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(RefundRecord::try_from).collect()
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM refunds")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
