//! # Sale Repository
//!
//! Settled transactions: header, lines and payments.
//!
//! ## Single-transaction commit
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  insert_settled(tx)                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BEGIN                                                                  │
//! │    INSERT INTO sales        (one row, receipt_number UNIQUE)            │
//! │    INSERT INTO sale_items   (one row per line, in cart order)           │
//! │    INSERT INTO payments     (one row per confirmed tender)              │
//! │  COMMIT  ← all or nothing; a failure leaves no partial sale             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock is deliberately not touched here. The engine applies stock deltas
//! separately, after the commit, with its own compensation.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{LineItem, LineMeasure, Money, PaymentMethod, SettledPayment, SettledTransaction};

const MEASURE_UNITS: &str = "units";
const MEASURE_WEIGHT: &str = "weight";

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: String,
    receipt_number: String,
    session_id: String,
    subtotal_cents: i64,
    total_cents: i64,
    change_cents: i64,
    settled_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct SaleItemRow {
    id: String,
    product_id: Option<String>,
    barcode: Option<String>,
    name: String,
    measure: String,
    quantity: i64,
    unit_price_cents: i64,
    added_at: DateTime<Utc>,
}

impl TryFrom<SaleItemRow> for LineItem {
    type Error = DbError;

    fn try_from(row: SaleItemRow) -> Result<Self, Self::Error> {
        let measure = match row.measure.as_str() {
            MEASURE_UNITS => LineMeasure::Units(row.quantity),
            MEASURE_WEIGHT => LineMeasure::Weight(row.quantity),
            other => {
                return Err(DbError::invalid_data(format!(
                    "sale item {} has measure '{}'",
                    row.id, other
                )))
            }
        };

        Ok(LineItem {
            id: row.id,
            product_id: row.product_id,
            barcode: row.barcode,
            name: row.name,
            measure,
            unit_price: Money::from_cents(row.unit_price_cents),
            added_at: row.added_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    method: PaymentMethod,
    amount_cents: i64,
    tendered_cents: i64,
    change_cents: i64,
}

impl From<PaymentRow> for SettledPayment {
    fn from(row: PaymentRow) -> Self {
        SettledPayment {
            method: row.method,
            amount: Money::from_cents(row.amount_cents),
            tendered: Money::from_cents(row.tendered_cents),
            change: Money::from_cents(row.change_cents),
        }
    }
}

fn measure_parts(measure: &LineMeasure) -> (&'static str, i64) {
    match measure {
        LineMeasure::Units(qty) => (MEASURE_UNITS, *qty),
        LineMeasure::Weight(grams) => (MEASURE_WEIGHT, *grams),
    }
}

/// Repository for settled sales.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Stores a settled transaction atomically.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - Receipt number or sale id already stored
    pub async fn insert_settled(&self, transaction: &SettledTransaction) -> DbResult<()> {
        debug!(
            receipt = %transaction.receipt_number,
            lines = transaction.lines.len(),
            payments = transaction.payments.len(),
            "Inserting settled sale"
        );

        let mut db_tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO sales (
                id, receipt_number, session_id, subtotal_cents,
                total_cents, change_cents, settled_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&transaction.id)
        .bind(&transaction.receipt_number)
        .bind(&transaction.session_id)
        .bind(transaction.subtotal.cents())
        .bind(transaction.total.cents())
        .bind(transaction.change_given.cents())
        .bind(transaction.settled_at)
        .execute(&mut *db_tx)
        .await?;

        for (position, line) in transaction.lines.iter().enumerate() {
            let (measure, quantity) = measure_parts(&line.measure);

            sqlx::query(
                r#"
                INSERT INTO sale_items (
                    id, sale_id, position, product_id, barcode, name, measure,
                    quantity, unit_price_cents, line_total_cents, added_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(&line.id)
            .bind(&transaction.id)
            .bind(position as i64)
            .bind(&line.product_id)
            .bind(&line.barcode)
            .bind(&line.name)
            .bind(measure)
            .bind(quantity)
            .bind(line.unit_price.cents())
            .bind(line.line_total().cents())
            .bind(line.added_at)
            .execute(&mut *db_tx)
            .await?;
        }

        for payment in &transaction.payments {
            sqlx::query(
                r#"
                INSERT INTO payments (
                    sale_id, method, amount_cents, tendered_cents, change_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&transaction.id)
            .bind(payment.method)
            .bind(payment.amount.cents())
            .bind(payment.tendered.cents())
            .bind(payment.change.cents())
            .execute(&mut *db_tx)
            .await?;
        }

        db_tx.commit().await?;
        Ok(())
    }

    /// Rebuilds a settled transaction from its receipt number.
    pub async fn get_by_receipt(&self, receipt_number: &str) -> DbResult<Option<SettledTransaction>> {
        let row: Option<SaleRow> = sqlx::query_as(
            r#"
            SELECT id, receipt_number, session_id, subtotal_cents,
                   total_cents, change_cents, settled_at
            FROM sales
            WHERE receipt_number = ?1
            "#,
        )
        .bind(receipt_number)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => self.hydrate(row).await.map(Some),
            None => Ok(None),
        }
    }

    async fn hydrate(&self, row: SaleRow) -> DbResult<SettledTransaction> {
        let items: Vec<SaleItemRow> = sqlx::query_as(
            r#"
            SELECT id, product_id, barcode, name, measure,
                   quantity, unit_price_cents, added_at
            FROM sale_items
            WHERE sale_id = ?1
            ORDER BY position
            "#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let payments: Vec<PaymentRow> = sqlx::query_as(
            r#"
            SELECT method, amount_cents, tendered_cents, change_cents
            FROM payments
            WHERE sale_id = ?1
            ORDER BY id
            "#,
        )
        .bind(&row.id)
        .fetch_all(&self.pool)
        .await?;

        let lines = items
            .into_iter()
            .map(LineItem::try_from)
            .collect::<DbResult<Vec<_>>>()?;

        Ok(SettledTransaction {
            id: row.id,
            receipt_number: row.receipt_number,
            session_id: row.session_id,
            settled_at: row.settled_at,
            subtotal: Money::from_cents(row.subtotal_cents),
            total: Money::from_cents(row.total_cents),
            change_given: Money::from_cents(row.change_cents),
            payments: payments.into_iter().map(SettledPayment::from).collect(),
            lines,
        })
    }

    /// Highest receipt counter used by `device_code` on `date`, or 0.
    ///
    /// Receipt numbers are `YYYYMMDD-DD-NNNN`, so the zero-padded counter
    /// sorts lexically up to 9999.
    pub async fn last_receipt_sequence(&self, date: NaiveDate, device_code: &str) -> DbResult<u32> {
        let prefix = format!("{}-{}-", date.format("%Y%m%d"), device_code);

        let last: Option<String> = sqlx::query_scalar(
            r#"
            SELECT receipt_number
            FROM sales
            WHERE substr(receipt_number, 1, length(?1)) = ?1
            ORDER BY length(receipt_number) DESC, receipt_number DESC
            LIMIT 1
            "#,
        )
        .bind(&prefix)
        .fetch_optional(&self.pool)
        .await?;

        match last {
            Some(receipt) => receipt
                .strip_prefix(&prefix)
                .and_then(|seq| seq.parse::<u32>().ok())
                .ok_or_else(|| {
                    DbError::invalid_data(format!("unparseable receipt number '{}'", receipt))
                }),
            None => Ok(0),
        }
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sales")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
