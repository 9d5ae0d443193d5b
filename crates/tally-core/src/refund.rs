//! # Refund Processor
//!
//! Armed, single-shot refunds.
//!
//! ```text
//! arm() ──► scan ──► lookup_and_refund ──► RefundRecord (negative) ──► disarmed
//!                          │
//!                          └── unknown barcode → ProductNotFound, still armed
//! ```
//!
//! Refunds never touch the active sale or stock. They are independent
//! records; the caller persists them.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::catalog::CatalogCache;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{RefundRecord, RefundSource, SettledTransaction};
use crate::validation::{validate_barcode, validate_tender_amount};

/// Tracks whether the next scan is a refund.
#[derive(Debug, Clone, Default)]
pub struct RefundProcessor {
    armed: bool,
}

impl RefundProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms refund mode. Idempotent.
    pub fn arm(&mut self) {
        if !self.armed {
            debug!("Refund armed");
        }
        self.armed = true;
    }

    /// Disarms refund mode. Idempotent.
    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_refund_armed(&self) -> bool {
        self.armed
    }

    /// Resolves a refund for `barcode` at its current catalog price without
    /// disarming. The caller disarms once the record is persisted.
    ///
    /// Weight-sold products have no per-scan price and are refunded with
    /// `refund_manual` instead.
    pub fn prepare_refund(&self, catalog: &CatalogCache, barcode: &str) -> CoreResult<RefundRecord> {
        if !self.armed {
            return Err(CoreError::RefundNotArmed);
        }

        let product = catalog
            .lookup(barcode)
            .ok_or_else(|| CoreError::ProductNotFound(barcode.trim().to_string()))?;

        if product.sold_by_weight {
            return Err(CoreError::NotSoldByUnit {
                barcode: product.barcode,
            });
        }

        Ok(RefundRecord {
            id: Uuid::new_v4().to_string(),
            source: RefundSource::CatalogLookup {
                barcode: product.barcode.clone(),
            },
            product_id: Some(product.id.clone()),
            description: product.name.clone(),
            amount: -product.unit_price(),
            refunded_at: Utc::now(),
        })
    }

    /// Single-shot refund: resolves the price and disarms on success.
    pub fn lookup_and_refund(
        &mut self,
        catalog: &CatalogCache,
        barcode: &str,
    ) -> CoreResult<RefundRecord> {
        let record = self.prepare_refund(catalog, barcode)?;
        self.armed = false;
        Ok(record)
    }

    /// Refunds one line of a settled sale at the price it was sold for.
    pub fn refund_settled_line(
        &self,
        transaction: &SettledTransaction,
        line_id: &str,
    ) -> CoreResult<RefundRecord> {
        let line = transaction
            .line(line_id)
            .ok_or_else(|| CoreError::LineNotFound(line_id.to_string()))?;

        Ok(RefundRecord {
            id: Uuid::new_v4().to_string(),
            source: RefundSource::SettledLine {
                transaction_id: transaction.id.clone(),
                receipt_number: transaction.receipt_number.clone(),
                line_id: line.id.clone(),
            },
            product_id: line.product_id.clone(),
            description: line.name.clone(),
            amount: -line.line_total(),
            refunded_at: Utc::now(),
        })
    }

    /// Refunds an operator-entered barcode/amount pair. `amount` is the
    /// positive value handed back.
    pub fn refund_manual(&self, barcode: &str, amount: Money) -> CoreResult<RefundRecord> {
        validate_barcode(barcode)?;
        validate_tender_amount(amount.cents())?;

        Ok(RefundRecord {
            id: Uuid::new_v4().to_string(),
            source: RefundSource::Manual {
                barcode: barcode.trim().to_string(),
            },
            product_id: None,
            description: format!("Manual refund {}", barcode.trim()),
            amount: -amount,
            refunded_at: Utc::now(),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
