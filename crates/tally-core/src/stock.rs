//! # Stock Adjuster
//!
//! Applies a committed sale's quantities to the store and the catalog cache.
//!
//! ## All-or-Nothing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  lines ──aggregate──► { tea: -3, apples: -750 }                         │
//! │                              │                                          │
//! │                              ▼                                          │
//! │              sink.adjust_stock(tea, -3)      ✓                          │
//! │              sink.adjust_stock(apples, -750) ✗                          │
//! │                              │                                          │
//! │                              ▼                                          │
//! │              compensate: adjust_stock(tea, +3)                          │
//! │              cache untouched, StockPersistenceFailed warning            │
//! │                                                                         │
//! │  On success: one cache swap with every decrement, then low-stock alerts │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Runs only after the transaction is committed. A failure here never undoes
//! the sale. Stock may go negative.

use std::collections::BTreeMap;

use tracing::{debug, error, info, warn};

use crate::catalog::CatalogCache;
use crate::error::CoreError;
use crate::sink::PersistenceSink;
use crate::types::{LineItem, SettledTransaction, StockAlert};

/// Outcome of applying a settlement to stock.
#[derive(Debug, Default)]
pub struct StockOutcome {
    pub alerts: Vec<StockAlert>,
    /// Set when the stock write was rolled back. The sale still stands.
    pub warning: Option<CoreError>,
}

/// Sums catalog-backed lines into one negative delta per product.
pub fn aggregate_deltas(lines: &[LineItem]) -> BTreeMap<String, i64> {
    let mut deltas = BTreeMap::new();
    for line in lines {
        if let Some(product_id) = &line.product_id {
            *deltas.entry(product_id.clone()).or_insert(0) -= line.measure.stock_amount();
        }
    }
    deltas
}

/// Writes the sale's stock decrements, compensating on partial failure.
pub async fn apply_settlement<S: PersistenceSink>(
    catalog: &CatalogCache,
    sink: &S,
    transaction: &SettledTransaction,
) -> StockOutcome {
    let deltas = aggregate_deltas(&transaction.lines);
    if deltas.is_empty() {
        return StockOutcome::default();
    }

    let mut applied: Vec<(&String, i64)> = Vec::with_capacity(deltas.len());
    for (product_id, delta) in &deltas {
        if let Err(e) = sink.adjust_stock(product_id, *delta).await {
            warn!(
                receipt = %transaction.receipt_number,
                product_id = %product_id,
                error = %e,
                "Stock write failed; compensating"
            );
            compensate(sink, &applied).await;
            return StockOutcome {
                alerts: Vec::new(),
                warning: Some(CoreError::StockPersistenceFailed {
                    receipt_number: transaction.receipt_number.clone(),
                    message: e.to_string(),
                }),
            };
        }
        applied.push((product_id, *delta));
    }

    let updated = catalog.apply_stock_deltas(&deltas);
    debug!(
        receipt = %transaction.receipt_number,
        products = updated.len(),
        "Stock adjusted"
    );

    let alerts: Vec<StockAlert> = updated
        .into_iter()
        .filter(|p| p.is_low_stock_at(p.stock_quantity))
        .map(|p| StockAlert {
            product_id: p.id,
            barcode: p.barcode,
            name: p.name,
            remaining: p.stock_quantity,
            threshold: p.min_stock_threshold,
        })
        .collect();

    for alert in &alerts {
        info!(
            barcode = %alert.barcode,
            remaining = alert.remaining,
            threshold = alert.threshold,
            "Low stock"
        );
    }

    StockOutcome {
        alerts,
        warning: None,
    }
}

async fn compensate<S: PersistenceSink>(sink: &S, applied: &[(&String, i64)]) {
    for (product_id, delta) in applied.iter().rev() {
        if let Err(e) = sink.adjust_stock(product_id, -delta).await {
            error!(
                product_id = %product_id,
                delta = -delta,
                error = %e,
                "Stock compensation failed; store stock needs a recount"
            );
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
