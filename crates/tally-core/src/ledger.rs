//! # Line Item Ledger
//!
//! Ordered sale lines and the subtotal derived from them.
//!
//! ## Entry Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  scan "111" ──► add_unit_item ──► existing line for product?            │
//! │                                   ├── yes → quantity += qty             │
//! │                                   └── no  → push new Units line         │
//! │                                                                         │
//! │  weigh 750g ──► add_weight_item ──► always a new Weight line           │
//! │                                                                         │
//! │  operator   ──► add_ad_hoc_item ──► always a new line, no product id   │
//! │                                                                         │
//! │  subtotal() = Σ line_total()   (never cached)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use uuid::Uuid;

use crate::catalog::CatalogCache;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{LineItem, LineMeasure, Product};
use crate::validation::{validate_item_name, validate_unit_price_cents};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY, MAX_WEIGHT_GRAMS};

/// Ordered line items of one sale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineLedger {
    lines: Vec<LineItem>,
}

impl LineLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from frozen lines (hold resume).
    pub fn from_lines(lines: Vec<LineItem>) -> Self {
        LineLedger { lines }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn lines(&self) -> &[LineItem] {
        &self.lines
    }

    pub fn line(&self, line_id: &str) -> Option<&LineItem> {
        self.lines.iter().find(|l| l.id == line_id)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Sum of all line totals, recomputed on every call.
    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(LineItem::line_total).sum()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Adds `qty` units of a catalog product, found by barcode or id.
    ///
    /// Re-scanning a product already in the sale increments its line.
    pub fn add_unit_item(
        &mut self,
        catalog: &CatalogCache,
        code: &str,
        qty: i64,
    ) -> CoreResult<LineItem> {
        check_quantity(qty)?;

        let product = catalog
            .lookup(code)
            .ok_or_else(|| CoreError::ProductNotFound(code.trim().to_string()))?;

        if product.sold_by_weight {
            return Err(CoreError::NotSoldByUnit {
                barcode: product.barcode,
            });
        }

        let existing = self.lines.iter_mut().find(|l| {
            l.product_id.as_deref() == Some(product.id.as_str())
                && matches!(l.measure, LineMeasure::Units(_))
        });

        if let Some(line) = existing {
            let current = line.quantity().unwrap_or(0);
            let new_qty = current + qty;
            if new_qty > MAX_ITEM_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: new_qty,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            line.measure = LineMeasure::Units(new_qty);
            return Ok(line.clone());
        }

        self.push(catalog_line(&product, LineMeasure::Units(qty)))
    }

    /// Adds a weighed portion of a weight-sold product as its own line.
    pub fn add_weight_item(
        &mut self,
        catalog: &CatalogCache,
        code: &str,
        grams: i64,
    ) -> CoreResult<LineItem> {
        let product = catalog
            .lookup(code)
            .ok_or_else(|| CoreError::ProductNotFound(code.trim().to_string()))?;

        if !product.sold_by_weight {
            return Err(CoreError::NotSoldByWeight {
                barcode: product.barcode,
            });
        }

        if grams <= 0 || grams > MAX_WEIGHT_GRAMS {
            return Err(CoreError::InvalidWeight { grams });
        }

        self.push(catalog_line(&product, LineMeasure::Weight(grams)))
    }

    /// Adds an item that is not in the catalog. Never merged with other lines.
    pub fn add_ad_hoc_item(
        &mut self,
        name: &str,
        qty: i64,
        unit_price: Money,
    ) -> CoreResult<LineItem> {
        validate_item_name(name)?;
        check_quantity(qty)?;
        validate_unit_price_cents(unit_price.cents())?;

        self.push(LineItem {
            id: Uuid::new_v4().to_string(),
            product_id: None,
            barcode: None,
            name: name.trim().to_string(),
            measure: LineMeasure::Units(qty),
            unit_price,
            added_at: Utc::now(),
        })
    }

    /// Removes a line. Returns `false` when the id is unknown (already removed).
    pub fn remove_item(&mut self, line_id: &str) -> bool {
        let before = self.lines.len();
        self.lines.retain(|l| l.id != line_id);
        self.lines.len() != before
    }

    /// Changes a unit line's quantity by `delta`.
    ///
    /// A result below one unit is rejected and the line is left unchanged;
    /// removing a line is always an explicit `remove_item`.
    pub fn adjust_quantity(&mut self, line_id: &str, delta: i64) -> CoreResult<LineItem> {
        let line = self
            .lines
            .iter_mut()
            .find(|l| l.id == line_id)
            .ok_or_else(|| CoreError::LineNotFound(line_id.to_string()))?;

        let current = match line.measure {
            LineMeasure::Units(qty) => qty,
            LineMeasure::Weight(_) => {
                return Err(CoreError::InvalidQuantity {
                    line_id: line_id.to_string(),
                    reason: "weighed lines cannot change quantity".to_string(),
                })
            }
        };

        let new_qty = current + delta;
        if new_qty < 1 {
            return Err(CoreError::InvalidQuantity {
                line_id: line_id.to_string(),
                reason: format!("quantity would become {}", new_qty),
            });
        }
        if new_qty > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: new_qty,
                max: MAX_ITEM_QUANTITY,
            });
        }

        line.measure = LineMeasure::Units(new_qty);
        Ok(line.clone())
    }

    /// Removes every line.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    fn push(&mut self, line: LineItem) -> CoreResult<LineItem> {
        if self.lines.len() >= MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge {
                max: MAX_CART_ITEMS,
            });
        }
        self.lines.push(line.clone());
        Ok(line)
    }
}

fn catalog_line(product: &Product, measure: LineMeasure) -> LineItem {
    LineItem {
        id: Uuid::new_v4().to_string(),
        product_id: Some(product.id.clone()),
        barcode: Some(product.barcode.clone()),
        name: product.name.clone(),
        measure,
        unit_price: product.unit_price(),
        added_at: Utc::now(),
    }
}

fn check_quantity(qty: i64) -> CoreResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }
    if qty > MAX_ITEM_QUANTITY {
        return Err(CoreError::QuantityTooLarge {
            requested: qty,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
