//! # Input Rules
//!
//! Checks on values a cashier can type or a scanner can send, applied before
//! anything is mutated: by the ledgers for sale input, by the product store
//! for catalog rows. A failing check changes nothing.
//!
//! | Value | Rule |
//! |-------|------|
//! | barcode / code | 1..=64 chars of `[A-Za-z0-9_-]` |
//! | item name | 1..=200 chars after trimming |
//! | ad-hoc price, tender, refund | 1..=`MAX_AMOUNT_CENTS` |
//! | catalog cost | 0..=`MAX_AMOUNT_CENTS` |
//! | markup | 0..=100_000 bps |
//!
//! Quantity and line-count caps belong to the ledger, which reports them as
//! `CoreError::QuantityTooLarge` / `CartTooLarge`.
//!
//! ```rust
//! use tally_core::validation::{validate_barcode, validate_tender_amount};
//!
//! assert!(validate_barcode("4006381333931").is_ok());
//! assert!(validate_tender_amount(0).is_err());
//! ```

use crate::error::ValidationError;
use crate::types::Product;
use crate::{MAX_AMOUNT_CENTS, MAX_BARCODE_LEN, MAX_ITEM_NAME_LEN};

pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// EAN/UPC barcodes, PLU codes and internal product ids all pass.
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    let barcode = barcode.trim();

    if barcode.is_empty() {
        return Err(ValidationError::Required {
            field: "barcode".to_string(),
        });
    }

    if barcode.len() > MAX_BARCODE_LEN {
        return Err(ValidationError::TooLong {
            field: "barcode".to_string(),
            max: MAX_BARCODE_LEN,
        });
    }

    if !barcode
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must contain only letters, digits, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Display name of an ad-hoc item or catalog entry. Length counts chars.
pub fn validate_item_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > MAX_ITEM_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_ITEM_NAME_LEN,
        });
    }

    Ok(())
}

/// Catalog entry as written to the store.
pub fn validate_product(product: &Product) -> ValidationResult<()> {
    validate_barcode(&product.barcode)?;
    validate_item_name(&product.name)?;
    validate_cost_cents(product.cost_cents)?;
    validate_markup_bps(product.markup_bps)
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a unit price for an ad-hoc item. Free ad-hoc lines are not allowed.
pub fn validate_unit_price_cents(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "price".to_string(),
        });
    }

    check_ceiling("price", cents)
}

/// Validates a catalog cost price. Zero is allowed (free items).
pub fn validate_cost_cents(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_AMOUNT_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "cost".to_string(),
            min: 0,
            max: MAX_AMOUNT_CENTS,
        });
    }

    Ok(())
}

/// Validates a tendered or refunded amount in cents. Cash may exceed the
/// balance, so the ceiling is the only upper bound it meets.
pub fn validate_tender_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "tender amount".to_string(),
        });
    }

    check_ceiling("tender amount", cents)
}

fn check_ceiling(field: &str, cents: i64) -> ValidationResult<()> {
    if cents > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 1,
            max: MAX_AMOUNT_CENTS,
        });
    }

    Ok(())
}

/// Markup in basis points, at most 1000%.
pub fn validate_markup_bps(bps: u32) -> ValidationResult<()> {
    if bps > 100_000 {
        return Err(ValidationError::OutOfRange {
            field: "markup".to_string(),
            min: 0,
            max: 100_000,
        });
    }

    Ok(())
}
