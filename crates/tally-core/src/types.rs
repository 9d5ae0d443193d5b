//! # Sale Records
//!
//! Values shared by the ledgers, the register and the store.
//!
//! ## How They Relate
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Catalog → Sale → Receipt                        │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │    Product      │   │    LineItem     │   │ SettledTransaction  │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  barcode        │──►│  unit_price     │──►│  receipt_number     │   │
//! │  │  cost + markup  │   │  (snapshot)     │   │  payments[]         │   │
//! │  │  stock (u / g)  │   │  Units | Weight │   │  lines[] (frozen)   │   │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │ PaymentMethod   │   │  SessionState   │   │   RefundRecord      │   │
//! │  │  Cash           │   │  Empty          │   │  source             │   │
//! │  │  Card           │   │  Building       │   │  amount (negative)  │   │
//! │  │  Paynow         │   │  Tendering      │   └─────────────────────┘   │
//! │  │  Voucher        │   │  Settled/Held/  │                             │
//! │  └─────────────────┘   │  Cancelled      │                             │
//! │                        └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! A `LineItem` copies name and unit price out of the `Product` when it is
//! entered. Catalog reloads mid-session never change what the customer pays.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A product in the catalog.
///
/// ## Derived Selling Price
/// There is no stored selling price. `unit_price()` is always
/// `cost × (1 + markup)`, so the price can never drift from its inputs.
/// For weight-sold products the price is per kilogram and stock is in grams.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Barcode (EAN-13, UPC-A, PLU...). Catalog key.
    pub barcode: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    /// Cost in cents (per unit, or per kilogram when sold by weight).
    pub cost_cents: i64,

    /// Markup over cost in basis points (2500 = 25%).
    pub markup_bps: u32,

    /// Units on hand, or grams on hand when sold by weight. May be negative.
    pub stock_quantity: i64,

    /// Low-stock alert threshold, same unit as `stock_quantity`.
    pub min_stock_threshold: i64,

    /// Weighed at the counter instead of counted.
    pub sold_by_weight: bool,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates an active unit-sold product with no stock.
    pub fn new(
        barcode: impl Into<String>,
        name: impl Into<String>,
        cost_cents: i64,
        markup_bps: u32,
    ) -> Self {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4().to_string(),
            barcode: barcode.into(),
            name: name.into(),
            cost_cents,
            markup_bps,
            stock_quantity: 0,
            min_stock_threshold: 0,
            sold_by_weight: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Marks the product as weight-sold (price per kg, stock in grams).
    pub fn by_weight(mut self) -> Self {
        self.sold_by_weight = true;
        self
    }

    /// Sets stock on hand and the low-stock threshold.
    pub fn with_stock(mut self, quantity: i64, threshold: i64) -> Self {
        self.stock_quantity = quantity;
        self.min_stock_threshold = threshold;
        self
    }

    /// Returns the cost as Money.
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    /// Selling price derived from cost and markup.
    #[inline]
    pub fn unit_price(&self) -> Money {
        self.cost().apply_markup(self.markup_bps)
    }

    /// True when `quantity` is at or below the alert threshold.
    #[inline]
    pub fn is_low_stock_at(&self, quantity: i64) -> bool {
        quantity <= self.min_stock_threshold
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// Tender types accepted at the terminal.
///
/// Only `Cash` may be tendered above the balance due, since no physical
/// change can be returned through card, PAYNOW or voucher.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Paynow,
    Voucher,
}

impl PaymentMethod {
    /// All methods in tender-key order.
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Paynow,
        PaymentMethod::Voucher,
    ];

    /// Whether this method may exceed the balance due.
    #[inline]
    pub fn allows_change(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Paynow => "paynow",
            PaymentMethod::Voucher => "voucher",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" | "credit" | "debit" | "nets" => Ok(PaymentMethod::Card),
            "paynow" | "qr" => Ok(PaymentMethod::Paynow),
            "voucher" => Ok(PaymentMethod::Voucher),
            other => Err(ValidationError::InvalidFormat {
                field: "payment method".to_string(),
                reason: format!("unknown method '{}'", other),
            }),
        }
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Lifecycle of a transaction session.
///
/// ```text
///  Empty ──add──► Building ──confirm──► Tendering ──settle──► Settled
///                   │  ▲                    │
///                   │  └──item change───────┤
///                   ├──hold / cancel────────┴──► Held | Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Empty,
    Building,
    Tendering,
    Settled,
    Held,
    Cancelled,
}

impl SessionState {
    /// Terminal states accept no further mutation.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Settled | SessionState::Held | SessionState::Cancelled
        )
    }

    /// States in which line items and tenders may change.
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self, SessionState::Building | SessionState::Tendering)
    }
}

// =============================================================================
// Line Item
// =============================================================================

/// How a line is measured. Never both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum LineMeasure {
    /// Counted units, always ≥ 1.
    Units(i64),
    /// Weighed grams, always > 0. Unit price is per kilogram.
    Weight(i64),
}

impl LineMeasure {
    /// The raw amount taken out of stock (units or grams).
    #[inline]
    pub fn stock_amount(&self) -> i64 {
        match self {
            LineMeasure::Units(qty) => *qty,
            LineMeasure::Weight(grams) => *grams,
        }
    }
}

/// A sale line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineItem {
    /// Line identifier (UUID v4), stable for the life of the line.
    pub id: String,

    /// Backing catalog product; `None` for ad-hoc items.
    pub product_id: Option<String>,

    /// Barcode at time of entry (frozen).
    pub barcode: Option<String>,

    /// Display name at time of entry (frozen).
    pub name: String,

    pub measure: LineMeasure,

    /// Unit price at time of entry (frozen). Per kg for weight lines.
    pub unit_price: Money,

    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl LineItem {
    /// Line total, derived on every read.
    pub fn line_total(&self) -> Money {
        match self.measure {
            LineMeasure::Units(qty) => self.unit_price.multiply_quantity(qty),
            LineMeasure::Weight(grams) => self.unit_price.multiply_weight(grams),
        }
    }

    /// Whether the line is backed by a catalog product.
    #[inline]
    pub fn is_catalog_backed(&self) -> bool {
        self.product_id.is_some()
    }

    /// Unit quantity, or `None` for weighed lines.
    pub fn quantity(&self) -> Option<i64> {
        match self.measure {
            LineMeasure::Units(qty) => Some(qty),
            LineMeasure::Weight(_) => None,
        }
    }
}

// =============================================================================
// Settled Transaction
// =============================================================================

/// One tender's contribution to a settled sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SettledPayment {
    pub method: PaymentMethod,
    /// Amount applied to the sale (tendered minus change).
    pub amount: Money,
    /// Amount the customer handed over.
    pub tendered: Money,
    /// Change returned (cash only).
    pub change: Money,
}

/// A finalized sale. Created only by a successful settlement; immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SettledTransaction {
    pub id: String,
    pub receipt_number: String,
    /// Session the sale was built in (survives hold/resume).
    pub session_id: String,
    #[ts(as = "String")]
    pub settled_at: DateTime<Utc>,
    /// Sum of line totals.
    pub subtotal: Money,
    /// Amount charged. Equal to `subtotal` (no discounts or tax lines).
    pub total: Money,
    pub change_given: Money,
    pub payments: Vec<SettledPayment>,
    pub lines: Vec<LineItem>,
}

impl SettledTransaction {
    /// Sum of applied payment amounts; equals `total` for every settled sale.
    pub fn amount_paid(&self) -> Money {
        self.payments.iter().map(|p| p.amount).sum()
    }

    /// Whether any cash was confirmed for this sale.
    pub fn took_cash(&self) -> bool {
        self.payments
            .iter()
            .any(|p| p.method == PaymentMethod::Cash && p.tendered.is_positive())
    }

    pub fn line(&self, line_id: &str) -> Option<&LineItem> {
        self.lines.iter().find(|l| l.id == line_id)
    }
}

// =============================================================================
// Refunds
// =============================================================================

/// Where a refund amount was resolved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RefundSource {
    /// Current catalog price of a scanned barcode.
    CatalogLookup { barcode: String },
    /// Exact line of a prior settled transaction.
    SettledLine {
        transaction_id: String,
        receipt_number: String,
        line_id: String,
    },
    /// Operator-entered barcode/amount pair.
    Manual { barcode: String },
}

/// A refund. Independent entity; never mutates a `SettledTransaction`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundRecord {
    pub id: String,
    pub source: RefundSource,
    pub product_id: Option<String>,
    pub description: String,
    /// Always negative.
    pub amount: Money,
    #[ts(as = "String")]
    pub refunded_at: DateTime<Utc>,
}

// =============================================================================
// Stock Alerts
// =============================================================================

/// Raised when settlement leaves a product at or below its threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAlert {
    pub product_id: String,
    pub barcode: String,
    pub name: String,
    pub remaining: i64,
    pub threshold: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================
