//! # tally-core: Sales Transaction & Multi-Tender Payment Engine
//!
//! This crate is the **heart** of Tally POS. It models one sale from first
//! scan to settlement: line items, split tenders, holds, refunds and the
//! stock effects of a committed sale. It performs no I/O of its own.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally POS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               apps/terminal (session inbox)                     │   │
//! │  │    scanner ──► scale ──► tender keys ──► operator commands      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ ordered events                         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────────┐   │   │
//! │  │   │ catalog  │  │  ledger  │  │  tender  │  │   session    │   │   │
//! │  │   │ snapshot │─►│  lines   │  │ payments │─►│ state machine│   │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘  └──────┬───────┘   │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐         │           │   │
//! │  │   │   hold   │  │  refund  │  │  stock   │◄── register ◄┘      │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘                     │   │
//! │  │                                                                 │   │
//! │  │   NO DATABASE • NO NETWORK • NO HARDWARE                        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ PersistenceSink                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (SQLite)                            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer cents, weight pricing, markup
//! - [`types`] - Product, LineItem, SettledTransaction, RefundRecord
//! - [`catalog`] - Atomically swapped catalog snapshots
//! - [`ledger`] - Line item ledger
//! - [`tender`] - Tender ledger (split payments, change, lock)
//! - [`session`] - Transaction session state machine
//! - [`hold`] - Suspended sessions
//! - [`refund`] - Armed single-shot refunds
//! - [`stock`] - Post-settlement stock adjustment with compensation
//! - [`sink`] - Persistence contract and in-memory implementation
//! - [`events`] - Hardware events and device hooks
//! - [`register`] - Orchestration of one terminal's sales
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::catalog::CatalogCache;
//! use tally_core::session::TransactionSession;
//! use tally_core::{Money, PaymentMethod, Product};
//!
//! let catalog = CatalogCache::new(vec![Product::new("111", "Tea", 400, 2500)]);
//! let mut session = TransactionSession::new();
//!
//! session.add_unit_item(&catalog, "111", 2).unwrap();
//! assert_eq!(session.subtotal(), Money::from_cents(1000));
//!
//! session.propose_tender(PaymentMethod::Cash, Money::from_cents(2000)).unwrap();
//! let confirmation = session.confirm_tender(PaymentMethod::Cash).unwrap();
//! assert_eq!(confirmation.change_due, Money::from_cents(1000));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod catalog;
pub mod error;
pub mod events;
pub mod hold;
pub mod ledger;
pub mod money;
pub mod refund;
pub mod register;
pub mod session;
pub mod sink;
pub mod stock;
pub mod tender;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single sale.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity on a single unit line.
///
/// Guards against typing 1000 instead of 10.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum length of a line item display name.
pub const MAX_ITEM_NAME_LEN: usize = 200;

/// Maximum length of a barcode or product code.
pub const MAX_BARCODE_LEN: usize = 64;

/// Largest single price, cost, tender or refund amount, in cents ($1 billion).
///
/// With the quantity, weight and line caps this keeps every sale total well
/// inside `i64`.
pub const MAX_AMOUNT_CENTS: i64 = 100_000_000_000;

/// Largest weighed portion, in grams.
pub const MAX_WEIGHT_GRAMS: i64 = 1_000_000;
