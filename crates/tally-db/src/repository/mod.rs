//! # Repository Module
//!
//! Database repository implementations for Tally POS.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories and their callers                       │
//! │                                                                         │
//! │  Start-up                          Register (via PersistenceSink)      │
//! │  ├── products().load_catalog()     ├── sales().insert_settled()        │
//! │  ├── holds().list()                ├── products().update_stock()       │
//! │  └── sales().last_receipt_seq()    ├── holds().record() / release()    │
//! │                                    └── refunds().insert()              │
//! │       │                                   │                             │
//! │       └──────────────┬────────────────────┘                             │
//! │                      ▼                                                  │
//! │               SQLite Database                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ProductRepository`](product::ProductRepository) - Catalog rows and stock deltas
//! - [`SaleRepository`](sale::SaleRepository) - Settled sales, lines and payments
//! - [`HoldRepository`](hold::HoldRepository) - Durable held sessions
//! - [`RefundRepository`](refund::RefundRepository) - Refund ledger

pub mod hold;
pub mod product;
pub mod refund;
pub mod sale;
