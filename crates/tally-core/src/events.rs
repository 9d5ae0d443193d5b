//! # Events and Hooks
//!
//! What flows into the engine from hardware, and what flows out to devices.
//!
//! ```text
//!   scanner ──Scan("4006381333931")──┐
//!   scale   ──Weight(750)────────────┼──► session inbox ──► Register
//!   keypad  ──TenderKey(Confirm)─────┘                        │
//!                                                             ▼
//!                       OpenCashDrawer | PrintReceipt | ShowPaynowQr ...
//! ```

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{PaymentMethod, RefundRecord, SettledTransaction};

// =============================================================================
// Inbound
// =============================================================================

/// A tender keypad action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TenderKey {
    Propose { method: PaymentMethod, amount: Money },
    Confirm { method: PaymentMethod },
    Clear { method: PaymentMethod },
}

/// An input from a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum HardwareEvent {
    /// Barcode from the scanner.
    Scan(String),
    /// Stable reading from the scale, in grams.
    Weight(i64),
    TenderKey(TenderKey),
}

// =============================================================================
// Outbound
// =============================================================================

/// Vendor bank details shown in the PAYNOW QR payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PaynowVendor {
    pub bank: String,
    pub account_name: String,
    pub account_number: String,
}

/// Commands for the drawer, printer and QR display collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "hook", rename_all = "snake_case")]
pub enum DeviceHook {
    /// Emitted iff cash was taken (settlement) or paid out (refund).
    OpenCashDrawer,
    PrintReceipt { transaction: SettledTransaction },
    /// Manual receipt mode: ask the operator whether to print.
    PromptPrintReceipt { receipt_number: String },
    PrintRefundSlip { refund: RefundRecord },
    PromptPrintRefundSlip { refund_id: String },
    ShowPaynowQr { amount: Money, vendor: PaynowVendor },
}
