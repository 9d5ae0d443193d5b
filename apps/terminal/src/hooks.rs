//! # Device Hooks
//!
//! Outbound side of the terminal: cash drawer, receipt printer and PAYNOW QR
//! display. The register decides *what* should happen (a list of
//! `DeviceHook`s per outcome); implementations of [`DeviceHooks`] decide how.
//!
//! Hooks are fire-and-forget. A jammed printer never un-settles a sale, so
//! the trait has no error path; implementations log their own failures.

use std::sync::{Arc, Mutex};

use tally_core::events::{DeviceHook, PaynowVendor};
use tally_core::{Money, RefundRecord, SettledTransaction};
use tracing::info;

/// Receiver of drawer, printer and QR commands.
pub trait DeviceHooks: Send + Sync + 'static {
    fn open_cash_drawer(&self);

    fn print_receipt(&self, transaction: &SettledTransaction);

    /// Manual receipt mode: ask the operator whether to print.
    fn prompt_print_receipt(&self, receipt_number: &str);

    fn print_refund_slip(&self, refund: &RefundRecord);

    fn prompt_print_refund_slip(&self, refund_id: &str);

    fn show_paynow_qr(&self, amount: Money, vendor: &PaynowVendor);

    /// Routes one hook to the matching method.
    fn dispatch(&self, hook: &DeviceHook) {
        match hook {
            DeviceHook::OpenCashDrawer => self.open_cash_drawer(),
            DeviceHook::PrintReceipt { transaction } => self.print_receipt(transaction),
            DeviceHook::PromptPrintReceipt { receipt_number } => {
                self.prompt_print_receipt(receipt_number)
            }
            DeviceHook::PrintRefundSlip { refund } => self.print_refund_slip(refund),
            DeviceHook::PromptPrintRefundSlip { refund_id } => {
                self.prompt_print_refund_slip(refund_id)
            }
            DeviceHook::ShowPaynowQr { amount, vendor } => self.show_paynow_qr(*amount, vendor),
        }
    }
}

/// Logs every hook. Used when no hardware is attached.
#[derive(Debug, Clone, Default)]
pub struct LoggingHooks;

impl DeviceHooks for LoggingHooks {
    fn open_cash_drawer(&self) {
        info!(target: "tally::hooks", "Cash drawer opened");
    }

    fn print_receipt(&self, transaction: &SettledTransaction) {
        info!(
            target: "tally::hooks",
            receipt = %transaction.receipt_number,
            lines = transaction.lines.len(),
            total = %transaction.total,
            change = %transaction.change_given,
            "Receipt printed"
        );
    }

    fn prompt_print_receipt(&self, receipt_number: &str) {
        info!(target: "tally::hooks", receipt = %receipt_number, "Print receipt?");
    }

    fn print_refund_slip(&self, refund: &RefundRecord) {
        info!(
            target: "tally::hooks",
            refund_id = %refund.id,
            amount = %refund.amount,
            description = %refund.description,
            "Refund slip printed"
        );
    }

    fn prompt_print_refund_slip(&self, refund_id: &str) {
        info!(target: "tally::hooks", refund_id = %refund_id, "Print refund slip?");
    }

    fn show_paynow_qr(&self, amount: Money, vendor: &PaynowVendor) {
        info!(
            target: "tally::hooks",
            amount = %amount,
            bank = %vendor.bank,
            account = %vendor.account_number,
            "PAYNOW QR shown"
        );
    }
}

/// Keeps every dispatched hook, in order. For tests and diagnostics.
#[derive(Debug, Clone, Default)]
pub struct RecordingHooks {
    hooks: Arc<Mutex<Vec<DeviceHook>>>,
}

impl RecordingHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<DeviceHook> {
        self.hooks.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn push(&self, hook: DeviceHook) {
        self.hooks.lock().unwrap_or_else(|e| e.into_inner()).push(hook);
    }
}

impl DeviceHooks for RecordingHooks {
    fn open_cash_drawer(&self) {
        self.push(DeviceHook::OpenCashDrawer);
    }

    fn print_receipt(&self, transaction: &SettledTransaction) {
        self.push(DeviceHook::PrintReceipt {
            transaction: transaction.clone(),
        });
    }

    fn prompt_print_receipt(&self, receipt_number: &str) {
        self.push(DeviceHook::PromptPrintReceipt {
            receipt_number: receipt_number.to_string(),
        });
    }

    fn print_refund_slip(&self, refund: &RefundRecord) {
        self.push(DeviceHook::PrintRefundSlip {
            refund: refund.clone(),
        });
    }

    fn prompt_print_refund_slip(&self, refund_id: &str) {
        self.push(DeviceHook::PromptPrintRefundSlip {
            refund_id: refund_id.to_string(),
        });
    }

    fn show_paynow_qr(&self, amount: Money, vendor: &PaynowVendor) {
        self.push(DeviceHook::ShowPaynowQr {
            amount,
            vendor: vendor.clone(),
        });
    }
}
