//! # Register
//!
//! One terminal's sales: the active session plus everything around it.
//!
//! ## Ownership
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Register<S: PersistenceSink>                                           │
//! │                                                                         │
//! │   session ─────────► TransactionSession (exactly one active)           │
//! │   catalog ─────────► Arc<CatalogCache>   (shared read, swapped)        │
//! │   holds ───────────► Arc<HoldStore>      (mutex-guarded registry)      │
//! │   refunds ─────────► RefundProcessor     (armed / disarmed)            │
//! │   pending_weigh ───► product waiting for a scale reading               │
//! │   sink ────────────► PersistenceSink     (SQLite or in-memory)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Settlement Sequence
//! ```text
//!  prepare_settlement ──► sink.commit ──✗──► Persistence error, still Tendering
//!                              │
//!                              ✓
//!                              ▼
//!                        mark_settled ──► stock adjust ──► hooks
//!                                         (warning only)   drawer / receipt
//! ```
//!
//! Once a session reaches `Settled`, `Held` or `Cancelled`, the next
//! operation that starts a sale opens a fresh session.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::catalog::CatalogCache;
use crate::error::{CoreError, CoreResult};
use crate::events::{DeviceHook, HardwareEvent, PaynowVendor, TenderKey};
use crate::hold::{HoldListing, HoldOrder, HoldRecord, HoldStore};
use crate::money::Money;
use crate::refund::RefundProcessor;
use crate::session::{SessionTotals, TransactionSession};
use crate::sink::PersistenceSink;
use crate::stock;
use crate::tender::TenderConfirmation;
use crate::types::{
    LineItem, PaymentMethod, Product, RefundRecord, SettledTransaction, StockAlert,
};

// =============================================================================
// Settings
// =============================================================================

/// Whether receipts print on settlement or wait for the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptMode {
    #[default]
    Auto,
    Manual,
}

/// Per-terminal behaviour of the register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterSettings {
    /// Terminal id. Its last two characters go into receipt numbers.
    pub device_id: String,
    pub receipt_mode: ReceiptMode,
    pub hold_order: HoldOrder,
    /// PAYNOW QR payload details; no QR is shown when absent.
    pub paynow: Option<PaynowVendor>,
}

impl Default for RegisterSettings {
    fn default() -> Self {
        RegisterSettings {
            device_id: "POS-01".to_string(),
            receipt_mode: ReceiptMode::Auto,
            hold_order: HoldOrder::OldestFirst,
            paynow: None,
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a successful settlement.
#[derive(Debug)]
pub struct SettlementOutcome {
    pub transaction: SettledTransaction,
    pub hooks: Vec<DeviceHook>,
    pub stock_alerts: Vec<StockAlert>,
    /// Stock write rolled back; the sale still stands.
    pub stock_warning: Option<CoreError>,
}

/// Result of a persisted refund.
#[derive(Debug, Clone)]
pub struct RefundOutcome {
    pub refund: RefundRecord,
    pub hooks: Vec<DeviceHook>,
}

/// Result of a confirmed tender.
#[derive(Debug, Clone)]
pub struct TenderOutcome {
    pub confirmation: TenderConfirmation,
    pub hooks: Vec<DeviceHook>,
}

/// What a scan did.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Added(LineItem),
    /// Weight-sold product; waiting for a scale reading.
    AwaitingWeight(Product),
    Refunded(RefundOutcome),
}

/// What a hardware event did.
#[derive(Debug, Clone)]
pub enum EventOutcome {
    Scanned(ScanOutcome),
    Weighed(LineItem),
    TenderProposed {
        method: PaymentMethod,
        amount: Money,
    },
    TenderConfirmed(TenderOutcome),
    TenderCleared(PaymentMethod),
}

// =============================================================================
// Receipt Numbers
// =============================================================================

/// Daily receipt counter: `YYYYMMDD-DD-NNNN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReceiptSequence {
    date: NaiveDate,
    last: u32,
}

impl ReceiptSequence {
    fn next_for(&self, today: NaiveDate) -> ReceiptSequence {
        if today == self.date {
            ReceiptSequence {
                date: today,
                last: self.last + 1,
            }
        } else {
            ReceiptSequence {
                date: today,
                last: 1,
            }
        }
    }

    fn format(&self, device_code: &str) -> String {
        format!(
            "{}-{}-{:04}",
            self.date.format("%Y%m%d"),
            device_code,
            self.last
        )
    }
}

/// Last two characters of the device id, or `00`.
pub fn device_code(device_id: &str) -> String {
    let chars: Vec<char> = device_id.trim().chars().collect();
    if chars.len() < 2 {
        return "00".to_string();
    }
    chars[chars.len() - 2..].iter().collect()
}

// =============================================================================
// Register
// =============================================================================

#[derive(Debug, Clone)]
struct PendingWeigh {
    product: Product,
}

/// Sales orchestration for one terminal.
pub struct Register<S: PersistenceSink> {
    settings: RegisterSettings,
    device_code: String,
    sink: S,
    catalog: Arc<CatalogCache>,
    holds: Arc<HoldStore>,
    refunds: RefundProcessor,
    session: TransactionSession,
    pending_weigh: Option<PendingWeigh>,
    receipts: ReceiptSequence,
}

impl<S: PersistenceSink> Register<S> {
    pub fn new(settings: RegisterSettings, sink: S, catalog: Arc<CatalogCache>) -> Self {
        let holds = Arc::new(HoldStore::new(settings.hold_order));
        let device_code = device_code(&settings.device_id);
        Register {
            settings,
            device_code,
            sink,
            catalog,
            holds,
            refunds: RefundProcessor::new(),
            session: TransactionSession::new(),
            pending_weigh: None,
            receipts: ReceiptSequence {
                date: Utc::now().date_naive(),
                last: 0,
            },
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn session(&self) -> &TransactionSession {
        &self.session
    }

    pub fn totals(&self) -> SessionTotals {
        self.session.totals()
    }

    pub fn catalog(&self) -> &Arc<CatalogCache> {
        &self.catalog
    }

    pub fn holds(&self) -> &Arc<HoldStore> {
        &self.holds
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn settings(&self) -> &RegisterSettings {
        &self.settings
    }

    pub fn is_refund_armed(&self) -> bool {
        self.refunds.is_refund_armed()
    }

    /// Product waiting for a scale reading, if any.
    pub fn pending_weigh(&self) -> Option<&Product> {
        self.pending_weigh.as_ref().map(|p| &p.product)
    }

    /// Continues receipt numbering after the last number used on `date`.
    pub fn resume_receipt_sequence(&mut self, date: NaiveDate, last: u32) {
        self.receipts = ReceiptSequence { date, last };
    }

    /// Replaces the catalog. Lines already entered keep their prices.
    pub fn reload_catalog(&self, products: impl IntoIterator<Item = Product>) -> usize {
        self.catalog.reload(products)
    }

    /// Starts a fresh session once the current one is over.
    fn open_session(&mut self) -> &mut TransactionSession {
        if self.session.state().is_terminal() {
            self.session = TransactionSession::new();
            debug!(session_id = %self.session.id(), "New session");
        }
        &mut self.session
    }

    // =========================================================================
    // Hardware Events
    // =========================================================================

    /// Applies one hardware event.
    pub async fn handle_event(&mut self, event: HardwareEvent) -> CoreResult<EventOutcome> {
        match event {
            HardwareEvent::Scan(barcode) => self.scan(&barcode).await.map(EventOutcome::Scanned),
            HardwareEvent::Weight(grams) => self.apply_weight(grams).map(EventOutcome::Weighed),
            HardwareEvent::TenderKey(TenderKey::Propose { method, amount }) => {
                self.propose_tender(method, amount)?;
                Ok(EventOutcome::TenderProposed { method, amount })
            }
            HardwareEvent::TenderKey(TenderKey::Confirm { method }) => {
                self.confirm_tender(method).map(EventOutcome::TenderConfirmed)
            }
            HardwareEvent::TenderKey(TenderKey::Clear { method }) => {
                self.clear_tender(method)?;
                Ok(EventOutcome::TenderCleared(method))
            }
        }
    }

    /// Routes a scan: refund when armed, weigh request for weight-sold
    /// products, otherwise one unit into the sale.
    pub async fn scan(&mut self, barcode: &str) -> CoreResult<ScanOutcome> {
        if self.refunds.is_refund_armed() {
            let refund = self.refunds.prepare_refund(&self.catalog, barcode)?;
            let outcome = self.persist_refund(refund).await?;
            self.refunds.disarm();
            return Ok(ScanOutcome::Refunded(outcome));
        }

        let product = self
            .catalog
            .lookup(barcode)
            .ok_or_else(|| CoreError::ProductNotFound(barcode.trim().to_string()))?;

        if product.sold_by_weight {
            self.open_session();
            debug!(barcode = %product.barcode, "Awaiting weight");
            self.pending_weigh = Some(PendingWeigh {
                product: product.clone(),
            });
            return Ok(ScanOutcome::AwaitingWeight(product));
        }

        self.add_item(&product.id, 1).map(ScanOutcome::Added)
    }

    /// Completes an open weigh request with a stable reading.
    pub fn apply_weight(&mut self, grams: i64) -> CoreResult<LineItem> {
        let pending = self.pending_weigh.take().ok_or(CoreError::NoPendingWeigh)?;
        let catalog = Arc::clone(&self.catalog);
        self.open_session()
            .add_weight_item(&catalog, &pending.product.id, grams)
    }

    /// Abandons an open weigh request. Returns whether one was open.
    pub fn cancel_weigh(&mut self) -> bool {
        self.pending_weigh.take().is_some()
    }

    /// Closes an open weigh request that got no reading in time.
    pub fn weigh_timed_out(&mut self, timeout_ms: u64) -> CoreError {
        if let Some(pending) = self.pending_weigh.take() {
            warn!(barcode = %pending.product.barcode, timeout_ms, "Scale timed out");
        }
        CoreError::ScaleTimeout { timeout_ms }
    }

    // =========================================================================
    // Line Operations
    // =========================================================================

    pub fn add_item(&mut self, code: &str, qty: i64) -> CoreResult<LineItem> {
        let catalog = Arc::clone(&self.catalog);
        self.open_session().add_unit_item(&catalog, code, qty)
    }

    pub fn add_weight_item(&mut self, code: &str, grams: i64) -> CoreResult<LineItem> {
        let catalog = Arc::clone(&self.catalog);
        self.open_session().add_weight_item(&catalog, code, grams)
    }

    pub fn add_ad_hoc_item(&mut self, name: &str, qty: i64, unit_price: Money) -> CoreResult<LineItem> {
        self.open_session().add_ad_hoc_item(name, qty, unit_price)
    }

    pub fn remove_item(&mut self, line_id: &str) -> CoreResult<bool> {
        self.session.remove_item(line_id)
    }

    pub fn adjust_quantity(&mut self, line_id: &str, delta: i64) -> CoreResult<LineItem> {
        self.session.adjust_quantity(line_id, delta)
    }

    // =========================================================================
    // Tender Operations
    // =========================================================================

    pub fn propose_tender(&mut self, method: PaymentMethod, amount: Money) -> CoreResult<()> {
        self.session.propose_tender(method, amount)
    }

    /// Confirms a staged tender. PAYNOW shows a QR when vendor details exist.
    pub fn confirm_tender(&mut self, method: PaymentMethod) -> CoreResult<TenderOutcome> {
        let confirmation = self.session.confirm_tender(method)?;
        let mut hooks = Vec::new();
        if method == PaymentMethod::Paynow {
            if let Some(vendor) = &self.settings.paynow {
                hooks.push(DeviceHook::ShowPaynowQr {
                    amount: confirmation.amount,
                    vendor: vendor.clone(),
                });
            }
        }
        Ok(TenderOutcome {
            confirmation,
            hooks,
        })
    }

    pub fn clear_tender(&mut self, method: PaymentMethod) -> CoreResult<()> {
        self.session.clear_tender(method)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Commits the sale, then adjusts stock and emits device hooks.
    ///
    /// A commit failure is returned as `CoreError::Persistence` and the
    /// session stays in `Tendering` so the operator can retry.
    #[instrument(skip(self), fields(session_id = %self.session.id()))]
    pub async fn settle(&mut self) -> CoreResult<SettlementOutcome> {
        let sequence = self.receipts.next_for(Utc::now().date_naive());
        let receipt_number = sequence.format(&self.device_code);
        let transaction = self.session.prepare_settlement(&receipt_number)?;

        if let Err(e) = self.sink.commit(&transaction).await {
            error!(receipt = %receipt_number, error = %e, "Settlement commit failed");
            return Err(CoreError::persistence("commit", e));
        }

        self.receipts = sequence;
        self.session.mark_settled()?;
        self.pending_weigh = None;

        info!(
            receipt = %transaction.receipt_number,
            total = %transaction.total,
            change = %transaction.change_given,
            payments = transaction.payments.len(),
            "Sale settled"
        );

        let stock = stock::apply_settlement(&self.catalog, &self.sink, &transaction).await;

        let mut hooks = Vec::new();
        if transaction.took_cash() {
            hooks.push(DeviceHook::OpenCashDrawer);
        }
        hooks.push(match self.settings.receipt_mode {
            ReceiptMode::Auto => DeviceHook::PrintReceipt {
                transaction: transaction.clone(),
            },
            ReceiptMode::Manual => DeviceHook::PromptPrintReceipt {
                receipt_number: transaction.receipt_number.clone(),
            },
        });

        Ok(SettlementOutcome {
            transaction,
            hooks,
            stock_alerts: stock.alerts,
            stock_warning: stock.warning,
        })
    }

    /// Abandons the current sale and any open weigh request.
    pub fn cancel(&mut self) -> CoreResult<()> {
        self.session.cancel()?;
        self.pending_weigh = None;
        info!(session_id = %self.session.id(), "Sale cancelled");
        Ok(())
    }

    // =========================================================================
    // Holds
    // =========================================================================

    /// Suspends the current sale. The record is persisted before it is
    /// admitted, so a failed write leaves the sale active and unchanged.
    pub async fn hold(&mut self) -> CoreResult<String> {
        let record = self.holds.capture(&self.session)?;
        self.sink
            .record_hold(&record)
            .await
            .map_err(|e| CoreError::persistence("record_hold", e))?;

        let hold_id = record.hold_id.clone();
        self.holds.admit(record, &mut self.session);
        self.pending_weigh = None;
        Ok(hold_id)
    }

    pub fn list_holds(&self) -> HoldListing {
        self.holds.list_holds()
    }

    /// Brings a held sale back. The terminal must be idle.
    ///
    /// The durable copy is released before the session is handed out. If
    /// that fails the hold goes back into the registry untouched, so a
    /// restart can never bring back a hold that was already resumed.
    pub async fn resume(&mut self, hold_id: &str) -> CoreResult<SessionTotals> {
        if !self.session.is_idle() {
            return Err(CoreError::SessionInProgress {
                session_id: self.session.id().to_string(),
            });
        }

        let record = self.release_durable_hold(hold_id).await?;
        info!(hold_id = %hold_id, session_id = %record.session_id, "Hold resumed");
        self.session = record.into_session();
        self.pending_weigh = None;
        Ok(self.session.totals())
    }

    pub async fn discard_hold(&mut self, hold_id: &str) -> CoreResult<()> {
        let record = self.release_durable_hold(hold_id).await?;
        info!(hold_id = %hold_id, lines = record.lines.len(), "Hold discarded");
        Ok(())
    }

    /// Re-admits holds persisted before a restart.
    pub fn restore_holds(&self, records: impl IntoIterator<Item = HoldRecord>) -> usize {
        self.holds.restore(records)
    }

    /// Takes the hold out of the registry and deletes its durable copy.
    async fn release_durable_hold(&self, hold_id: &str) -> CoreResult<HoldRecord> {
        let record = self.holds.take(hold_id)?;
        if let Err(e) = self.sink.release_hold(hold_id).await {
            warn!(hold_id = %hold_id, error = %e, "Failed to release durable hold");
            self.holds.reinstate(record);
            return Err(CoreError::persistence("release_hold", e));
        }
        Ok(record)
    }

    // =========================================================================
    // Refunds
    // =========================================================================

    pub fn arm_refund(&mut self) {
        self.refunds.arm();
    }

    pub fn disarm_refund(&mut self) {
        self.refunds.disarm();
    }

    /// Refunds one line of a settled sale at its sold price.
    pub async fn refund_settled_line(
        &mut self,
        transaction: &SettledTransaction,
        line_id: &str,
    ) -> CoreResult<RefundOutcome> {
        let refund = self.refunds.refund_settled_line(transaction, line_id)?;
        self.persist_refund(refund).await
    }

    pub async fn refund_manual(&mut self, barcode: &str, amount: Money) -> CoreResult<RefundOutcome> {
        let refund = self.refunds.refund_manual(barcode, amount)?;
        self.persist_refund(refund).await
    }

    async fn persist_refund(&self, refund: RefundRecord) -> CoreResult<RefundOutcome> {
        self.sink
            .record_refund(&refund)
            .await
            .map_err(|e| CoreError::persistence("record_refund", e))?;

        info!(refund_id = %refund.id, amount = %refund.amount, "Refund recorded");

        let receipt_hook = match self.settings.receipt_mode {
            ReceiptMode::Auto => DeviceHook::PrintRefundSlip {
                refund: refund.clone(),
            },
            ReceiptMode::Manual => DeviceHook::PromptPrintRefundSlip {
                refund_id: refund.id.clone(),
            },
        };

        Ok(RefundOutcome {
            refund,
            hooks: vec![DeviceHook::OpenCashDrawer, receipt_hook],
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
