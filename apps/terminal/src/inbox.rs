//! # Session Inbox
//!
//! The register lives inside one actor task. Every scan, weight reading,
//! tender key and operator command goes through one ordered channel, so the
//! session sees them strictly in arrival order.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  scanner / keys ──► InboxHandle ──┐                                     │
//! │  console ─────────► InboxHandle ──┼──► mpsc::Sender<Command>            │
//! │  scale read task ─────────────────┘          │                          │
//! │                                              ▼                          │
//! │                                   ┌────────────────────┐                │
//! │                                   │  SessionInbox::run │ (one task)     │
//! │                                   │    Register<S>     │                │
//! │                                   └──────┬──────┬──────┘                │
//! │                                          │      │                       │
//! │                      DeviceHooks ◄───────┘      └──► TerminalEvent      │
//! │                (drawer, printer, QR)             (UI / console output)  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Weigh requests
//! Scanning a weight-sold product starts a scale read in its own task. The
//! read posts its outcome back here tagged with a request number; outcomes
//! for a request that was cancelled or replaced are ignored.
//!
//! A rejected command (unknown barcode, overpayment, ...) is reported as
//! [`TerminalEvent::Rejected`] and the inbox keeps running.

use std::sync::Arc;
use std::time::Duration;

use tally_core::events::{DeviceHook, HardwareEvent};
use tally_core::hold::HoldSummary;
use tally_core::register::{EventOutcome, Register, ScanOutcome, SettlementOutcome};
use tally_core::session::SessionTotals;
use tally_core::sink::PersistenceSink;
use tally_core::{
    CoreError, ErrorKind, LineItem, Money, Product, RefundRecord, SettledTransaction, StockAlert,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{TerminalError, TerminalResult};
use crate::hooks::DeviceHooks;
use crate::scale::{self, Scale, ScaleOutcome};

const INBOX_CAPACITY: usize = 64;

// =============================================================================
// Commands
// =============================================================================

/// Cashier actions that are not raw device events.
#[derive(Debug, Clone)]
pub enum OperatorCommand {
    AddItem { code: String, quantity: i64 },
    AddAdHoc { name: String, quantity: i64, unit_price: Money },
    RemoveItem { line_id: String },
    AdjustQuantity { line_id: String, delta: i64 },
    CancelWeigh,
    Settle,
    Cancel,
    Hold,
    ListHolds,
    Resume { hold_id: String },
    DiscardHold { hold_id: String },
    ArmRefund,
    DisarmRefund,
    RefundManual { barcode: String, amount: Money },
    RefundLine { transaction: Box<SettledTransaction>, line_id: String },
    ReloadCatalog(Vec<Product>),
    Totals,
}

#[derive(Debug)]
enum Command {
    Hardware(HardwareEvent),
    Operator(OperatorCommand),
    Scale { request: u64, outcome: ScaleOutcome },
    Shutdown,
}

/// What the inbox reports back after each command.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalEvent {
    /// Emitted after every command.
    Totals(SessionTotals),
    LineAdded(LineItem),
    LineRemoved { line_id: String },
    AwaitingWeight { barcode: String, name: String },
    WeighCancelled,
    Settled {
        receipt_number: String,
        total: Money,
        change: Money,
        stock_alerts: Vec<StockAlert>,
    },
    /// Non-fatal problem for the operator: stock write rolled back, scale fault.
    Warning { message: String },
    Cancelled,
    Held { hold_id: String },
    Holds(Vec<HoldSummary>),
    Resumed { hold_id: String },
    HoldDiscarded { hold_id: String },
    RefundArmed(bool),
    Refunded(RefundRecord),
    CatalogReloaded { products: usize },
    Rejected { kind: ErrorKind, message: String },
}

// =============================================================================
// Handle
// =============================================================================

/// Sending side of the inbox. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InboxHandle {
    tx: mpsc::Sender<Command>,
}

impl InboxHandle {
    pub async fn hardware(&self, event: HardwareEvent) -> TerminalResult<()> {
        self.send(Command::Hardware(event)).await
    }

    pub async fn operator(&self, command: OperatorCommand) -> TerminalResult<()> {
        self.send(Command::Operator(command)).await
    }

    /// Stops the inbox after the commands already queued.
    pub async fn shutdown(&self) -> TerminalResult<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> TerminalResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| TerminalError::InboxClosed)
    }
}

// =============================================================================
// Actor
// =============================================================================

#[derive(Debug, Clone)]
pub struct InboxOptions {
    pub scale_timeout: Duration,
    /// Settle as soon as a confirmed tender leaves nothing due.
    pub auto_settle: bool,
}

impl Default for InboxOptions {
    fn default() -> Self {
        InboxOptions {
            scale_timeout: Duration::from_secs(10),
            auto_settle: true,
        }
    }
}

struct WeighRequest {
    id: u64,
    cancel: watch::Sender<bool>,
}

pub struct SessionInbox<S: PersistenceSink, H: DeviceHooks, C: Scale> {
    register: Register<S>,
    hooks: H,
    scale: Arc<C>,
    options: InboxOptions,
    rx: mpsc::Receiver<Command>,
    /// Weak so the inbox closes once every handle is dropped.
    self_tx: mpsc::WeakSender<Command>,
    events: mpsc::UnboundedSender<TerminalEvent>,
    weigh: Option<WeighRequest>,
    next_request: u64,
}

impl<S, H, C> SessionInbox<S, H, C>
where
    S: PersistenceSink + 'static,
    H: DeviceHooks,
    C: Scale,
{
    /// Starts the actor. The join handle yields the register back when the
    /// inbox stops.
    pub fn spawn(
        register: Register<S>,
        hooks: H,
        scale: Arc<C>,
        options: InboxOptions,
    ) -> (
        InboxHandle,
        mpsc::UnboundedReceiver<TerminalEvent>,
        JoinHandle<Register<S>>,
    ) {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let (events, events_rx) = mpsc::unbounded_channel();

        let inbox = SessionInbox {
            register,
            hooks,
            scale,
            options,
            rx,
            self_tx: tx.downgrade(),
            events,
            weigh: None,
            next_request: 0,
        };

        let task = tokio::spawn(inbox.run());
        (InboxHandle { tx }, events_rx, task)
    }

    async fn run(mut self) -> Register<S> {
        info!(session_id = %self.register.session().id(), "Session inbox started");

        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Shutdown => break,
                Command::Hardware(event) => self.on_hardware(event).await,
                Command::Operator(command) => self.on_operator(command).await,
                Command::Scale { request, outcome } => self.on_scale(request, outcome),
            }
            self.emit(TerminalEvent::Totals(self.register.totals()));
        }

        self.abort_weigh();
        info!("Session inbox stopped");
        self.register
    }

    // =========================================================================
    // Hardware
    // =========================================================================

    async fn on_hardware(&mut self, event: HardwareEvent) {
        let weight_event = matches!(event, HardwareEvent::Weight(_));

        match self.register.handle_event(event).await {
            Ok(EventOutcome::Scanned(ScanOutcome::Added(line))) => {
                self.emit(TerminalEvent::LineAdded(line));
            }
            Ok(EventOutcome::Scanned(ScanOutcome::AwaitingWeight(product))) => {
                self.start_weigh(&product);
            }
            Ok(EventOutcome::Scanned(ScanOutcome::Refunded(outcome))) => {
                self.dispatch_all(&outcome.hooks);
                self.emit(TerminalEvent::RefundArmed(false));
                self.emit(TerminalEvent::Refunded(outcome.refund));
            }
            Ok(EventOutcome::Weighed(line)) => {
                self.abort_weigh();
                self.emit(TerminalEvent::LineAdded(line));
            }
            Ok(EventOutcome::TenderProposed { method, amount }) => {
                debug!(method = %method, amount = %amount, "Tender staged");
            }
            Ok(EventOutcome::TenderConfirmed(outcome)) => {
                self.dispatch_all(&outcome.hooks);
                if self.options.auto_settle && outcome.confirmation.balance_due.is_zero() {
                    self.settle().await;
                }
            }
            Ok(EventOutcome::TenderCleared(method)) => {
                debug!(method = %method, "Tender cleared");
            }
            Err(e) => {
                // A direct weight event settles the pending request either way
                if weight_event {
                    self.abort_weigh();
                }
                self.reject(e);
            }
        }
    }

    // =========================================================================
    // Operator
    // =========================================================================

    async fn on_operator(&mut self, command: OperatorCommand) {
        let result = match command {
            OperatorCommand::AddItem { code, quantity } => self
                .register
                .add_item(&code, quantity)
                .map(|line| self.emit(TerminalEvent::LineAdded(line))),
            OperatorCommand::AddAdHoc {
                name,
                quantity,
                unit_price,
            } => self
                .register
                .add_ad_hoc_item(&name, quantity, unit_price)
                .map(|line| self.emit(TerminalEvent::LineAdded(line))),
            OperatorCommand::RemoveItem { line_id } => {
                self.register.remove_item(&line_id).map(|removed| {
                    if removed {
                        self.emit(TerminalEvent::LineRemoved { line_id });
                    }
                })
            }
            OperatorCommand::AdjustQuantity { line_id, delta } => self
                .register
                .adjust_quantity(&line_id, delta)
                .map(|_| ()),
            OperatorCommand::CancelWeigh => {
                self.abort_weigh();
                if self.register.cancel_weigh() {
                    self.emit(TerminalEvent::WeighCancelled);
                }
                Ok(())
            }
            OperatorCommand::Settle => {
                self.settle().await;
                Ok(())
            }
            OperatorCommand::Cancel => self
                .register
                .cancel()
                .map(|()| self.emit(TerminalEvent::Cancelled)),
            OperatorCommand::Hold => {
                self.abort_weigh();
                self.register.cancel_weigh();
                self.register
                    .hold()
                    .await
                    .map(|hold_id| self.emit(TerminalEvent::Held { hold_id }))
            }
            OperatorCommand::ListHolds => {
                let listing = self.register.list_holds();
                self.emit(TerminalEvent::Holds(listing.into_vec()));
                Ok(())
            }
            OperatorCommand::Resume { hold_id } => self
                .register
                .resume(&hold_id)
                .await
                .map(|_| self.emit(TerminalEvent::Resumed { hold_id })),
            OperatorCommand::DiscardHold { hold_id } => self
                .register
                .discard_hold(&hold_id)
                .await
                .map(|()| self.emit(TerminalEvent::HoldDiscarded { hold_id })),
            OperatorCommand::ArmRefund => {
                self.register.arm_refund();
                self.emit(TerminalEvent::RefundArmed(true));
                Ok(())
            }
            OperatorCommand::DisarmRefund => {
                self.register.disarm_refund();
                self.emit(TerminalEvent::RefundArmed(false));
                Ok(())
            }
            OperatorCommand::RefundManual { barcode, amount } => self
                .register
                .refund_manual(&barcode, amount)
                .await
                .map(|outcome| {
                    self.dispatch_all(&outcome.hooks);
                    self.emit(TerminalEvent::Refunded(outcome.refund));
                }),
            OperatorCommand::RefundLine {
                transaction,
                line_id,
            } => self
                .register
                .refund_settled_line(&transaction, &line_id)
                .await
                .map(|outcome| {
                    self.dispatch_all(&outcome.hooks);
                    self.emit(TerminalEvent::Refunded(outcome.refund));
                }),
            OperatorCommand::ReloadCatalog(products) => {
                let count = self.register.reload_catalog(products);
                self.emit(TerminalEvent::CatalogReloaded { products: count });
                Ok(())
            }
            OperatorCommand::Totals => Ok(()),
        };

        if let Err(e) = result {
            self.reject(e);
        }
    }

    // =========================================================================
    // Settlement
    // =========================================================================

    async fn settle(&mut self) {
        match self.register.settle().await {
            Ok(outcome) => self.after_settlement(outcome),
            Err(e) => self.reject(e),
        }
    }

    fn after_settlement(&mut self, outcome: SettlementOutcome) {
        self.dispatch_all(&outcome.hooks);

        if let Some(warning) = outcome.stock_warning {
            self.emit(TerminalEvent::Warning {
                message: warning.to_string(),
            });
        }

        self.emit(TerminalEvent::Settled {
            receipt_number: outcome.transaction.receipt_number,
            total: outcome.transaction.total,
            change: outcome.transaction.change_given,
            stock_alerts: outcome.stock_alerts,
        });
    }

    // =========================================================================
    // Weighing
    // =========================================================================

    fn start_weigh(&mut self, product: &Product) {
        self.abort_weigh();

        let Some(tx) = self.self_tx.upgrade() else {
            return;
        };

        self.next_request += 1;
        let request = self.next_request;
        let (cancel, cancel_rx) = watch::channel(false);
        self.weigh = Some(WeighRequest {
            id: request,
            cancel,
        });

        self.scale.reset();
        let scale = Arc::clone(&self.scale);
        let window = self.options.scale_timeout;
        tokio::spawn(async move {
            let outcome = scale::read_with_timeout(scale.as_ref(), window, cancel_rx).await;
            // The inbox may already be gone
            let _ = tx.send(Command::Scale { request, outcome }).await;
        });

        debug!(request, barcode = %product.barcode, "Weigh request started");
        self.emit(TerminalEvent::AwaitingWeight {
            barcode: product.barcode.clone(),
            name: product.name.clone(),
        });
    }

    /// Stops the in-flight read, if any. Its late outcome is ignored.
    fn abort_weigh(&mut self) {
        if let Some(request) = self.weigh.take() {
            let _ = request.cancel.send(true);
        }
    }

    fn on_scale(&mut self, request: u64, outcome: ScaleOutcome) {
        match &self.weigh {
            Some(current) if current.id == request => {
                self.weigh = None;
            }
            _ => {
                debug!(request, ?outcome, "Ignoring stale scale outcome");
                return;
            }
        }

        match outcome {
            ScaleOutcome::Reading(grams) => match self.register.apply_weight(grams) {
                Ok(line) => self.emit(TerminalEvent::LineAdded(line)),
                Err(e) => self.reject(e),
            },
            ScaleOutcome::TimedOut => {
                let timeout_ms = self.options.scale_timeout.as_millis() as u64;
                let e = self.register.weigh_timed_out(timeout_ms);
                self.reject(e);
            }
            ScaleOutcome::Cancelled => {
                self.register.cancel_weigh();
            }
            ScaleOutcome::Failed(e) => {
                error!(error = %e, "Scale read failed");
                self.register.cancel_weigh();
                self.emit(TerminalEvent::Warning {
                    message: e.to_string(),
                });
            }
        }
    }

    // =========================================================================
    // Output
    // =========================================================================

    fn dispatch_all(&self, hooks: &[DeviceHook]) {
        for hook in hooks {
            self.hooks.dispatch(hook);
        }
    }

    fn reject(&self, e: CoreError) {
        let kind = e.kind();
        if e.is_fatal() {
            error!(error = %e, "Command failed");
        } else if kind == ErrorKind::Validation {
            debug!(error = %e, "Command rejected");
        } else {
            warn!(error = %e, ?kind, "Command rejected");
        }

        self.emit(TerminalEvent::Rejected {
            kind,
            message: e.to_string(),
        });
    }

    fn emit(&self, event: TerminalEvent) {
        // Nobody listening is fine: a headless terminal still trades
        let _ = self.events.send(event);
    }
}
