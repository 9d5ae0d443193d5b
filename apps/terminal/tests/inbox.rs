//! Session inbox behaviour: ordering, weigh requests, auto-settlement.

use std::sync::Arc;
use std::time::Duration;

use tally_core::catalog::CatalogCache;
use tally_core::events::{DeviceHook, HardwareEvent, TenderKey};
use tally_core::register::{Register, RegisterSettings};
use tally_core::session::SessionTotals;
use tally_core::sink::MemorySink;
use tally_core::{ErrorKind, LineMeasure, Money, PaymentMethod, Product, SessionState};
use tally_terminal::hooks::RecordingHooks;
use tally_terminal::inbox::{InboxHandle, InboxOptions, OperatorCommand, SessionInbox, TerminalEvent};
use tally_terminal::scale::{ChannelScale, ScaleFeed};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

fn cents(c: i64) -> Money {
    Money::from_cents(c)
}

fn catalog() -> Arc<CatalogCache> {
    Arc::new(CatalogCache::new(vec![
        // $20.00
        Product::new("1001", "Wine", 1600, 2500).with_stock(10, 3),
        // $10.00
        Product::new("1002", "Cheese", 1000, 0).with_stock(4, 1),
        // $12.00/kg
        Product::new("2001", "Grapes", 1000, 2000)
            .by_weight()
            .with_stock(5_000, 500),
    ]))
}

struct Lane {
    inbox: InboxHandle,
    events: UnboundedReceiver<TerminalEvent>,
    task: JoinHandle<Register<MemorySink>>,
    hooks: RecordingHooks,
    feed: ScaleFeed,
}

fn lane_with(sink: MemorySink, options: InboxOptions) -> Lane {
    let register = Register::new(RegisterSettings::default(), sink, catalog());
    let hooks = RecordingHooks::new();
    let (scale, feed) = ChannelScale::new();
    let (inbox, events, task) =
        SessionInbox::spawn(register, hooks.clone(), Arc::new(scale), options);
    Lane {
        inbox,
        events,
        task,
        hooks,
        feed,
    }
}

fn lane() -> Lane {
    lane_with(MemorySink::new(), InboxOptions::default())
}

impl Lane {
    async fn scan(&self, barcode: &str) {
        self.inbox
            .hardware(HardwareEvent::Scan(barcode.to_string()))
            .await
            .unwrap();
    }

    async fn tender(&self, method: PaymentMethod, amount: i64) {
        self.inbox
            .hardware(HardwareEvent::TenderKey(TenderKey::Propose {
                method,
                amount: cents(amount),
            }))
            .await
            .unwrap();
        self.inbox
            .hardware(HardwareEvent::TenderKey(TenderKey::Confirm { method }))
            .await
            .unwrap();
    }

    async fn operator(&self, command: OperatorCommand) {
        self.inbox.operator(command).await.unwrap();
    }

    /// Next event that is not a totals refresh.
    async fn next(&mut self) -> TerminalEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(30), self.events.recv())
                .await
                .expect("no event in time")
                .expect("inbox closed");
            if !matches!(event, TerminalEvent::Totals(_)) {
                return event;
            }
        }
    }

    /// Totals once everything queued so far has been applied. Events still
    /// unread are skipped.
    async fn totals(&mut self) -> SessionTotals {
        // ListHolds answers with its own event; the totals right after it
        // belong to the same command
        self.operator(OperatorCommand::ListHolds).await;
        loop {
            let event = self.events.recv().await.expect("inbox closed");
            if matches!(event, TerminalEvent::Holds(_)) {
                break;
            }
        }
        match self.events.recv().await.expect("inbox closed") {
            TerminalEvent::Totals(totals) => totals,
            other => panic!("expected totals, got {:?}", other),
        }
    }

    async fn stop(self) -> (Register<MemorySink>, RecordingHooks) {
        self.inbox.shutdown().await.unwrap();
        (self.task.await.unwrap(), self.hooks)
    }
}

// =============================================================================
// Settlement
// =============================================================================

#[tokio::test]
async fn confirmed_cash_tender_settles_and_opens_drawer() {
    let mut lane = lane();
    lane.scan("1001").await;
    assert!(matches!(lane.next().await, TerminalEvent::LineAdded(line) if line.name == "Wine"));

    lane.tender(PaymentMethod::Cash, 5000).await;
    match lane.next().await {
        TerminalEvent::Settled {
            total,
            change,
            receipt_number,
            ..
        } => {
            assert_eq!(total, cents(2000));
            assert_eq!(change, cents(3000));
            assert!(receipt_number.ends_with("-01-0001"));
        }
        other => panic!("expected settlement, got {:?}", other),
    }

    let (register, hooks) = lane.stop().await;
    assert_eq!(register.sink().transactions().len(), 1);

    let recorded = hooks.recorded();
    assert_eq!(recorded.len(), 2);
    assert_eq!(recorded[0], DeviceHook::OpenCashDrawer);
    assert!(matches!(recorded[1], DeviceHook::PrintReceipt { .. }));
}

#[tokio::test]
async fn partial_tender_waits_for_the_rest() {
    let mut lane = lane();
    lane.scan("1001").await;
    lane.next().await;

    lane.tender(PaymentMethod::Card, 1500).await;
    let totals = lane.totals().await;
    assert_eq!(totals.state, SessionState::Tendering);
    assert_eq!(totals.balance_due, cents(500));

    lane.tender(PaymentMethod::Voucher, 500).await;
    assert!(matches!(lane.next().await, TerminalEvent::Settled { change, .. } if change.is_zero()));

    let (_, hooks) = lane.stop().await;
    // No cash taken, so no drawer
    assert!(!hooks.recorded().contains(&DeviceHook::OpenCashDrawer));
}

#[tokio::test]
async fn auto_settle_off_needs_explicit_settle() {
    let mut lane = lane_with(
        MemorySink::new(),
        InboxOptions {
            auto_settle: false,
            ..InboxOptions::default()
        },
    );
    lane.scan("1002").await;
    lane.next().await;
    lane.tender(PaymentMethod::Card, 1000).await;

    let totals = lane.totals().await;
    assert!(totals.balance_due.is_zero());
    assert_eq!(totals.state, SessionState::Tendering);

    lane.operator(OperatorCommand::Settle).await;
    assert!(matches!(lane.next().await, TerminalEvent::Settled { .. }));
}

#[tokio::test]
async fn failed_commit_is_rejected_and_sale_stays_open() {
    let sink = MemorySink::new();
    sink.fail_commits(true);
    let mut lane = lane_with(sink, InboxOptions::default());

    lane.scan("1002").await;
    lane.next().await;
    lane.tender(PaymentMethod::Card, 1000).await;

    assert!(matches!(
        lane.next().await,
        TerminalEvent::Rejected {
            kind: ErrorKind::Persistence,
            ..
        }
    ));
    assert_eq!(lane.totals().await.state, SessionState::Tendering);

    let (register, _) = lane.stop().await;
    assert!(register.sink().transactions().is_empty());
}

// =============================================================================
// Weighing
// =============================================================================

#[tokio::test]
async fn weighed_item_is_added_from_scale_reading() {
    let mut lane = lane();
    lane.scan("2001").await;
    assert!(matches!(
        lane.next().await,
        TerminalEvent::AwaitingWeight { name, .. } if name == "Grapes"
    ));

    assert!(lane.feed.publish(750));
    match lane.next().await {
        TerminalEvent::LineAdded(line) => {
            assert_eq!(line.measure, LineMeasure::Weight(750));
            assert_eq!(line.line_total(), cents(900));
        }
        other => panic!("expected weighed line, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn scale_silence_is_a_hardware_timeout() {
    let mut lane = lane_with(
        MemorySink::new(),
        InboxOptions {
            scale_timeout: Duration::from_millis(500),
            ..InboxOptions::default()
        },
    );
    lane.scan("2001").await;
    assert!(matches!(lane.next().await, TerminalEvent::AwaitingWeight { .. }));

    assert!(matches!(
        lane.next().await,
        TerminalEvent::Rejected {
            kind: ErrorKind::HardwareTimeout,
            ..
        }
    ));

    // A late reading has nothing to complete
    lane.feed.publish(750);
    assert_eq!(lane.totals().await.line_count, 0);

    let (register, _) = lane.stop().await;
    assert!(register.pending_weigh().is_none());
}

#[tokio::test]
async fn cancelled_weigh_ignores_later_readings() {
    let mut lane = lane();
    lane.scan("2001").await;
    lane.next().await;

    lane.operator(OperatorCommand::CancelWeigh).await;
    assert!(matches!(lane.next().await, TerminalEvent::WeighCancelled));

    lane.feed.publish(500);
    assert_eq!(lane.totals().await.line_count, 0);
}

// =============================================================================
// Ordering and resilience
// =============================================================================

#[tokio::test]
async fn rejection_keeps_the_inbox_running() {
    let mut lane = lane();
    lane.scan("9999").await;
    assert!(matches!(
        lane.next().await,
        TerminalEvent::Rejected {
            kind: ErrorKind::Validation,
            ..
        }
    ));

    lane.scan("1002").await;
    assert!(matches!(lane.next().await, TerminalEvent::LineAdded(_)));
}

#[tokio::test]
async fn commands_apply_in_arrival_order() {
    let mut lane = lane();
    for code in ["1001", "1002", "1001", "1002", "1002"] {
        lane.operator(OperatorCommand::AddItem {
            code: code.to_string(),
            quantity: 1,
        })
        .await;
    }

    let mut names = Vec::new();
    for _ in 0..5 {
        match lane.next().await {
            TerminalEvent::LineAdded(line) => names.push(line.name),
            other => panic!("expected line, got {:?}", other),
        }
    }
    assert_eq!(names, ["Wine", "Cheese", "Wine", "Cheese", "Cheese"]);
    assert_eq!(lane.totals().await.subtotal, cents(7000));
}

#[tokio::test]
async fn held_sale_can_be_listed_and_resumed() {
    let mut lane = lane();
    lane.scan("1001").await;
    lane.next().await;

    lane.operator(OperatorCommand::Hold).await;
    let hold_id = match lane.next().await {
        TerminalEvent::Held { hold_id } => hold_id,
        other => panic!("expected hold, got {:?}", other),
    };

    lane.operator(OperatorCommand::ListHolds).await;
    match lane.next().await {
        TerminalEvent::Holds(holds) => {
            assert_eq!(holds.len(), 1);
            assert_eq!(holds[0].hold_id, hold_id);
            assert_eq!(holds[0].subtotal, cents(2000));
        }
        other => panic!("expected holds, got {:?}", other),
    }

    lane.operator(OperatorCommand::Resume {
        hold_id: hold_id.clone(),
    })
    .await;
    assert!(matches!(lane.next().await, TerminalEvent::Resumed { hold_id: id } if id == hold_id));
    assert_eq!(lane.totals().await.subtotal, cents(2000));

    let (register, _) = lane.stop().await;
    assert!(register.list_holds().is_empty());
}

#[tokio::test]
async fn dropping_every_handle_stops_the_inbox() {
    let lane = lane();
    let Lane { inbox, task, .. } = lane;
    drop(inbox);

    let register = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("inbox did not stop")
        .unwrap();
    assert!(register.sink().transactions().is_empty());
}
