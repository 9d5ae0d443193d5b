//! End-to-end register flows against the in-memory sink.

use std::sync::Arc;

use tally_core::catalog::CatalogCache;
use tally_core::events::{DeviceHook, HardwareEvent, PaynowVendor, TenderKey};
use tally_core::hold::HoldOrder;
use tally_core::register::{
    EventOutcome, ReceiptMode, Register, RegisterSettings, ScanOutcome,
};
use tally_core::sink::MemorySink;
use tally_core::{CoreError, ErrorKind, Money, PaymentMethod, Product, SessionState};

fn cents(c: i64) -> Money {
    Money::from_cents(c)
}

fn catalog() -> Arc<CatalogCache> {
    Arc::new(CatalogCache::new(vec![
        // $20.00 after 25% markup
        Product::new("1001", "Wine", 1600, 2500).with_stock(10, 3),
        // $10.00, no markup
        Product::new("1002", "Cheese", 1000, 0).with_stock(4, 1),
        // $12.00/kg
        Product::new("2001", "Grapes", 1000, 2000)
            .by_weight()
            .with_stock(5_000, 500),
    ]))
}

fn register_with(settings: RegisterSettings) -> Register<MemorySink> {
    Register::new(settings, MemorySink::new(), catalog())
}

fn register() -> Register<MemorySink> {
    register_with(RegisterSettings::default())
}

async fn tender(register: &mut Register<MemorySink>, method: PaymentMethod, amount: i64) {
    register.propose_tender(method, cents(amount)).unwrap();
    register.confirm_tender(method).unwrap();
}

// =============================================================================
// Settlement
// =============================================================================

#[tokio::test]
async fn split_cash_and_voucher_settles_exact_total() {
    let mut register = register();
    register.add_item("1001", 2).unwrap();
    register.add_item("1002", 1).unwrap();
    register.remove_item("no-such-line").unwrap();
    assert_eq!(register.totals().subtotal, cents(5000));

    tender(&mut register, PaymentMethod::Cash, 3000).await;
    tender(&mut register, PaymentMethod::Voucher, 2000).await;

    let outcome = register.settle().await.unwrap();
    let tx = &outcome.transaction;

    assert_eq!(tx.total, cents(5000));
    assert_eq!(tx.payments.len(), 2);
    assert_eq!(tx.amount_paid(), cents(5000));
    assert!(tx.change_given.is_zero());
    assert_eq!(register.session().state(), SessionState::Settled);
    assert_eq!(register.sink().transactions().len(), 1);
    assert_eq!(outcome.hooks[0], DeviceHook::OpenCashDrawer);
    assert!(matches!(outcome.hooks[1], DeviceHook::PrintReceipt { .. }));
}

#[tokio::test]
async fn settle_with_balance_due_is_a_state_error() {
    let mut register = register();
    register.add_item("1001", 1).unwrap();
    tender(&mut register, PaymentMethod::Card, 1500).await;

    let err = register.settle().await.unwrap_err();
    assert!(matches!(err, CoreError::BalanceOutstanding { balance_due } if balance_due == cents(500)));
    assert_eq!(err.kind(), ErrorKind::State);
    assert!(register.sink().transactions().is_empty());
}

#[tokio::test]
async fn cash_overpayment_gives_change_and_locks_until_next_sale() {
    let mut register = register();
    register
        .add_ad_hoc_item("Hamper", 1, cents(10099))
        .unwrap();

    register
        .propose_tender(PaymentMethod::Cash, cents(15000))
        .unwrap();
    let confirmed = register.confirm_tender(PaymentMethod::Cash).unwrap();
    assert_eq!(confirmed.confirmation.change_due, cents(4901));
    assert!(matches!(
        register.propose_tender(PaymentMethod::Card, cents(1)),
        Err(CoreError::TenderLocked)
    ));

    let outcome = register.settle().await.unwrap();
    assert_eq!(outcome.transaction.change_given, cents(4901));
    assert!(outcome.hooks.contains(&DeviceHook::OpenCashDrawer));

    // Next sale starts unlocked.
    register.add_item("1002", 1).unwrap();
    assert!(!register.totals().tender_locked);
    assert_eq!(register.session().state(), SessionState::Building);
}

#[tokio::test]
async fn clearing_voucher_under_cash_lock_reopens_tendering() {
    let mut register = register();
    register.add_item("1001", 1).unwrap();
    tender(&mut register, PaymentMethod::Voucher, 500).await;
    tender(&mut register, PaymentMethod::Cash, 1800).await;
    assert!(register.session().is_tender_locked());

    register.clear_tender(PaymentMethod::Voucher).unwrap();
    assert_eq!(register.totals().balance_due, cents(200));
    assert!(!register.session().is_tender_locked());

    tender(&mut register, PaymentMethod::Card, 200).await;
    let outcome = register.settle().await.unwrap();
    assert_eq!(outcome.transaction.total, cents(2000));
}

#[tokio::test]
async fn cash_past_the_amount_ceiling_is_rejected() {
    let mut register = register();
    register.add_item("1001", 1).unwrap();
    tender(&mut register, PaymentMethod::Voucher, 100).await;

    let err = register
        .propose_tender(PaymentMethod::Cash, cents(i64::MAX))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(matches!(
        register.confirm_tender(PaymentMethod::Cash),
        Err(CoreError::NoStagedTender(PaymentMethod::Cash))
    ));
    assert_eq!(register.totals().balance_due, cents(1900));
}

#[tokio::test]
async fn non_cash_overpayment_rejected() {
    let mut register = register();
    register.add_item("1002", 5).unwrap();
    register
        .propose_tender(PaymentMethod::Card, cents(6000))
        .unwrap();

    let err = register.confirm_tender(PaymentMethod::Card).unwrap_err();
    assert!(matches!(err, CoreError::OverpaymentNotAllowed { .. }));
    assert_eq!(register.totals().balance_due, cents(5000));
}

#[tokio::test]
async fn card_only_sale_does_not_open_drawer() {
    let mut register = register_with(RegisterSettings {
        receipt_mode: ReceiptMode::Manual,
        ..RegisterSettings::default()
    });
    register.add_item("1002", 1).unwrap();
    tender(&mut register, PaymentMethod::Card, 1000).await;

    let outcome = register.settle().await.unwrap();
    assert_eq!(
        outcome.hooks,
        vec![DeviceHook::PromptPrintReceipt {
            receipt_number: outcome.transaction.receipt_number.clone()
        }]
    );
}

#[tokio::test]
async fn commit_failure_leaves_session_tendering_and_retry_works() {
    let mut register = register();
    register.add_item("1001", 1).unwrap();
    tender(&mut register, PaymentMethod::Cash, 2000).await;

    register.sink().fail_commits(true);
    let err = register.settle().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(register.session().state(), SessionState::Tendering);
    assert_eq!(register.catalog().lookup("1001").unwrap().stock_quantity, 10);

    register.sink().fail_commits(false);
    let outcome = register.settle().await.unwrap();
    assert!(outcome.transaction.receipt_number.ends_with("-01-0001"));
    assert_eq!(register.catalog().lookup("1001").unwrap().stock_quantity, 9);
}

#[tokio::test]
async fn receipt_numbers_increase_per_sale() {
    let mut register = register();
    let mut receipts = Vec::new();
    for _ in 0..3 {
        register.add_item("1002", 1).unwrap();
        tender(&mut register, PaymentMethod::Card, 1000).await;
        receipts.push(register.settle().await.unwrap().transaction.receipt_number);
    }
    assert!(receipts[0].ends_with("-0001"));
    assert!(receipts[2].ends_with("-0003"));
}

// =============================================================================
// Stock
// =============================================================================

#[tokio::test]
async fn settlement_decrements_stock_and_raises_alerts() {
    let mut register = register();
    register.add_item("1002", 3).unwrap();
    register.add_weight_item("2001", 4_600).unwrap();
    let due = register.totals().balance_due.cents();
    tender(&mut register, PaymentMethod::Card, due).await;

    let outcome = register.settle().await.unwrap();

    assert!(outcome.stock_warning.is_none());
    let mut alerted: Vec<&str> = outcome
        .stock_alerts
        .iter()
        .map(|a| a.barcode.as_str())
        .collect();
    alerted.sort();
    assert_eq!(alerted, vec!["1002", "2001"]);
    assert_eq!(register.catalog().lookup("2001").unwrap().stock_quantity, 400);
}

#[tokio::test]
async fn stock_failure_is_a_warning_and_rolls_back() {
    let mut register = register();
    register.add_item("1001", 1).unwrap();
    register.add_item("1002", 1).unwrap();
    tender(&mut register, PaymentMethod::Card, 3000).await;
    register.sink().fail_stock_after(Some(1));

    let outcome = register.settle().await.unwrap();

    assert!(matches!(
        outcome.stock_warning,
        Some(CoreError::StockPersistenceFailed { .. })
    ));
    assert_eq!(register.session().state(), SessionState::Settled);
    assert!(register.sink().net_stock().values().all(|v| *v == 0));
    assert_eq!(register.catalog().lookup("1001").unwrap().stock_quantity, 10);
    assert_eq!(register.catalog().lookup("1002").unwrap().stock_quantity, 4);
}

#[tokio::test]
async fn stock_may_go_negative() {
    let mut register = register();
    register.add_item("1002", 6).unwrap();
    tender(&mut register, PaymentMethod::Card, 6000).await;

    register.settle().await.unwrap();
    assert_eq!(register.catalog().lookup("1002").unwrap().stock_quantity, -2);
}

// =============================================================================
// Line changes while tendering
// =============================================================================

#[tokio::test]
async fn adjust_while_tendering_clears_tenders() {
    let mut register = register();
    let line = register.add_item("1002", 3).unwrap();
    tender(&mut register, PaymentMethod::Voucher, 1000).await;
    assert_eq!(register.session().state(), SessionState::Tendering);

    register.adjust_quantity(&line.id, 1).unwrap();

    let totals = register.totals();
    assert_eq!(totals.state, SessionState::Building);
    assert!(totals.amount_tendered.is_zero());
    assert_eq!(totals.balance_due, cents(4000));
}

#[tokio::test]
async fn stale_remove_is_a_no_op() {
    let mut register = register();
    let line = register.add_item("1002", 1).unwrap();
    register.add_item("1001", 1).unwrap();

    assert!(register.remove_item(&line.id).unwrap());
    assert!(!register.remove_item(&line.id).unwrap());
    assert_eq!(register.totals().subtotal, cents(2000));
}

// =============================================================================
// Weighing
// =============================================================================

#[tokio::test]
async fn scanning_weight_product_waits_for_scale() {
    let mut register = register();

    let outcome = register.scan("2001").await.unwrap();
    assert!(matches!(outcome, ScanOutcome::AwaitingWeight(ref p) if p.barcode == "2001"));
    assert!(register.session().lines().is_empty());

    let line = register.apply_weight(500).unwrap();
    assert_eq!(line.line_total(), cents(600));
    assert!(register.pending_weigh().is_none());
    assert!(matches!(
        register.apply_weight(500),
        Err(CoreError::NoPendingWeigh)
    ));
}

#[tokio::test]
async fn zero_weight_is_rejected() {
    let mut register = register();
    register.add_item("1002", 1).unwrap();

    let err = register.add_weight_item("2001", 0).unwrap_err();
    assert!(matches!(err, CoreError::InvalidWeight { grams: 0 }));
    assert_eq!(register.session().lines().len(), 1);
}

#[tokio::test]
async fn cancelled_weigh_discards_reading() {
    let mut register = register();
    register.scan("2001").await.unwrap();

    assert!(register.cancel_weigh());
    assert!(!register.cancel_weigh());
    assert!(register.apply_weight(300).is_err());
    assert!(register.session().lines().is_empty());
}

// =============================================================================
// Holds
// =============================================================================

#[tokio::test]
async fn hold_and_resume_round_trip() {
    let mut register = register_with(RegisterSettings {
        hold_order: HoldOrder::OldestFirst,
        ..RegisterSettings::default()
    });
    register.add_item("1001", 1).unwrap();
    register.add_weight_item("2001", 250).unwrap();
    let lines = register.session().lines().to_vec();
    let subtotal = register.totals().subtotal;
    let session_id = register.session().id().to_string();

    let hold_id = register.hold().await.unwrap();
    assert!(hold_id.starts_with("H-"));
    assert_eq!(register.session().state(), SessionState::Empty);
    assert_eq!(register.sink().holds().len(), 1);
    assert_eq!(register.list_holds().len(), 1);

    let totals = register.resume(&hold_id).await.unwrap();
    assert_eq!(totals.subtotal, subtotal);
    assert_eq!(register.session().id(), session_id);
    assert_eq!(register.session().lines(), lines.as_slice());
    assert!(register.sink().holds().is_empty());

    register.cancel().unwrap();
    assert!(matches!(
        register.resume(&hold_id).await,
        Err(CoreError::HoldNotFound(_))
    ));
}

#[tokio::test]
async fn resume_requires_idle_terminal() {
    let mut register = register();
    register.add_item("1001", 1).unwrap();
    let hold_id = register.hold().await.unwrap();
    register.add_item("1002", 1).unwrap();

    assert!(matches!(
        register.resume(&hold_id).await,
        Err(CoreError::SessionInProgress { .. })
    ));
    assert_eq!(register.list_holds().len(), 1);
}

#[tokio::test]
async fn failed_hold_write_keeps_sale_active() {
    let mut register = register();
    register.add_item("1001", 1).unwrap();
    register.sink().fail_holds(true);

    let err = register.hold().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(register.session().state(), SessionState::Building);
    assert!(register.list_holds().is_empty());
}

#[tokio::test]
async fn failed_hold_write_does_not_skip_an_id() {
    let mut register = register();
    register.add_item("1001", 1).unwrap();
    register.sink().fail_holds(true);
    assert!(register.hold().await.is_err());

    register.sink().fail_holds(false);
    assert_eq!(register.hold().await.unwrap(), "H-0001");
}

#[tokio::test]
async fn failed_release_keeps_the_hold_and_refuses_resume() {
    let mut register = register();
    register.add_item("1001", 1).unwrap();
    let hold_id = register.hold().await.unwrap();

    register.sink().fail_holds(true);
    let err = register.resume(&hold_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(register.session().state(), SessionState::Empty);
    assert_eq!(register.list_holds().len(), 1);
    assert_eq!(register.sink().holds().len(), 1);

    let err = register.discard_hold(&hold_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(register.list_holds().len(), 1);

    register.sink().fail_holds(false);
    register.resume(&hold_id).await.unwrap();
    assert!(register.sink().holds().is_empty());

    // A restart sees no copy of the resumed hold
    let restarted = register_with(RegisterSettings::default());
    assert_eq!(restarted.restore_holds(register.sink().holds()), 0);
    assert!(restarted.list_holds().is_empty());
}

#[tokio::test]
async fn cannot_hold_empty_session() {
    let mut register = register();
    assert!(matches!(
        register.hold().await,
        Err(CoreError::CannotHoldEmptySession)
    ));
}

#[tokio::test]
async fn resumed_tendering_session_keeps_confirmed_tenders() {
    let mut register = register();
    register.add_item("1001", 1).unwrap();
    tender(&mut register, PaymentMethod::Voucher, 500).await;

    let hold_id = register.hold().await.unwrap();
    register.resume(&hold_id).await.unwrap();

    assert_eq!(register.session().state(), SessionState::Tendering);
    assert_eq!(register.totals().balance_due, cents(1500));
    tender(&mut register, PaymentMethod::Card, 1500).await;
    assert!(register.settle().await.is_ok());
}

// =============================================================================
// Refunds
// =============================================================================

#[tokio::test]
async fn armed_scan_refunds_once() {
    let mut register = register();
    register.arm_refund();

    let outcome = register.scan("1001").await.unwrap();
    let ScanOutcome::Refunded(refund) = outcome else {
        panic!("expected refund");
    };
    assert_eq!(refund.refund.amount, cents(-2000));
    assert!(refund.hooks.contains(&DeviceHook::OpenCashDrawer));
    assert!(!register.is_refund_armed());
    assert_eq!(register.sink().refunds().len(), 1);

    // Disarmed: the next scan is a sale.
    assert!(matches!(
        register.scan("1001").await.unwrap(),
        ScanOutcome::Added(_)
    ));
}

#[tokio::test]
async fn refund_unknown_barcode_stays_armed() {
    let mut register = register();
    register.arm_refund();

    assert!(matches!(
        register.scan("9999").await,
        Err(CoreError::ProductNotFound(_))
    ));
    assert!(register.is_refund_armed());
}

#[tokio::test]
async fn refund_persistence_failure_stays_armed() {
    let mut register = register();
    register.arm_refund();
    register.sink().fail_refunds(true);

    assert!(register.scan("1001").await.is_err());
    assert!(register.is_refund_armed());
    assert!(register.session().lines().is_empty());
}

#[tokio::test]
async fn refund_settled_line_at_sold_price() {
    let mut register = register();
    let line = register.add_item("1001", 2).unwrap();
    tender(&mut register, PaymentMethod::Card, 4000).await;
    let tx = register.settle().await.unwrap().transaction;

    // A later price change does not affect the refund.
    let mut wine = register.catalog().lookup("1001").unwrap();
    wine.cost_cents = 9999;
    register.catalog().replace_product(wine);

    let outcome = register.refund_settled_line(&tx, &line.id).await.unwrap();
    assert_eq!(outcome.refund.amount, cents(-4000));
}

// =============================================================================
// Hardware events
// =============================================================================

#[tokio::test]
async fn hardware_events_drive_a_sale() {
    let mut register = register_with(RegisterSettings {
        paynow: Some(PaynowVendor {
            bank: "DBS".into(),
            account_name: "Corner Mart".into(),
            account_number: "123-456".into(),
        }),
        ..RegisterSettings::default()
    });

    register
        .handle_event(HardwareEvent::Scan("1002".into()))
        .await
        .unwrap();
    register
        .handle_event(HardwareEvent::Scan("2001".into()))
        .await
        .unwrap();
    let weighed = register
        .handle_event(HardwareEvent::Weight(1000))
        .await
        .unwrap();
    assert!(matches!(weighed, EventOutcome::Weighed(_)));

    register
        .handle_event(HardwareEvent::TenderKey(TenderKey::Propose {
            method: PaymentMethod::Paynow,
            amount: cents(2200),
        }))
        .await
        .unwrap();
    let confirmed = register
        .handle_event(HardwareEvent::TenderKey(TenderKey::Confirm {
            method: PaymentMethod::Paynow,
        }))
        .await
        .unwrap();

    let EventOutcome::TenderConfirmed(outcome) = confirmed else {
        panic!("expected confirmation");
    };
    assert!(matches!(
        outcome.hooks.as_slice(),
        [DeviceHook::ShowPaynowQr { amount, .. }] if *amount == cents(2200)
    ));
    assert!(outcome.confirmation.balance_due.is_zero());
    assert!(register.settle().await.is_ok());
}

#[tokio::test]
async fn catalog_reload_keeps_line_prices() {
    let mut register = register();
    register.add_item("1002", 1).unwrap();

    register.reload_catalog(vec![Product::new("1002", "Cheese", 5000, 0)]);
    register.add_ad_hoc_item("Bag", 1, cents(10)).unwrap();

    assert_eq!(register.totals().subtotal, cents(1010));
}
