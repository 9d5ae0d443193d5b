//! Register flows against a real (in-memory) SQLite database.

use std::sync::Arc;

use chrono::Utc;
use tally_core::catalog::CatalogCache;
use tally_core::register::{Register, RegisterSettings, ScanOutcome};
use tally_core::{ErrorKind, LineMeasure, Money, PaymentMethod, Product, RefundSource, SessionState};
use tally_db::{Database, DbConfig, DbError};

fn cents(c: i64) -> Money {
    Money::from_cents(c)
}

async fn seeded_db() -> Database {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();

    let products = [
        // $20.00
        Product::new("1001", "Wine", 1600, 2500).with_stock(10, 3),
        // $10.00
        Product::new("1002", "Cheese", 1000, 0).with_stock(4, 1),
        // $12.00/kg
        Product::new("2001", "Grapes", 1000, 2000)
            .by_weight()
            .with_stock(5_000, 500),
    ];
    for product in &products {
        db.products().insert(product).await.unwrap();
    }

    db
}

async fn register_for(db: &Database) -> Register<Database> {
    let catalog = db.products().load_catalog().await.unwrap();
    Register::new(
        RegisterSettings::default(),
        db.clone(),
        Arc::new(CatalogCache::new(catalog)),
    )
}

async fn pay(register: &mut Register<Database>, method: PaymentMethod, amount: i64) {
    register.propose_tender(method, cents(amount)).unwrap();
    register.confirm_tender(method).unwrap();
}

#[tokio::test]
async fn settled_sale_is_stored_with_lines_and_payments() {
    let db = seeded_db().await;
    let mut register = register_for(&db).await;

    register.add_item("1001", 2).unwrap();
    assert!(matches!(
        register.scan("2001").await.unwrap(),
        ScanOutcome::AwaitingWeight(_)
    ));
    // 750 g at $12.00/kg
    register.apply_weight(750).unwrap();
    assert_eq!(register.totals().subtotal, cents(4900));

    pay(&mut register, PaymentMethod::Card, 2000).await;
    pay(&mut register, PaymentMethod::Cash, 5000).await;

    let outcome = register.settle().await.unwrap();
    assert!(outcome.stock_warning.is_none());

    let stored = db
        .sales()
        .get_by_receipt(&outcome.transaction.receipt_number)
        .await
        .unwrap()
        .expect("sale stored");

    assert_eq!(stored.id, outcome.transaction.id);
    assert_eq!(stored.total, cents(4900));
    assert_eq!(stored.change_given, cents(2100));
    assert_eq!(stored.lines.len(), 2);
    assert_eq!(stored.lines[0].measure, LineMeasure::Units(2));
    assert_eq!(stored.lines[1].measure, LineMeasure::Weight(750));
    assert_eq!(stored.lines[1].line_total(), cents(900));
    assert_eq!(stored.payments.len(), 2);
    assert_eq!(stored.amount_paid(), cents(4900));
    assert!(stored.took_cash());

    let wine = db.products().get_by_barcode("1001").await.unwrap().unwrap();
    let grapes = db.products().get_by_barcode("2001").await.unwrap().unwrap();
    assert_eq!(wine.stock_quantity, 8);
    assert_eq!(grapes.stock_quantity, 4_250);
}

#[tokio::test]
async fn duplicate_receipt_number_is_rejected() {
    let db = seeded_db().await;
    let mut register = register_for(&db).await;

    register.add_item("1002", 1).unwrap();
    pay(&mut register, PaymentMethod::Card, 1000).await;
    let outcome = register.settle().await.unwrap();

    let mut copy = outcome.transaction.clone();
    copy.id = "another-sale".to_string();
    let err = db.sales().insert_settled(&copy).await.unwrap_err();
    assert!(matches!(err, DbError::UniqueViolation { .. }));
    assert_eq!(db.sales().count().await.unwrap(), 1);
}

#[tokio::test]
async fn receipt_sequence_resumes_after_restart() {
    let db = seeded_db().await;
    let mut register = register_for(&db).await;

    for _ in 0..2 {
        register.add_item("1002", 1).unwrap();
        pay(&mut register, PaymentMethod::Card, 1000).await;
        register.settle().await.unwrap();
    }

    let today = Utc::now().date_naive();
    let last = db.sales().last_receipt_sequence(today, "01").await.unwrap();
    assert_eq!(last, 2);
    assert_eq!(db.sales().last_receipt_sequence(today, "02").await.unwrap(), 0);

    let mut restarted = register_for(&db).await;
    restarted.resume_receipt_sequence(today, last);
    restarted.add_item("1002", 1).unwrap();
    pay(&mut restarted, PaymentMethod::Card, 1000).await;
    let outcome = restarted.settle().await.unwrap();
    assert!(outcome.transaction.receipt_number.ends_with("-01-0003"));
}

#[tokio::test]
async fn held_sessions_survive_a_restart() {
    let db = seeded_db().await;
    let mut register = register_for(&db).await;

    register.add_item("1001", 1).unwrap();
    pay(&mut register, PaymentMethod::Voucher, 500).await;
    let hold_id = register.hold().await.unwrap();
    assert_eq!(db.holds().count().await.unwrap(), 1);

    let mut restarted = register_for(&db).await;
    let records = db.holds().list().await.unwrap();
    assert_eq!(restarted.restore_holds(records), 1);

    let totals = restarted.resume(&hold_id).await.unwrap();
    assert_eq!(totals.state, SessionState::Tendering);
    assert_eq!(totals.amount_tendered, cents(500));
    assert_eq!(totals.balance_due, cents(1500));
    assert_eq!(db.holds().count().await.unwrap(), 0);

    // The first register still lists the hold but can no longer claim it
    let err = register.resume(&hold_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(register.session().state(), SessionState::Empty);
}

#[tokio::test]
async fn refunds_are_stored_apart_from_sales() {
    let db = seeded_db().await;
    let mut register = register_for(&db).await;

    register.add_item("1001", 2).unwrap();
    pay(&mut register, PaymentMethod::Cash, 4000).await;
    let sale = register.settle().await.unwrap().transaction;

    register.arm_refund();
    register.scan("1002").await.unwrap();

    let stored = db.sales().get_by_receipt(&sale.receipt_number).await.unwrap().unwrap();
    let line_id = stored.lines[0].id.clone();
    let outcome = register.refund_settled_line(&stored, &line_id).await.unwrap();
    assert_eq!(outcome.refund.amount, cents(-4000));

    let recent = db.refunds().list_recent(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert!(recent.iter().all(|r| r.amount.is_negative()));

    let against_sale = db.refunds().for_sale(&sale.id).await.unwrap();
    assert_eq!(against_sale.len(), 1);
    assert!(matches!(against_sale[0].source, RefundSource::SettledLine { .. }));

    // The sale itself is untouched
    let again = db.sales().get_by_receipt(&sale.receipt_number).await.unwrap().unwrap();
    assert_eq!(again.total, cents(4000));
}

#[tokio::test]
async fn stock_update_for_unknown_product_is_not_found() {
    let db = seeded_db().await;

    let err = db.products().update_stock("no-such-product", -1).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));
}

#[tokio::test]
async fn inactive_products_stay_out_of_the_catalog() {
    let db = seeded_db().await;

    let mut cheese = db.products().get_by_barcode("1002").await.unwrap().unwrap();
    cheese.is_active = false;
    db.products().update(&cheese).await.unwrap();

    let catalog = db.products().load_catalog().await.unwrap();
    assert_eq!(catalog.len(), 2);
    assert!(catalog.iter().all(|p| p.barcode != "1002"));
    assert_eq!(db.products().count().await.unwrap(), 2);
}

#[tokio::test]
async fn invalid_products_never_reach_the_store() {
    let db = seeded_db().await;

    let err = db
        .products()
        .insert(&Product::new("3001", "   ", 500, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Validation(_)));

    let err = db
        .products()
        .insert(&Product::new("1001", "Second wine", 900, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::UniqueViolation { .. }));

    assert_eq!(db.products().count().await.unwrap(), 3);
}
