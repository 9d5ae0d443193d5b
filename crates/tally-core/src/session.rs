//! # Transaction Session
//!
//! The state machine that owns one sale's line and tender ledgers.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   Empty ──add──► Building ◄──────────── line change ───┐               │
//! │                    │  ▲ (add/remove/adjust)              │               │
//! │                    │  └──── clear last confirmed tender  │               │
//! │                    │                                     │               │
//! │                    └──confirm tender──► Tendering ───────┘               │
//! │                                             │                           │
//! │                                settle (balance due == 0)                │
//! │                                             ▼                           │
//! │                                          Settled                        │
//! │                                                                         │
//! │   Building | Tendering ──hold──► Held      (resume → same session id)   │
//! │   Building | Tendering ──cancel──► Cancelled                            │
//! │                                                                         │
//! │   Settled, Held and Cancelled reject every mutation.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Line Changes Reset Tendering
//! Any add, remove or adjust while `Tendering` clears every tender entry,
//! releases the tender lock and returns to `Building`. Payments are always
//! re-entered against the new subtotal.
//!
//! ## Two-Phase Settlement
//! `prepare_settlement` builds the `SettledTransaction` without changing
//! state. The caller persists it, and only then calls `mark_settled`.
//! A failed commit therefore leaves the session in `Tendering`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use ts_rs::TS;
use uuid::Uuid;

use crate::catalog::CatalogCache;
use crate::error::{CoreError, CoreResult};
use crate::ledger::LineLedger;
use crate::money::Money;
use crate::tender::{TenderConfirmation, TenderEntry, TenderLedger};
use crate::types::{LineItem, PaymentMethod, SessionState, SettledTransaction};

// =============================================================================
// Derived Totals
// =============================================================================

/// Derived figures for UI observers. Recomputed on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SessionTotals {
    pub state: SessionState,
    pub line_count: usize,
    pub subtotal: Money,
    pub amount_tendered: Money,
    pub balance_due: Money,
    pub change_due: Money,
    pub tender_locked: bool,
}

// =============================================================================
// Session
// =============================================================================

/// One sale in progress.
#[derive(Debug, Clone)]
pub struct TransactionSession {
    id: String,
    state: SessionState,
    lines: LineLedger,
    tenders: TenderLedger,
    created_at: DateTime<Utc>,
}

impl Default for TransactionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionSession {
    /// Starts a fresh `Empty` session.
    pub fn new() -> Self {
        TransactionSession {
            id: Uuid::new_v4().to_string(),
            state: SessionState::Empty,
            lines: LineLedger::new(),
            tenders: TenderLedger::new(),
            created_at: Utc::now(),
        }
    }

    /// Rebuilds a suspended session with its original id.
    pub(crate) fn rehydrate(
        id: String,
        created_at: DateTime<Utc>,
        lines: Vec<LineItem>,
        tenders: &[TenderEntry],
        tender_locked: bool,
    ) -> Self {
        let tenders = TenderLedger::from_entries(tenders, tender_locked);
        let state = if tenders.has_confirmed() {
            SessionState::Tendering
        } else {
            SessionState::Building
        };
        TransactionSession {
            id,
            state,
            lines: LineLedger::from_lines(lines),
            tenders,
            created_at,
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn lines(&self) -> &[LineItem] {
        self.lines.lines()
    }

    pub fn tenders(&self) -> &[TenderEntry] {
        self.tenders.entries()
    }

    pub fn is_tender_locked(&self) -> bool {
        self.tenders.is_locked()
    }

    pub fn subtotal(&self) -> Money {
        self.lines.subtotal()
    }

    pub fn amount_tendered(&self) -> Money {
        self.tenders.amount_tendered()
    }

    pub fn balance_due(&self) -> Money {
        self.tenders.balance_due(self.subtotal())
    }

    pub fn change_due(&self) -> Money {
        self.tenders.change_due(self.subtotal())
    }

    /// Whether nothing has been entered (or the sale is over).
    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Empty || self.state.is_terminal()
    }

    pub fn totals(&self) -> SessionTotals {
        let subtotal = self.subtotal();
        SessionTotals {
            state: self.state,
            line_count: self.lines.len(),
            subtotal,
            amount_tendered: self.tenders.amount_tendered(),
            balance_due: self.tenders.balance_due(subtotal),
            change_due: self.tenders.change_due(subtotal),
            tender_locked: self.tenders.is_locked(),
        }
    }

    // =========================================================================
    // Line Operations
    // =========================================================================

    pub fn add_unit_item(
        &mut self,
        catalog: &CatalogCache,
        code: &str,
        qty: i64,
    ) -> CoreResult<LineItem> {
        self.ensure_mutable("add item")?;
        let line = self.lines.add_unit_item(catalog, code, qty)?;
        self.after_line_change();
        Ok(line)
    }

    pub fn add_weight_item(
        &mut self,
        catalog: &CatalogCache,
        code: &str,
        grams: i64,
    ) -> CoreResult<LineItem> {
        self.ensure_mutable("add item")?;
        let line = self.lines.add_weight_item(catalog, code, grams)?;
        self.after_line_change();
        Ok(line)
    }

    pub fn add_ad_hoc_item(&mut self, name: &str, qty: i64, unit_price: Money) -> CoreResult<LineItem> {
        self.ensure_mutable("add item")?;
        let line = self.lines.add_ad_hoc_item(name, qty, unit_price)?;
        self.after_line_change();
        Ok(line)
    }

    /// Removes a line. A stale id is a no-op and leaves tenders untouched.
    pub fn remove_item(&mut self, line_id: &str) -> CoreResult<bool> {
        self.ensure_mutable("remove item")?;
        let removed = self.lines.remove_item(line_id);
        if removed {
            self.after_line_change();
        }
        Ok(removed)
    }

    pub fn adjust_quantity(&mut self, line_id: &str, delta: i64) -> CoreResult<LineItem> {
        self.ensure_mutable("adjust quantity")?;
        let line = self.lines.adjust_quantity(line_id, delta)?;
        self.after_line_change();
        Ok(line)
    }

    // =========================================================================
    // Tender Operations
    // =========================================================================

    pub fn propose_tender(&mut self, method: PaymentMethod, amount: Money) -> CoreResult<()> {
        self.ensure_open("propose tender")?;
        self.tenders.propose(method, amount)
    }

    pub fn confirm_tender(&mut self, method: PaymentMethod) -> CoreResult<TenderConfirmation> {
        self.ensure_open("confirm tender")?;
        let confirmation = self.tenders.confirm(method, self.lines.subtotal())?;
        self.state = SessionState::Tendering;
        debug!(
            session_id = %self.id,
            method = %method,
            amount = %confirmation.amount,
            balance_due = %confirmation.balance_due,
            "Tender confirmed"
        );
        Ok(confirmation)
    }

    /// Clears one method. With no confirmed tender left the session is back
    /// to `Building`.
    pub fn clear_tender(&mut self, method: PaymentMethod) -> CoreResult<()> {
        self.ensure_open("clear tender")?;
        let subtotal = self.subtotal();
        self.tenders.clear(method, subtotal);
        if !self.tenders.has_confirmed() {
            self.state = SessionState::Building;
        }
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Builds the settled record without changing state.
    pub fn prepare_settlement(&self, receipt_number: &str) -> CoreResult<SettledTransaction> {
        if !self.state.is_open() {
            return Err(CoreError::invalid_state("settle", self.state));
        }

        let subtotal = self.subtotal();
        let balance_due = self.tenders.balance_due(subtotal);
        if balance_due.is_positive() {
            return Err(CoreError::BalanceOutstanding { balance_due });
        }

        Ok(SettledTransaction {
            id: Uuid::new_v4().to_string(),
            receipt_number: receipt_number.to_string(),
            session_id: self.id.clone(),
            settled_at: Utc::now(),
            subtotal,
            total: subtotal,
            change_given: self.tenders.change_due(subtotal),
            payments: self.tenders.settled_payments(subtotal),
            lines: self.lines.lines().to_vec(),
        })
    }

    /// Finalizes the session once its transaction is durably committed.
    pub fn mark_settled(&mut self) -> CoreResult<()> {
        if self.state != SessionState::Tendering || self.balance_due().is_positive() {
            return Err(CoreError::invalid_state("mark settled", self.state));
        }
        self.state = SessionState::Settled;
        Ok(())
    }

    /// Abandons the sale. No stock or financial effect.
    pub fn cancel(&mut self) -> CoreResult<()> {
        if !self.state.is_open() {
            return Err(CoreError::invalid_state("cancel", self.state));
        }
        self.state = SessionState::Cancelled;
        debug!(session_id = %self.id, lines = self.lines.len(), "Session cancelled");
        Ok(())
    }

    pub(crate) fn mark_held(&mut self) {
        self.state = SessionState::Held;
    }

    fn ensure_mutable(&self, operation: &'static str) -> CoreResult<()> {
        if self.state.is_terminal() {
            return Err(CoreError::invalid_state(operation, self.state));
        }
        Ok(())
    }

    fn ensure_open(&self, operation: &'static str) -> CoreResult<()> {
        if !self.state.is_open() {
            return Err(CoreError::invalid_state(operation, self.state));
        }
        Ok(())
    }

    fn after_line_change(&mut self) {
        if self.state == SessionState::Tendering {
            self.tenders.clear_all();
            debug!(session_id = %self.id, "Line change cleared tenders");
        }
        self.state = if self.lines.is_empty() {
            SessionState::Empty
        } else {
            SessionState::Building
        };
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Product;

    fn catalog() -> CatalogCache {
        CatalogCache::new(vec![
            Product::new("111", "Tea", 400, 2500),
            Product::new("222", "Apples", 1000, 2000).by_weight(),
        ])
    }

    fn cents(c: i64) -> Money {
        Money::from_cents(c)
    }

    #[test]
    fn test_first_item_moves_to_building() {
        let catalog = catalog();
        let mut session = TransactionSession::new();
        assert_eq!(session.state(), SessionState::Empty);

        session.add_unit_item(&catalog, "111", 1).unwrap();
        assert_eq!(session.state(), SessionState::Building);
    }

    #[test]
    fn test_tender_requires_lines() {
        let mut session = TransactionSession::new();
        assert!(matches!(
            session.propose_tender(PaymentMethod::Cash, cents(100)),
            Err(CoreError::InvalidStateTransition { state: SessionState::Empty, .. })
        ));
    }

    #[test]
    fn test_line_change_while_tendering_clears_tenders() {
        let catalog = catalog();
        let mut session = TransactionSession::new();
        let tea = session.add_unit_item(&catalog, "111", 4).unwrap();
        session.propose_tender(PaymentMethod::Card, cents(1000)).unwrap();
        session.confirm_tender(PaymentMethod::Card).unwrap();
        assert_eq!(session.state(), SessionState::Tendering);

        session.adjust_quantity(&tea.id, -1).unwrap();

        assert_eq!(session.state(), SessionState::Building);
        assert!(session.amount_tendered().is_zero());
        assert_eq!(session.balance_due(), cents(1500));
    }

    #[test]
    fn test_stale_remove_keeps_tenders() {
        let catalog = catalog();
        let mut session = TransactionSession::new();
        session.add_unit_item(&catalog, "111", 2).unwrap();
        session.propose_tender(PaymentMethod::Card, cents(500)).unwrap();
        session.confirm_tender(PaymentMethod::Card).unwrap();

        assert!(!session.remove_item("gone").unwrap());
        assert_eq!(session.state(), SessionState::Tendering);
        assert_eq!(session.amount_tendered(), cents(500));
    }

    #[test]
    fn test_cash_change_and_lock_until_line_change() {
        let catalog = catalog();
        let mut session = TransactionSession::new();
        session.add_ad_hoc_item("Hamper", 1, cents(10099)).unwrap();
        session.propose_tender(PaymentMethod::Cash, cents(15000)).unwrap();

        let c = session.confirm_tender(PaymentMethod::Cash).unwrap();
        assert_eq!(c.change_due, cents(4901));
        assert!(session.is_tender_locked());

        session.add_unit_item(&catalog, "111", 1).unwrap();
        assert!(!session.is_tender_locked());
        assert_eq!(session.state(), SessionState::Building);
    }

    #[test]
    fn test_clear_last_tender_returns_to_building() {
        let mut session = TransactionSession::new();
        session.add_ad_hoc_item("Hamper", 1, cents(5000)).unwrap();
        session.propose_tender(PaymentMethod::Voucher, cents(2000)).unwrap();
        session.confirm_tender(PaymentMethod::Voucher).unwrap();

        session.clear_tender(PaymentMethod::Voucher).unwrap();
        assert_eq!(session.state(), SessionState::Building);
    }

    #[test]
    fn test_clearing_voucher_under_cash_lock_lets_sale_finish() {
        let mut session = TransactionSession::new();
        session.add_ad_hoc_item("Hamper", 1, cents(5000)).unwrap();
        session.propose_tender(PaymentMethod::Voucher, cents(2000)).unwrap();
        session.confirm_tender(PaymentMethod::Voucher).unwrap();
        session.propose_tender(PaymentMethod::Cash, cents(4000)).unwrap();
        session.confirm_tender(PaymentMethod::Cash).unwrap();
        assert!(session.is_tender_locked());

        session.clear_tender(PaymentMethod::Voucher).unwrap();
        assert!(!session.is_tender_locked());
        assert_eq!(session.balance_due(), cents(1000));
        assert_eq!(session.state(), SessionState::Tendering);

        session.propose_tender(PaymentMethod::Card, cents(1000)).unwrap();
        session.confirm_tender(PaymentMethod::Card).unwrap();
        assert!(session.prepare_settlement("20260101-01-0001").is_ok());
    }

    #[test]
    fn test_settle_requires_zero_balance() {
        let mut session = TransactionSession::new();
        session.add_ad_hoc_item("Hamper", 1, cents(5000)).unwrap();
        session.propose_tender(PaymentMethod::Card, cents(2000)).unwrap();
        session.confirm_tender(PaymentMethod::Card).unwrap();

        let err = session.prepare_settlement("20260101-01-0001").unwrap_err();
        assert!(matches!(err, CoreError::BalanceOutstanding { balance_due } if balance_due == cents(3000)));
        assert!(matches!(
            session.mark_settled(),
            Err(CoreError::InvalidStateTransition { .. })
        ));
    }

    #[test]
    fn test_settled_session_rejects_mutation() {
        let catalog = catalog();
        let mut session = TransactionSession::new();
        let line = session.add_ad_hoc_item("Hamper", 1, cents(5000)).unwrap();
        session.propose_tender(PaymentMethod::Card, cents(5000)).unwrap();
        session.confirm_tender(PaymentMethod::Card).unwrap();

        let tx = session.prepare_settlement("20260101-01-0001").unwrap();
        assert_eq!(session.state(), SessionState::Tendering);
        session.mark_settled().unwrap();

        assert_eq!(tx.total, cents(5000));
        assert_eq!(tx.session_id, session.id());
        assert!(matches!(
            session.add_unit_item(&catalog, "111", 1),
            Err(CoreError::InvalidStateTransition { state: SessionState::Settled, .. })
        ));
        assert!(session.remove_item(&line.id).is_err());
        assert!(session.propose_tender(PaymentMethod::Cash, cents(1)).is_err());
        assert!(session.cancel().is_err());
    }

    #[test]
    fn test_cancel_only_from_open_states() {
        let mut session = TransactionSession::new();
        assert!(session.cancel().is_err());

        session.add_ad_hoc_item("Hamper", 1, cents(5000)).unwrap();
        session.cancel().unwrap();
        assert_eq!(session.state(), SessionState::Cancelled);
        assert!(session.add_ad_hoc_item("More", 1, cents(1)).is_err());
    }

    #[test]
    fn test_removing_last_line_returns_to_empty() {
        let mut session = TransactionSession::new();
        let line = session.add_ad_hoc_item("Hamper", 1, cents(5000)).unwrap();
        session.remove_item(&line.id).unwrap();
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.is_idle());
    }
}
