//! # Tender Ledger
//!
//! Payment entries per method and the balance derived from them.
//!
//! ## Propose / Confirm
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  propose(card, $20) ──► staged only, balance unchanged                 │
//! │  propose(cash, $50) ──► staged only                                    │
//! │                                                                         │
//! │  confirm(cash) ──► validate $50 against balance due                    │
//! │                    ├── card's staged $20 is cleared                    │
//! │                    ├── cash ≥ balance → change due, tender LOCKED      │
//! │                    └── balance due recomputed                          │
//! │                                                                         │
//! │  Non-cash tenders can never exceed the balance they are applied to.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The ledger does not own the subtotal. Every derivation takes it as an
//! argument so a line change can never leave a stale balance behind.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{PaymentMethod, SettledPayment};
use crate::validation::validate_tender_amount;

// =============================================================================
// Tender Entry
// =============================================================================

/// Derived state of one method's entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TenderState {
    /// An amount is staged but not yet applied.
    Pending,
    /// An amount is applied to the balance.
    Confirmed,
    /// Nothing staged or applied.
    Cleared,
}

/// One payment method's staged and confirmed amounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TenderEntry {
    pub method: PaymentMethod,
    pub staged: Option<Money>,
    pub confirmed: Option<Money>,
}

impl TenderEntry {
    fn new(method: PaymentMethod) -> Self {
        TenderEntry {
            method,
            staged: None,
            confirmed: None,
        }
    }

    /// A staged amount takes precedence: the operator is re-entering.
    pub fn state(&self) -> TenderState {
        match (self.staged, self.confirmed) {
            (Some(_), _) => TenderState::Pending,
            (None, Some(_)) => TenderState::Confirmed,
            (None, None) => TenderState::Cleared,
        }
    }

    fn confirmed_amount(&self) -> Money {
        self.confirmed.unwrap_or_default()
    }
}

/// Result of a successful `confirm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TenderConfirmation {
    pub method: PaymentMethod,
    pub amount: Money,
    pub balance_due: Money,
    pub change_due: Money,
    pub locked: bool,
}

// =============================================================================
// Tender Ledger
// =============================================================================

/// Tender entries for one sale, one per payment method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenderLedger {
    entries: [TenderEntry; 4],
    locked: bool,
}

impl Default for TenderLedger {
    fn default() -> Self {
        TenderLedger {
            entries: PaymentMethod::ALL.map(TenderEntry::new),
            locked: false,
        }
    }
}

/// Position of a method's entry, in `PaymentMethod::ALL` order.
fn slot(method: PaymentMethod) -> usize {
    match method {
        PaymentMethod::Cash => 0,
        PaymentMethod::Card => 1,
        PaymentMethod::Paynow => 2,
        PaymentMethod::Voucher => 3,
    }
}

impl TenderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a ledger from frozen entries (hold resume). Staged amounts
    /// are dropped; only confirmed tenders survive a hold.
    pub fn from_entries(entries: &[TenderEntry], locked: bool) -> Self {
        let mut ledger = Self::default();
        for saved in entries {
            let entry = ledger.entry_mut(saved.method);
            entry.confirmed = saved.confirmed.filter(|m| m.is_positive());
        }
        ledger.locked = locked && ledger.entry(PaymentMethod::Cash).confirmed.is_some();
        ledger
    }

    fn entry(&self, method: PaymentMethod) -> &TenderEntry {
        &self.entries[slot(method)]
    }

    fn entry_mut(&mut self, method: PaymentMethod) -> &mut TenderEntry {
        &mut self.entries[slot(method)]
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn entries(&self) -> &[TenderEntry] {
        &self.entries
    }

    pub fn state_of(&self, method: PaymentMethod) -> TenderState {
        self.entry(method).state()
    }

    /// True once cash has covered the balance. Every tender key is disabled
    /// until the lines change or a cleared tender reopens the balance.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn has_confirmed(&self) -> bool {
        self.entries.iter().any(|e| e.confirmed.is_some())
    }

    /// Sum of confirmed amounts.
    pub fn amount_tendered(&self) -> Money {
        self.entries.iter().map(TenderEntry::confirmed_amount).sum()
    }

    pub fn balance_due(&self, subtotal: Money) -> Money {
        subtotal.saturating_sub_zero(self.amount_tendered())
    }

    pub fn change_due(&self, subtotal: Money) -> Money {
        self.amount_tendered().saturating_sub_zero(subtotal)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Stages an amount for a method. Has no effect on the balance.
    pub fn propose(&mut self, method: PaymentMethod, amount: Money) -> CoreResult<()> {
        if self.locked {
            return Err(CoreError::TenderLocked);
        }
        validate_tender_amount(amount.cents())?;

        self.entry_mut(method).staged = Some(amount);
        Ok(())
    }

    /// Applies the staged amount for `method`.
    ///
    /// The method's own prior confirmation is replaced, so it is excluded
    /// from the balance the new amount is validated against.
    pub fn confirm(&mut self, method: PaymentMethod, subtotal: Money) -> CoreResult<TenderConfirmation> {
        if self.locked {
            return Err(CoreError::TenderLocked);
        }

        let entry = self.entry(method);
        let amount = entry.staged.ok_or(CoreError::NoStagedTender(method))?;
        let others = self.amount_tendered() - entry.confirmed_amount();
        let balance = subtotal - others;

        if !balance.is_positive() {
            return Err(CoreError::NothingDue);
        }

        if !method.allows_change() && amount > balance {
            return Err(CoreError::OverpaymentNotAllowed {
                method,
                amount,
                balance_due: balance,
            });
        }

        for other in self.entries.iter_mut().filter(|e| e.method != method) {
            other.staged = None;
        }

        let entry = self.entry_mut(method);
        entry.staged = None;
        entry.confirmed = Some(amount);

        if method.allows_change() && amount >= balance {
            self.locked = true;
        }

        Ok(TenderConfirmation {
            method,
            amount,
            balance_due: self.balance_due(subtotal),
            change_due: self.change_due(subtotal),
            locked: self.locked,
        })
    }

    /// Zeroes a method's staged and confirmed amounts.
    ///
    /// The lock survives only while confirmed cash still covers `subtotal`;
    /// clearing any method that reopens a balance releases it.
    pub fn clear(&mut self, method: PaymentMethod, subtotal: Money) {
        let entry = self.entry_mut(method);
        entry.staged = None;
        entry.confirmed = None;
        self.locked = self.locked
            && self.entry(PaymentMethod::Cash).confirmed.is_some()
            && self.balance_due(subtotal).is_zero();
    }

    /// Clears every entry and releases the lock.
    pub fn clear_all(&mut self) {
        for entry in &mut self.entries {
            entry.staged = None;
            entry.confirmed = None;
        }
        self.locked = false;
    }

    /// Applied payments for a fully tendered sale. Change is taken from cash,
    /// the only method allowed to exceed its balance.
    pub fn settled_payments(&self, subtotal: Money) -> Vec<SettledPayment> {
        let mut change_left = self.change_due(subtotal);
        self.entries
            .iter()
            .filter_map(|e| e.confirmed.map(|amount| (e.method, amount)))
            .map(|(method, tendered)| {
                let change = if method.allows_change() {
                    let c = change_left.min(tendered);
                    change_left -= c;
                    c
                } else {
                    Money::zero()
                };
                SettledPayment {
                    method,
                    amount: tendered - change,
                    tendered,
                    change,
                }
            })
            .collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
