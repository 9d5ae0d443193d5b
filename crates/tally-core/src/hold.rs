//! # Hold Store
//!
//! Registry of suspended sessions ("hold" / "view holds").
//!
//! ## Hold and Resume
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  active session ──hold──► HoldRecord H-0007 ──► Mutex<registry>         │
//! │        │                                              │                 │
//! │        └── replaced by a fresh Empty session          │                 │
//! │                                                       │                 │
//! │  list_holds() ──► HoldListing (oldest first) ◄────────┤                 │
//! │                                                       │                 │
//! │  resume("H-0007") ──► removed from registry ──► TransactionSession      │
//! │                       (same session id, lines, confirmed tenders)       │
//! │                                                                         │
//! │  Two racing resumes of one hold: exactly one gets the session,          │
//! │  the other gets HoldNotFound.                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Hold ids use the `H-NNNN` form so they can never be mistaken for a
//! receipt number (`YYYYMMDD-DD-NNNN`).

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::session::TransactionSession;
use crate::tender::TenderEntry;
use crate::types::{LineItem, SessionState};

/// Prefix of every hold id.
pub const HOLD_ID_PREFIX: &str = "H-";

// =============================================================================
// Records
// =============================================================================

/// A frozen, suspended session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HoldRecord {
    pub hold_id: String,
    pub session_id: String,
    #[ts(as = "String")]
    pub session_created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub captured_at: DateTime<Utc>,
    pub lines: Vec<LineItem>,
    pub tenders: Vec<TenderEntry>,
    pub tender_locked: bool,
    /// State the session returns to on resume.
    pub resume_state: SessionState,
}

impl HoldRecord {
    pub fn subtotal(&self) -> Money {
        self.lines.iter().map(LineItem::line_total).sum()
    }

    pub fn amount_tendered(&self) -> Money {
        self.tenders.iter().filter_map(|t| t.confirmed).sum()
    }

    pub fn summary(&self) -> HoldSummary {
        HoldSummary {
            hold_id: self.hold_id.clone(),
            session_id: self.session_id.clone(),
            captured_at: self.captured_at,
            line_count: self.lines.len(),
            subtotal: self.subtotal(),
            amount_tendered: self.amount_tendered(),
        }
    }

    /// The suspended session, with its original id.
    pub fn into_session(self) -> TransactionSession {
        TransactionSession::rehydrate(
            self.session_id,
            self.session_created_at,
            self.lines,
            &self.tenders,
            self.tender_locked,
        )
    }
}

/// One row of the "view holds" list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct HoldSummary {
    pub hold_id: String,
    pub session_id: String,
    #[ts(as = "String")]
    pub captured_at: DateTime<Utc>,
    pub line_count: usize,
    pub subtotal: Money,
    pub amount_tendered: Money,
}

/// Order of the hold listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// A finite listing of holds. Iterating it again starts over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoldListing {
    summaries: Vec<HoldSummary>,
}

impl HoldListing {
    pub fn iter(&self) -> std::slice::Iter<'_, HoldSummary> {
        self.summaries.iter()
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    pub fn into_vec(self) -> Vec<HoldSummary> {
        self.summaries
    }
}

impl<'a> IntoIterator for &'a HoldListing {
    type Item = &'a HoldSummary;
    type IntoIter = std::slice::Iter<'a, HoldSummary>;

    fn into_iter(self) -> Self::IntoIter {
        self.summaries.iter()
    }
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Default)]
struct Registry {
    records: BTreeMap<String, HoldRecord>,
    next_seq: u32,
}

impl Registry {
    /// Id the next admitted hold gets. Only admitting a record consumes it,
    /// so a capture that is never admitted leaves no gap.
    fn next_id(&self) -> String {
        format!("{}{:04}", HOLD_ID_PREFIX, self.next_seq + 1)
    }

    fn insert(&mut self, record: HoldRecord) {
        if let Some(seq) = parse_hold_seq(&record.hold_id) {
            self.next_seq = self.next_seq.max(seq);
        }
        self.records.insert(record.hold_id.clone(), record);
    }

    fn take(&mut self, hold_id: &str) -> CoreResult<HoldRecord> {
        self.records
            .remove(hold_id)
            .ok_or_else(|| CoreError::HoldNotFound(hold_id.to_string()))
    }
}

/// Registry of suspended sessions. All operations are exclusive.
#[derive(Debug, Default)]
pub struct HoldStore {
    inner: Mutex<Registry>,
    order: HoldOrder,
}

impl HoldStore {
    pub fn new(order: HoldOrder) -> Self {
        HoldStore {
            inner: Mutex::new(Registry::default()),
            order,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn contains(&self, hold_id: &str) -> bool {
        self.lock().records.contains_key(hold_id)
    }

    /// Suspends `session` and replaces it with a fresh `Empty` session.
    pub fn hold(&self, session: &mut TransactionSession) -> CoreResult<String> {
        let mut registry = self.lock();
        let record = snapshot(&registry, session)?;
        let hold_id = record.hold_id.clone();
        registry.insert(record);
        drop(registry);

        session.mark_held();
        info!(hold_id = %hold_id, session_id = %session.id(), "Session held");
        *session = TransactionSession::new();
        Ok(hold_id)
    }

    /// First half of a durable hold: freezes the session into a record with
    /// the next id, without storing it or touching the session. The id is
    /// only reserved by `admit`, so capture and admit must not interleave
    /// with another hold.
    pub fn capture(&self, session: &TransactionSession) -> CoreResult<HoldRecord> {
        snapshot(&self.lock(), session)
    }

    /// Second half of a durable hold, once the record is persisted.
    pub fn admit(&self, record: HoldRecord, session: &mut TransactionSession) {
        let hold_id = record.hold_id.clone();
        self.lock().insert(record);
        session.mark_held();
        info!(hold_id = %hold_id, session_id = %session.id(), "Session held");
        *session = TransactionSession::new();
    }

    /// Summaries ordered by capture time.
    pub fn list_holds(&self) -> HoldListing {
        let mut summaries: Vec<HoldSummary> =
            self.lock().records.values().map(HoldRecord::summary).collect();

        summaries.sort_by(|a, b| {
            a.captured_at
                .cmp(&b.captured_at)
                .then_with(|| a.hold_id.cmp(&b.hold_id))
        });
        if self.order == HoldOrder::NewestFirst {
            summaries.reverse();
        }

        HoldListing { summaries }
    }

    /// Removes a hold and returns its session, with the original session id.
    pub fn resume(&self, hold_id: &str) -> CoreResult<TransactionSession> {
        let record = self.take(hold_id)?;

        info!(hold_id = %hold_id, session_id = %record.session_id, "Hold resumed");
        Ok(record.into_session())
    }

    /// Drops a hold without resuming it.
    pub fn discard(&self, hold_id: &str) -> CoreResult<HoldRecord> {
        let record = self.take(hold_id)?;

        info!(hold_id = %hold_id, lines = record.lines.len(), "Hold discarded");
        Ok(record)
    }

    /// Removes a hold without deciding its fate. Of two racing takes of one
    /// id, exactly one gets the record.
    pub fn take(&self, hold_id: &str) -> CoreResult<HoldRecord> {
        self.lock().take(hold_id)
    }

    /// Puts back a record taken with `take` whose release could not be made
    /// durable.
    pub fn reinstate(&self, record: HoldRecord) {
        debug!(hold_id = %record.hold_id, "Hold reinstated");
        self.lock().insert(record);
    }

    /// Re-admits durable holds at start-up. Later ids continue after the
    /// highest restored sequence.
    pub fn restore(&self, records: impl IntoIterator<Item = HoldRecord>) -> usize {
        let mut registry = self.lock();
        let mut restored = 0;
        for record in records {
            registry.insert(record);
            restored += 1;
        }
        debug!(restored, "Holds restored");
        restored
    }
}

fn snapshot(registry: &Registry, session: &TransactionSession) -> CoreResult<HoldRecord> {
    let state = session.state();
    if state.is_terminal() {
        return Err(CoreError::invalid_state("hold", state));
    }
    if session.lines().is_empty() {
        return Err(CoreError::CannotHoldEmptySession);
    }

    Ok(HoldRecord {
        hold_id: registry.next_id(),
        session_id: session.id().to_string(),
        session_created_at: session.created_at(),
        captured_at: Utc::now(),
        lines: session.lines().to_vec(),
        tenders: session
            .tenders()
            .iter()
            .filter(|t| t.confirmed.is_some())
            .map(|t| TenderEntry {
                method: t.method,
                staged: None,
                confirmed: t.confirmed,
            })
            .collect(),
        tender_locked: session.is_tender_locked(),
        resume_state: state,
    })
}

fn parse_hold_seq(hold_id: &str) -> Option<u32> {
    hold_id.strip_prefix(HOLD_ID_PREFIX)?.parse().ok()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentMethod;
    use std::sync::Arc;
    use std::thread;

    fn building_session(name: &str, cents: i64) -> TransactionSession {
        let mut session = TransactionSession::new();
        session
            .add_ad_hoc_item(name, 1, Money::from_cents(cents))
            .unwrap();
        session
    }

    #[test]
    fn test_hold_resets_session_and_resume_restores_it() {
        let store = HoldStore::new(HoldOrder::OldestFirst);
        let mut session = building_session("Hamper", 5000);
        session
            .propose_tender(PaymentMethod::Voucher, Money::from_cents(2000))
            .unwrap();
        session.confirm_tender(PaymentMethod::Voucher).unwrap();
        let original_id = session.id().to_string();
        let original_lines = session.lines().to_vec();

        let hold_id = store.hold(&mut session).unwrap();
        assert_eq!(hold_id, "H-0001");
        assert_eq!(session.state(), SessionState::Empty);
        assert_ne!(session.id(), original_id);

        let resumed = store.resume(&hold_id).unwrap();
        assert_eq!(resumed.id(), original_id);
        assert_eq!(resumed.lines(), original_lines.as_slice());
        assert_eq!(resumed.state(), SessionState::Tendering);
        assert_eq!(resumed.balance_due(), Money::from_cents(3000));

        assert!(matches!(
            store.resume(&hold_id),
            Err(CoreError::HoldNotFound(id)) if id == "H-0001"
        ));
    }

    #[test]
    fn test_cannot_hold_empty_or_terminal() {
        let store = HoldStore::default();
        let mut empty = TransactionSession::new();
        assert!(matches!(
            store.hold(&mut empty),
            Err(CoreError::CannotHoldEmptySession)
        ));

        let mut cancelled = building_session("Hamper", 100);
        cancelled.cancel().unwrap();
        assert!(matches!(
            store.hold(&mut cancelled),
            Err(CoreError::InvalidStateTransition { .. })
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_listing_order_and_restart() {
        let store = HoldStore::new(HoldOrder::NewestFirst);
        let mut a = building_session("A", 100);
        let mut b = building_session("B", 200);
        store.hold(&mut a).unwrap();
        store.hold(&mut b).unwrap();

        let listing = store.list_holds();
        let first: Vec<&str> = listing.iter().map(|s| s.hold_id.as_str()).collect();
        let again: Vec<&str> = (&listing).into_iter().map(|s| s.hold_id.as_str()).collect();
        assert_eq!(first, vec!["H-0002", "H-0001"]);
        assert_eq!(first, again);
    }

    #[test]
    fn test_restore_continues_sequence() {
        let source = HoldStore::default();
        let mut session = building_session("A", 100);
        let record = source.capture(&session).unwrap();
        source.admit(record.clone(), &mut session);

        let store = HoldStore::default();
        let mut renamed = record;
        renamed.hold_id = "H-0041".into();
        assert_eq!(store.restore(vec![renamed]), 1);

        let mut next = building_session("B", 100);
        assert_eq!(store.hold(&mut next).unwrap(), "H-0042");
    }

    #[test]
    fn test_discard() {
        let store = HoldStore::default();
        let mut session = building_session("A", 100);
        let hold_id = store.hold(&mut session).unwrap();

        assert_eq!(store.discard(&hold_id).unwrap().lines.len(), 1);
        assert!(store.discard(&hold_id).is_err());
    }

    #[test]
    fn test_unadmitted_capture_leaves_no_gap() {
        let store = HoldStore::default();
        let mut session = building_session("A", 100);

        // The write behind this capture failed
        let abandoned = store.capture(&session).unwrap();
        assert_eq!(abandoned.hold_id, "H-0001");

        let record = store.capture(&session).unwrap();
        assert_eq!(record.hold_id, "H-0001");
        store.admit(record, &mut session);

        let mut next = building_session("B", 100);
        assert_eq!(store.hold(&mut next).unwrap(), "H-0002");
    }

    #[test]
    fn test_reinstated_hold_can_be_taken_again() {
        let store = HoldStore::default();
        let mut session = building_session("A", 100);
        let hold_id = store.hold(&mut session).unwrap();

        let record = store.take(&hold_id).unwrap();
        assert!(!store.contains(&hold_id));
        store.reinstate(record);

        assert_eq!(store.list_holds().len(), 1);
        assert_eq!(store.resume(&hold_id).unwrap().lines().len(), 1);
    }

    #[test]
    fn test_racing_resumes_have_one_winner() {
        let store = Arc::new(HoldStore::default());
        let mut session = building_session("A", 100);
        let hold_id = store.hold(&mut session).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                let hold_id = hold_id.clone();
                thread::spawn(move || store.resume(&hold_id).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
