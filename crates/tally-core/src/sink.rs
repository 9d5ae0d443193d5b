//! # Persistence Sink
//!
//! The contract through which the engine reaches durable storage.
//!
//! ```text
//! ┌──────────────┐   commit / adjust_stock / record_hold   ┌───────────────┐
//! │   Register   │ ──────────────────────────────────────► │ PersistenceSink│
//! │  (tally-core)│   release_hold / record_refund          └──────┬────────┘
//! └──────────────┘                                                │
//!                                           ┌─────────────────────┴───────┐
//!                                           │                             │
//!                                  tally_db::Database              MemorySink
//!                                  (SQLite, production)     (tests, failure injection)
//! ```
//!
//! All methods are async and fallible. The engine never assumes a write
//! succeeded: a failed commit leaves the sale unsettled, a failed stock write
//! is compensated.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use crate::hold::HoldRecord;
use crate::types::{RefundRecord, SettledTransaction};

// =============================================================================
// Contract
// =============================================================================

/// Error reported by a sink implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SinkError {
    message: String,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        SinkError {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Durable storage for settled sales, stock, holds and refunds.
pub trait PersistenceSink: Send + Sync {
    /// Stores a settled transaction atomically (header, lines, payments).
    fn commit(
        &self,
        transaction: &SettledTransaction,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Applies a signed stock delta (units or grams) to one product.
    fn adjust_stock(
        &self,
        product_id: &str,
        delta: i64,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;

    fn record_hold(&self, record: &HoldRecord) -> impl Future<Output = Result<(), SinkError>> + Send;

    /// Drops a durable hold after resume or discard.
    fn release_hold(&self, hold_id: &str) -> impl Future<Output = Result<(), SinkError>> + Send;

    fn record_refund(
        &self,
        refund: &RefundRecord,
    ) -> impl Future<Output = Result<(), SinkError>> + Send;
}

// =============================================================================
// In-Memory Sink
// =============================================================================

#[derive(Debug, Default)]
struct MemoryState {
    transactions: Vec<SettledTransaction>,
    stock_writes: Vec<(String, i64)>,
    holds: BTreeMap<String, HoldRecord>,
    refunds: Vec<RefundRecord>,

    fail_commit: bool,
    fail_stock_after: Option<usize>,
    fail_holds: bool,
    fail_refunds: bool,
    stock_calls: usize,
}

/// In-memory sink with failure injection.
///
/// ```rust
/// use tally_core::sink::MemorySink;
///
/// let sink = MemorySink::new();
/// sink.fail_stock_after(Some(1)); // first stock write succeeds, second fails
/// assert!(sink.transactions().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct MemorySink {
    state: Mutex<MemoryState>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -------------------------------------------------------------------------
    // Failure injection
    // -------------------------------------------------------------------------

    pub fn fail_commits(&self, fail: bool) {
        self.lock().fail_commit = fail;
    }

    /// Lets `n` further stock writes succeed and fails the next one. Writes
    /// after the failed one (compensations) succeed again. `None` disables
    /// the failure.
    pub fn fail_stock_after(&self, n: Option<usize>) {
        let mut state = self.lock();
        state.fail_stock_after = n;
        state.stock_calls = 0;
    }

    pub fn fail_holds(&self, fail: bool) {
        self.lock().fail_holds = fail;
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.lock().fail_refunds = fail;
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn transactions(&self) -> Vec<SettledTransaction> {
        self.lock().transactions.clone()
    }

    /// Every successful stock write, in order (compensations included).
    pub fn stock_writes(&self) -> Vec<(String, i64)> {
        self.lock().stock_writes.clone()
    }

    /// Net persisted stock change per product.
    pub fn net_stock(&self) -> HashMap<String, i64> {
        let mut net = HashMap::new();
        for (product_id, delta) in &self.lock().stock_writes {
            *net.entry(product_id.clone()).or_insert(0) += delta;
        }
        net
    }

    pub fn holds(&self) -> Vec<HoldRecord> {
        self.lock().holds.values().cloned().collect()
    }

    pub fn refunds(&self) -> Vec<RefundRecord> {
        self.lock().refunds.clone()
    }
}

impl PersistenceSink for MemorySink {
    async fn commit(&self, transaction: &SettledTransaction) -> Result<(), SinkError> {
        let mut state = self.lock();
        if state.fail_commit {
            return Err(SinkError::new("injected commit failure"));
        }
        if state
            .transactions
            .iter()
            .any(|t| t.receipt_number == transaction.receipt_number)
        {
            return Err(SinkError::new(format!(
                "duplicate receipt number {}",
                transaction.receipt_number
            )));
        }
        state.transactions.push(transaction.clone());
        Ok(())
    }

    async fn adjust_stock(&self, product_id: &str, delta: i64) -> Result<(), SinkError> {
        let mut state = self.lock();
        let call = state.stock_calls;
        state.stock_calls += 1;
        if state.fail_stock_after == Some(call) {
            return Err(SinkError::new(format!(
                "injected stock failure for {}",
                product_id
            )));
        }
        state.stock_writes.push((product_id.to_string(), delta));
        Ok(())
    }

    async fn record_hold(&self, record: &HoldRecord) -> Result<(), SinkError> {
        let mut state = self.lock();
        if state.fail_holds {
            return Err(SinkError::new("injected hold failure"));
        }
        state.holds.insert(record.hold_id.clone(), record.clone());
        Ok(())
    }

    async fn release_hold(&self, hold_id: &str) -> Result<(), SinkError> {
        let mut state = self.lock();
        if state.fail_holds {
            return Err(SinkError::new("injected hold failure"));
        }
        state.holds.remove(hold_id);
        Ok(())
    }

    async fn record_refund(&self, refund: &RefundRecord) -> Result<(), SinkError> {
        let mut state = self.lock();
        if state.fail_refunds {
            return Err(SinkError::new("injected refund failure"));
        }
        state.refunds.push(refund.clone());
        Ok(())
    }
}
