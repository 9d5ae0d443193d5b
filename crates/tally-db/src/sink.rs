//! # SQLite Persistence Sink
//!
//! Wires [`Database`] into the engine's `PersistenceSink` contract. Every
//! method delegates to one repository call; repository errors cross the
//! boundary as `SinkError` with their message intact.

use tally_core::hold::HoldRecord;
use tally_core::sink::{PersistenceSink, SinkError};
use tally_core::{RefundRecord, SettledTransaction};

use crate::pool::Database;

impl PersistenceSink for Database {
    async fn commit(&self, transaction: &SettledTransaction) -> Result<(), SinkError> {
        self.sales()
            .insert_settled(transaction)
            .await
            .map_err(SinkError::from)
    }

    async fn adjust_stock(&self, product_id: &str, delta: i64) -> Result<(), SinkError> {
        self.products()
            .update_stock(product_id, delta)
            .await
            .map_err(SinkError::from)
    }

    async fn record_hold(&self, record: &HoldRecord) -> Result<(), SinkError> {
        self.holds().record(record).await.map_err(SinkError::from)
    }

    /// A missing row is an error: another register already claimed the hold.
    async fn release_hold(&self, hold_id: &str) -> Result<(), SinkError> {
        self.holds().release(hold_id).await.map_err(SinkError::from)
    }

    async fn record_refund(&self, refund: &RefundRecord) -> Result<(), SinkError> {
        self.refunds().insert(refund).await.map_err(SinkError::from)
    }
}
