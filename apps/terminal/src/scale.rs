//! # Weighing Scale
//!
//! A weigh request waits for one stable reading, bounded by the configured
//! window and abortable by the operator.
//!
//! ```text
//!  scan weight-sold product
//!        │
//!        ▼
//!  inbox spawns read_with_timeout ──┬── reading ──► Command::Scale(Reading)
//!                                   ├── window elapsed ──► TimedOut
//!                                   ├── cancel (watch) ──► Cancelled
//!                                   └── driver error ──► Failed
//! ```
//!
//! The outcome is posted back into the session inbox, so it is applied in
//! order with everything else the cashier does.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScaleError {
    #[error("Scale disconnected")]
    Disconnected,

    #[error("Scale fault: {0}")]
    Fault(String),
}

/// A scale that reports stable weights in grams.
pub trait Scale: Send + Sync + 'static {
    /// Waits for the next stable reading.
    fn read_stable(&self) -> impl Future<Output = Result<i64, ScaleError>> + Send;

    /// Drops readings taken before the current weigh request.
    fn reset(&self) {}
}

/// How a weigh request ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScaleOutcome {
    Reading(i64),
    TimedOut,
    Cancelled,
    Failed(ScaleError),
}

/// Reads one stable weight within `window`.
///
/// Resolves to `Cancelled` as soon as `cancel` changes or its sender is
/// dropped; the in-flight read is abandoned.
pub async fn read_with_timeout<C: Scale>(
    scale: &C,
    window: Duration,
    mut cancel: watch::Receiver<bool>,
) -> ScaleOutcome {
    tokio::select! {
        result = tokio::time::timeout(window, scale.read_stable()) => match result {
            Ok(Ok(grams)) => ScaleOutcome::Reading(grams),
            Ok(Err(e)) => ScaleOutcome::Failed(e),
            Err(_) => ScaleOutcome::TimedOut,
        },
        _ = cancel.changed() => {
            debug!("Weigh request cancelled");
            ScaleOutcome::Cancelled
        }
    }
}

// =============================================================================
// Channel-fed scale
// =============================================================================

/// A scale fed through a channel: the console's `weigh <grams>` command, or
/// a serial driver task that decodes frames elsewhere.
#[derive(Debug)]
pub struct ChannelScale {
    readings: Mutex<mpsc::UnboundedReceiver<i64>>,
}

/// Sending half of a [`ChannelScale`].
#[derive(Debug, Clone)]
pub struct ScaleFeed {
    tx: mpsc::UnboundedSender<i64>,
}

impl ScaleFeed {
    /// Publishes a stable reading. Returns false once the scale is gone.
    pub fn publish(&self, grams: i64) -> bool {
        self.tx.send(grams).is_ok()
    }
}

impl ChannelScale {
    pub fn new() -> (ChannelScale, ScaleFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            ChannelScale {
                readings: Mutex::new(rx),
            },
            ScaleFeed { tx },
        )
    }
}

impl Scale for ChannelScale {
    async fn read_stable(&self) -> Result<i64, ScaleError> {
        let mut readings = self.readings.lock().await;
        readings.recv().await.ok_or(ScaleError::Disconnected)
    }

    fn reset(&self) {
        // Skipped while a read still holds the receiver
        if let Ok(mut readings) = self.readings.try_lock() {
            let mut dropped = 0;
            while readings.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!(dropped, "Discarded stale scale readings");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reading_within_window() {
        let (scale, feed) = ChannelScale::new();
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        assert!(feed.publish(750));
        let outcome = read_with_timeout(&scale, Duration::from_secs(1), cancel_rx).await;
        assert_eq!(outcome, ScaleOutcome::Reading(750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reading_times_out() {
        let (scale, _feed) = ChannelScale::new();
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let outcome = read_with_timeout(&scale, Duration::from_millis(500), cancel_rx).await;
        assert_eq!(outcome, ScaleOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_aborts_read() {
        let (scale, _feed) = ChannelScale::new();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let read = tokio::spawn(async move {
            read_with_timeout(&scale, Duration::from_secs(60), cancel_rx).await
        });
        tokio::task::yield_now().await;
        cancel_tx.send(true).unwrap();

        assert_eq!(read.await.unwrap(), ScaleOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_reset_discards_early_readings() {
        let (scale, feed) = ChannelScale::new();
        feed.publish(120);
        feed.publish(340);
        scale.reset();

        feed.publish(900);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let outcome = read_with_timeout(&scale, Duration::from_secs(1), cancel_rx).await;
        assert_eq!(outcome, ScaleOutcome::Reading(900));
    }

    #[tokio::test]
    async fn test_dropped_feed_is_a_failure() {
        let (scale, feed) = ChannelScale::new();
        drop(feed);
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let outcome = read_with_timeout(&scale, Duration::from_secs(1), cancel_rx).await;
        assert_eq!(outcome, ScaleOutcome::Failed(ScaleError::Disconnected));
    }
}
