//! # Tally POS Terminal
//!
//! Headless runtime for one checkout lane.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. Initialize Tracing ──────────────────────────────────────────────►  │
//! │     • tracing-subscriber with env filter, written to stderr             │
//! │     • Default: info, tally=debug; override with RUST_LOG                │
//! │                                                                         │
//! │  2. Open Database ───────────────────────────────────────────────────►  │
//! │     • [database] path, else the platform data dir (tally.db)            │
//! │     • Migrations run on connect                                         │
//! │                                                                         │
//! │  3. Warm the Register ───────────────────────────────────────────────►  │
//! │     • Catalog snapshot from active products                             │
//! │     • Held sessions restored                                            │
//! │     • Receipt numbering continues from today's last sale                │
//! │                                                                         │
//! │  4. Start the Session Inbox ─────────────────────────────────────────►  │
//! │     • Console lines in, events printed out                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod hooks;
pub mod inbox;
pub mod scale;

use std::sync::Arc;

use chrono::Utc;
use tally_core::catalog::CatalogCache;
use tally_core::register::{device_code, Register};
use tally_db::{Database, DbConfig};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub use config::TerminalConfig;
pub use error::{TerminalError, TerminalResult};

use hooks::LoggingHooks;
use inbox::{InboxOptions, SessionInbox, TerminalEvent};
use scale::ChannelScale;

/// Initializes the tracing subscriber for structured logging.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tally=trace` - Show trace for tally crates only
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tally=debug,sqlx=warn"));

    // stdout belongs to the console feed
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs the terminal until the console closes.
pub async fn run(config: TerminalConfig) -> TerminalResult<()> {
    config.validate()?;

    info!(
        device = %config.device.id,
        store = %config.store.name,
        "Starting Tally POS terminal"
    );

    // Database
    let db_path = config.database_path()?;
    let db = Database::new(DbConfig::new(&db_path)).await?;

    // Register
    let products = db.products().load_catalog().await?;
    info!(products = products.len(), "Catalog loaded");
    let catalog = Arc::new(CatalogCache::new(products));

    let mut register = Register::new(config.register_settings(), db.clone(), catalog);

    let held = db.holds().list().await?;
    let restored = register.restore_holds(held);
    if restored > 0 {
        info!(restored, "Held sessions restored");
    }

    let today = Utc::now().date_naive();
    let last = db
        .sales()
        .last_receipt_sequence(today, &device_code(&config.device.id))
        .await?;
    register.resume_receipt_sequence(today, last);

    // Inbox
    let (scale, feed) = ChannelScale::new();
    let options = InboxOptions {
        scale_timeout: config.scale.timeout(),
        auto_settle: config.tender.auto_settle,
    };
    let (inbox, events, task) =
        SessionInbox::spawn(register, LoggingHooks, Arc::new(scale), options);

    let printer = tokio::spawn(print_events(events));

    println!("{} ready. Type 'help' for commands.", config.store.name);
    let fed = console::drive(BufReader::new(tokio::io::stdin()), &inbox, &feed, &db).await;

    // Drain what is queued, then stop
    if inbox.shutdown().await.is_err() {
        warn!("Session inbox already stopped");
    }
    drop(inbox);
    if let Err(e) = task.await {
        warn!(error = %e, "Session inbox task failed");
    }
    let _ = printer.await;

    db.close().await;
    info!("Terminal stopped");

    fed
}

/// Prints inbox events. Totals are printed only when they change.
async fn print_events(mut events: mpsc::UnboundedReceiver<TerminalEvent>) {
    let mut last_totals = None;

    while let Some(event) = events.recv().await {
        if let TerminalEvent::Totals(totals) = &event {
            if last_totals == Some(*totals) {
                continue;
            }
            last_totals = Some(*totals);
        }
        println!("{}", console::describe(&event));
    }
}
