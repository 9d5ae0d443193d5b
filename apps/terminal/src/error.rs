//! # Terminal Error Type
//!
//! Everything that can stop the terminal from starting or keep a command
//! from reaching the register.
//!
//! ```text
//!  CoreError ──┐
//!  DbError ────┼──► TerminalError ──► main() logs and exits non-zero
//!  toml / io ──┤
//!  inbox gone ─┘
//! ```
//!
//! Rejections of individual operator actions (a bad barcode, an overpayment)
//! are not `TerminalError`s: the inbox reports them as events and carries on.

use tally_core::CoreError;
use tally_db::DbError;
use thiserror::Error;

/// Result type alias for terminal operations.
pub type TerminalResult<T> = Result<T, TerminalError>;

#[derive(Debug, Error)]
pub enum TerminalError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid terminal configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// No platform data directory and no `[database] path` configured.
    #[error("Could not determine a data directory for the database")]
    NoDataDir,

    // =========================================================================
    // Engine / Storage
    // =========================================================================
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Runtime
    // =========================================================================
    /// The session inbox task has stopped.
    #[error("Session inbox is closed")]
    InboxClosed,
}
