//! # Engine Errors
//!
//! Every failed operation leaves the session as it was and reports one of
//! four kinds.
//!
//! ## Kinds
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Kinds                                     │
//! │                                                                         │
//! │  Validation       bad quantity / price / name / weight / tender amount │
//! │                   → reported to the operator for correction            │
//! │                                                                         │
//! │  State            operation invalid in the current session state       │
//! │                   → recoverable by surfacing the current state         │
//! │                                                                         │
//! │  HardwareTimeout  scale did not settle within the window               │
//! │                   → terminal failure of that single operation          │
//! │                                                                         │
//! │  Persistence      settlement commit failed (fatal to that settlement)  │
//! │                   stock write failed (warning, sale stands)            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → TerminalError → operator display  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::money::Money;
use crate::types::{PaymentMethod, SessionState};

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse category of a [`CoreError`], used by callers to pick a recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    State,
    HardwareTimeout,
    Persistence,
}

// =============================================================================
// Core Error
// =============================================================================

/// Sales engine errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No catalog entry matches the scanned barcode or product id.
    ///
    /// The "not found" dialog collaborator may then offer ad-hoc creation.
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// A unit-sold product was entered through the weight path.
    #[error("Product {barcode} is not sold by weight")]
    NotSoldByWeight { barcode: String },

    /// A weight-sold product was entered through the unit path.
    #[error("Product {barcode} is sold by weight and must be weighed")]
    NotSoldByUnit { barcode: String },

    /// Weight must be positive and no more than `MAX_WEIGHT_GRAMS`.
    #[error("Invalid weight: {grams} g")]
    InvalidWeight { grams: i64 },

    /// The requested quantity change would leave a line below one unit,
    /// or targets a weighed line.
    #[error("Invalid quantity for line {line_id}: {reason}")]
    InvalidQuantity { line_id: String, reason: String },

    /// Item quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Sale has exceeded maximum allowed lines.
    #[error("Sale cannot have more than {max} lines")]
    CartTooLarge { max: usize },

    /// No line with this id exists in the current sale.
    #[error("Line not found: {0}")]
    LineNotFound(String),

    /// Only cash may be tendered above the balance due.
    #[error("{method} cannot overpay: {amount} tendered against {balance_due} due")]
    OverpaymentNotAllowed {
        method: PaymentMethod,
        amount: Money,
        balance_due: Money,
    },

    /// Confirm was pressed for a method with nothing staged.
    #[error("No amount staged for {0}")]
    NoStagedTender(PaymentMethod),

    /// Operation is not valid in the session's current state.
    ///
    /// ## When This Occurs
    /// - Adding items to a settled sale
    /// - Holding an empty session
    /// - Confirming a tender before any item exists
    #[error("Cannot {operation} while session is {state:?}")]
    InvalidStateTransition {
        operation: &'static str,
        state: SessionState,
    },

    /// Cash covered the sale; every tender key is disabled until the line
    /// item set changes or cash is cleared.
    #[error("Tender entry is locked after cash settled the balance")]
    TenderLocked,

    /// Nothing is left to pay.
    #[error("Balance is already fully tendered")]
    NothingDue,

    /// Settlement requires the balance due to be zero.
    #[error("Cannot settle with {balance_due} still due")]
    BalanceOutstanding { balance_due: Money },

    #[error("Cannot hold a session without line items")]
    CannotHoldEmptySession,

    /// Hold id is unknown or was already resumed/discarded.
    #[error("Hold not found: {0}")]
    HoldNotFound(String),

    #[error("Refund mode is not armed")]
    RefundNotArmed,

    /// A weight reading arrived with no weigh request open.
    #[error("No weigh request is pending")]
    NoPendingWeigh,

    /// Resume requires an idle terminal.
    #[error("Session {session_id} still has items; hold or cancel it first")]
    SessionInProgress { session_id: String },

    /// Scale produced no stable reading within the configured window.
    #[error("Scale did not settle within {timeout_ms} ms")]
    ScaleTimeout { timeout_ms: u64 },

    /// A persistence sink call failed.
    ///
    /// For `commit` this is fatal to the settlement: the sale is NOT reported
    /// as settled and the operator may retry.
    #[error("Persistence failed during {operation}: {message}")]
    Persistence {
        operation: &'static str,
        message: String,
    },

    /// Stock write failed after the sale was committed. Non-fatal.
    #[error("Stock adjustment for receipt {receipt_number} was not persisted: {message}")]
    StockPersistenceFailed {
        receipt_number: String,
        message: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Returns the taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::ProductNotFound(_)
            | CoreError::NotSoldByWeight { .. }
            | CoreError::NotSoldByUnit { .. }
            | CoreError::InvalidWeight { .. }
            | CoreError::InvalidQuantity { .. }
            | CoreError::QuantityTooLarge { .. }
            | CoreError::CartTooLarge { .. }
            | CoreError::LineNotFound(_)
            | CoreError::OverpaymentNotAllowed { .. }
            | CoreError::NoStagedTender(_)
            | CoreError::Validation(_) => ErrorKind::Validation,

            CoreError::InvalidStateTransition { .. }
            | CoreError::TenderLocked
            | CoreError::NothingDue
            | CoreError::BalanceOutstanding { .. }
            | CoreError::CannotHoldEmptySession
            | CoreError::HoldNotFound(_)
            | CoreError::RefundNotArmed
            | CoreError::NoPendingWeigh
            | CoreError::SessionInProgress { .. } => ErrorKind::State,

            CoreError::ScaleTimeout { .. } => ErrorKind::HardwareTimeout,

            CoreError::Persistence { .. } | CoreError::StockPersistenceFailed { .. } => {
                ErrorKind::Persistence
            }
        }
    }

    /// Only a failed settlement commit is fatal to the operation it belongs to.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::Persistence {
                operation: "commit",
                ..
            }
        )
    }

    pub(crate) fn invalid_state(operation: &'static str, state: SessionState) -> Self {
        CoreError::InvalidStateTransition { operation, state }
    }

    pub(crate) fn persistence(operation: &'static str, err: impl std::fmt::Display) -> Self {
        CoreError::Persistence {
            operation,
            message: err.to_string(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when operator input doesn't meet requirements.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid barcode characters, unparsable amount).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
