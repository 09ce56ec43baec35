use std::time::Duration;

use thiserror::Error;

use crate::models::Money;

/// Errors that can occur while driving the ledger from a command file
/// These are system-level errors (I/O, parsing), not business rule violations
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Business rule violations and processing failures of the ledger core
///
/// Every variant maps to a stable code (see [`LedgerError::code`]) so callers
/// can react to the kind without parsing the message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("malformed participant identifier: {0:?}")]
    MalformedParticipant(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("account already exists: {0}")]
    DuplicateAccount(String),

    #[error("account is not active: {0}")]
    AccountInactive(String),

    #[error("insufficient funds in {account}: needed {needed}, available {available}")]
    InsufficientFunds {
        account: String,
        needed: Money,
        available: Money,
    },

    #[error("cannot transfer from an account to itself: {0}")]
    SameAccount(String),

    #[error("payment already submitted: {0}")]
    DuplicateSubmission(String),

    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("timed out after {0:?} waiting for the ledger lock")]
    Timeout(Duration),

    #[error("transfer rolled back: {0}")]
    TransferRolledBack(Box<LedgerError>),

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),
}

impl LedgerError {
    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::MalformedParticipant(_) => "MALFORMED_PARTICIPANT",
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::DuplicateAccount(_) => "DUPLICATE_ACCOUNT",
            LedgerError::AccountInactive(_) => "ACCOUNT_INACTIVE",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::SameAccount(_) => "SAME_ACCOUNT",
            LedgerError::DuplicateSubmission(_) => "DUPLICATE_SUBMISSION",
            LedgerError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            LedgerError::Timeout(_) => "TIMEOUT",
            LedgerError::TransferRolledBack(_) => "TRANSFER_ROLLED_BACK",
            LedgerError::InternalInvariantViolation(_) => "INTERNAL_INVARIANT_VIOLATION",
        }
    }

    /// The underlying error, unwrapping any rollback markers
    pub fn root_cause(&self) -> &LedgerError {
        match self {
            LedgerError::TransferRolledBack(cause) => cause.root_cause(),
            other => other,
        }
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Failures reported by a [`LedgerStore`](crate::store::LedgerStore) backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Unavailable(String),
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        LedgerError::StoreUnavailable(err.to_string())
    }
}

/// Invalid configuration values
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}
