//! Typed errors for the record lifecycle core.
//!
//! Each layer returns its own error type so callers can tell user-correctable
//! input problems (validation, transitions) apart from system faults
//! (storage, sequence exhaustion). [`ServiceError`] wraps them for the
//! orchestration layer.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::ids::IdKind;
use crate::models::RecordKind;

/// Errors raised while minting, parsing or decoding record identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    /// The per-day capacity of the scheme is exhausted. Nothing was allocated.
    #[error("sequence overflow for {kind} IDs on {day}: capacity of {capacity} per day exhausted")]
    SequenceOverflow {
        kind: IdKind,
        day: NaiveDate,
        capacity: u32,
    },

    #[error("date {0} cannot be encoded; only years 2000-2099 are supported")]
    DateOutOfRange(NaiveDate),

    #[error("date code {0:05} does not decode to a calendar date")]
    InvalidDateCode(u32),

    #[error("source tag '{0}' must be a single uppercase ASCII letter")]
    InvalidSourceTag(char),

    #[error("sequence numbers start at 1")]
    ZeroSequence,

    #[error("'{0}' is not a recognised record identifier")]
    Malformed(String),

    #[error("sequence counter unavailable: {0}")]
    Counter(String),
}

/// A single violated rule found while validating a record.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("{record}.{field} is required")]
    MissingField { record: RecordKind, field: String },

    #[error("{record}.{field} references unknown {target} '{value}'")]
    DanglingReference {
        record: RecordKind,
        field: String,
        target: RecordKind,
        value: String,
    },

    #[error("{record}.{field} is invalid: {reason}")]
    InvalidField {
        record: RecordKind,
        field: String,
        reason: String,
    },

    #[error("{record} id '{id}' encodes {encoded} but the record was created on {created}")]
    IdDateMismatch {
        record: RecordKind,
        id: String,
        encoded: NaiveDate,
        created: NaiveDate,
    },

    #[error("device at position {position} has index {found}; indices must run 0..{expected}")]
    DeviceIndexGap {
        position: usize,
        found: usize,
        expected: usize,
    },

    #[error("visit carries {found} device models but its order has {expected} devices")]
    DeviceModelCountMismatch { expected: usize, found: usize },

    #[error("device model at position {position} is tagged with device index {found}")]
    DeviceModelIndexMismatch { position: usize, found: usize },
}

/// Every violation found for one record, reported together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation error(s): ", self.0.len())?;
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Rejected status changes. The record is left untouched in every case.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("{record} cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        record: RecordKind,
        from: String,
        to: String,
    },

    #[error("client-initiated cancellation requires a reason of at least {min_chars} characters")]
    CancellationReasonRequired { min_chars: usize },

    #[error("visit cannot complete while devices {pending:?} are unresolved")]
    DevicesUnresolved { pending: Vec<usize> },
}

/// Errors from the multi-device operations on orders and visits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("devices can only be added while the order is new or assigned (order {order_id} is {status})")]
    OrderLocked { order_id: String, status: String },

    #[error("visit {visit_id} has no device at index {index}")]
    UnknownDevice { visit_id: String, index: usize },

    #[error("device {index} cannot move from '{from}' to '{to}'")]
    InvalidDeviceTransition {
        index: usize,
        from: String,
        to: String,
    },

    #[error("visit {visit_id} is {status}; device work can no longer change")]
    VisitClosed { visit_id: String, status: String },
}

/// Failures of the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage lock poisoned: {0}")]
    Poisoned(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("stored {kind} record '{id}' has an unexpected shape")]
    UnexpectedShape { kind: RecordKind, id: String },
}

/// Failures while applying an explicit repair strategy.
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("{kind} '{id}' is not flagged in the integrity report")]
    NotInReport { kind: RecordKind, id: String },

    #[error("{kind} '{id}' no longer exists")]
    TargetMissing { kind: RecordKind, id: String },

    #[error("client '{0}' does not exist")]
    UnknownClient(String),

    #[error("{0} records are never hard-deleted")]
    NotDroppable(RecordKind),

    #[error("replacement id '{id}' is not usable: {reason}")]
    InvalidReplacementId { id: String, reason: String },

    #[error("visit '{visit_id}' carries device data for indices {extra:?} that its order does not have")]
    WouldDropDeviceData { visit_id: String, extra: Vec<usize> },

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Umbrella error for [`crate::service::RecordService`] operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: RecordKind, id: String },

    #[error("{kind} '{id}' is {status} and can no longer be changed")]
    Closed {
        kind: RecordKind,
        id: String,
        status: String,
    },
}

impl ServiceError {
    pub(crate) fn not_found(kind: RecordKind, id: &str) -> Self {
        ServiceError::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}
