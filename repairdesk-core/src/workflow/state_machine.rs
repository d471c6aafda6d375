use serde::{Deserialize, Serialize};
use std::fmt;

/// Trait for the finite-state machines governing record statuses.
///
/// Each status type owns a single transition table returned by
/// [`StatusMachine::allowed_targets`]; every other check is derived from it.
pub trait StatusMachine: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Statuses reachable in one step from `self`.
    fn allowed_targets(self) -> &'static [Self];

    /// Status a freshly created record starts in.
    fn initial() -> Self;

    /// Whether this status is a cancellation (subject to reason rules).
    fn is_cancellation(self) -> bool {
        false
    }

    fn can_transition(self, target: Self) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Terminal statuses have no outgoing transitions.
    fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }
}

/// Order status.
///
/// The state machine progresses through these states:
/// - New -> Assigned -> InProgress -> Completed (terminal)
/// - Assigned / InProgress <-> OnHold
/// - New, Assigned, InProgress -> Cancelled (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderStatus {
    New,
    Assigned,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

impl StatusMachine for OrderStatus {
    fn allowed_targets(self) -> &'static [Self] {
        use OrderStatus::*;
        match self {
            New => &[Assigned, Cancelled],
            Assigned => &[InProgress, OnHold, Cancelled],
            InProgress => &[Completed, OnHold, Cancelled],
            OnHold => &[Assigned, InProgress],
            Completed | Cancelled => &[],
        }
    }

    fn initial() -> Self {
        OrderStatus::New
    }

    fn is_cancellation(self) -> bool {
        self == OrderStatus::Cancelled
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::New => write!(f, "new"),
            OrderStatus::Assigned => write!(f, "assigned"),
            OrderStatus::InProgress => write!(f, "in-progress"),
            OrderStatus::OnHold => write!(f, "on-hold"),
            OrderStatus::Completed => write!(f, "completed"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Visit status.
///
/// - Scheduled -> InProgress -> Completed (terminal)
/// - Scheduled, InProgress -> Cancelled (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl StatusMachine for VisitStatus {
    fn allowed_targets(self) -> &'static [Self] {
        use VisitStatus::*;
        match self {
            Scheduled => &[InProgress, Cancelled],
            InProgress => &[Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    fn initial() -> Self {
        VisitStatus::Scheduled
    }

    fn is_cancellation(self) -> bool {
        self == VisitStatus::Cancelled
    }
}

impl fmt::Display for VisitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VisitStatus::Scheduled => write!(f, "scheduled"),
            VisitStatus::InProgress => write!(f, "in_progress"),
            VisitStatus::Completed => write!(f, "completed"),
            VisitStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Part request status.
///
/// - Pending -> Approved -> Ordered -> Delivered (terminal)
/// - Pending -> Rejected (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartRequestStatus {
    Pending,
    Approved,
    Ordered,
    Delivered,
    Rejected,
}

impl StatusMachine for PartRequestStatus {
    fn allowed_targets(self) -> &'static [Self] {
        use PartRequestStatus::*;
        match self {
            Pending => &[Approved, Rejected],
            Approved => &[Ordered],
            Ordered => &[Delivered],
            Delivered | Rejected => &[],
        }
    }

    fn initial() -> Self {
        PartRequestStatus::Pending
    }
}

impl fmt::Display for PartRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartRequestStatus::Pending => write!(f, "pending"),
            PartRequestStatus::Approved => write!(f, "approved"),
            PartRequestStatus::Ordered => write!(f, "ordered"),
            PartRequestStatus::Delivered => write!(f, "delivered"),
            PartRequestStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Progress of one device within a visit.
///
/// - PendingScan -> Scanned -> Diagnosed -> Resolved (terminal)
/// - any non-terminal state -> Skipped (terminal)
///
/// Devices progress independently; only the visit's completion waits for
/// all of them to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceWorkState {
    #[default]
    PendingScan,
    Scanned,
    Diagnosed,
    Resolved,
    Skipped,
}

impl DeviceWorkState {
    /// Resolved or explicitly skipped.
    pub fn is_settled(self) -> bool {
        self.is_terminal()
    }
}

impl StatusMachine for DeviceWorkState {
    fn allowed_targets(self) -> &'static [Self] {
        use DeviceWorkState::*;
        match self {
            PendingScan => &[Scanned, Skipped],
            Scanned => &[Diagnosed, Skipped],
            Diagnosed => &[Resolved, Skipped],
            Resolved | Skipped => &[],
        }
    }

    fn initial() -> Self {
        DeviceWorkState::PendingScan
    }
}

impl fmt::Display for DeviceWorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceWorkState::PendingScan => write!(f, "pending_scan"),
            DeviceWorkState::Scanned => write!(f, "scanned"),
            DeviceWorkState::Diagnosed => write!(f, "diagnosed"),
            DeviceWorkState::Resolved => write!(f, "resolved"),
            DeviceWorkState::Skipped => write!(f, "skipped"),
        }
    }
}
