use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::TransitionError;
use crate::models::{clean_text, Order, PartRequest, StatusHistoryEntry, TypedRecord, Visit};
use crate::workflow::actor::{Actor, ActorRole};
use crate::workflow::notify::{Notification, NotificationDispatcher, NotificationType};
use crate::workflow::state_machine::{OrderStatus, PartRequestStatus, StatusMachine, VisitStatus};

/// A record whose status is governed by a [`StatusMachine`] and which keeps
/// an append-only status history.
pub trait Tracked: TypedRecord {
    type Status: StatusMachine;

    fn status(&self) -> Self::Status;

    /// Sets the status and any fields derived from it.
    fn set_status(&mut self, status: Self::Status, at: DateTime<Utc>);

    fn history(&self) -> &[StatusHistoryEntry<Self::Status>];

    fn history_mut(&mut self) -> &mut Vec<StatusHistoryEntry<Self::Status>>;

    /// Record-specific preconditions beyond the transition table.
    fn check_guards(&self, _target: Self::Status) -> Result<(), TransitionError> {
        Ok(())
    }

    /// Notification to emit after `self` moved away from `previous`.
    fn notification_for(&self, _previous: Self::Status, _actor: &Actor) -> Option<Notification> {
        None
    }
}

/// Tunables for transition rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPolicy {
    /// Minimum reason length (in characters) for client-initiated cancellations
    pub cancellation_reason_min_chars: usize,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            cancellation_reason_min_chars: 5,
        }
    }
}

/// Applies a status change to a copy of `record`.
///
/// On success the copy carries the new status and exactly one new history
/// entry; on failure `record` is untouched and nothing is returned, so a
/// transition is never half-applied.
pub fn apply_transition<R: Tracked>(
    record: &R,
    target: R::Status,
    actor: &Actor,
    notes: Option<&str>,
    policy: &TransitionPolicy,
    at: DateTime<Utc>,
) -> Result<R, TransitionError> {
    let from = record.status();
    if !from.can_transition(target) {
        return Err(TransitionError::InvalidTransition {
            record: R::KIND,
            from: from.to_string(),
            to: target.to_string(),
        });
    }

    let notes = clean_text(notes);
    if target.is_cancellation() && actor.role == ActorRole::Client {
        let reason_chars = notes.as_deref().map(|n| n.chars().count()).unwrap_or(0);
        if reason_chars < policy.cancellation_reason_min_chars {
            return Err(TransitionError::CancellationReasonRequired {
                min_chars: policy.cancellation_reason_min_chars,
            });
        }
    }

    record.check_guards(target)?;

    let mut updated = record.clone();
    updated.set_status(target, at);
    updated.history_mut().push(StatusHistoryEntry {
        status: target,
        timestamp: at,
        actor: actor.role.as_str().to_string(),
        actor_id: actor.id.clone(),
        notes,
    });
    Ok(updated)
}

/// Runs transitions under a policy and hands resulting notifications to the
/// dispatcher.
#[derive(Clone)]
pub struct WorkflowEngine {
    policy: TransitionPolicy,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl WorkflowEngine {
    pub fn new(policy: TransitionPolicy, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self { policy, notifier }
    }

    /// See [`apply_transition`].
    pub fn transition<R: Tracked>(
        &self,
        record: &R,
        target: R::Status,
        actor: &Actor,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<R, TransitionError> {
        let updated = apply_transition(record, target, actor, notes, &self.policy, at)?;
        info!(
            "{} {}: {} -> {} by {}",
            R::KIND,
            record.record_id(),
            record.status(),
            target,
            actor
        );
        Ok(updated)
    }

    /// Emits the notification for a stored transition, if the record kind
    /// defines one for it.
    pub fn announce<R: Tracked>(&self, updated: &R, previous: R::Status, actor: &Actor) {
        if let Some(notification) = updated.notification_for(previous, actor) {
            self.notify(notification);
        }
    }

    /// Fire-and-forget dispatch; failures are logged only.
    pub fn notify(&self, notification: Notification) {
        let recipient = notification.recipient_id.clone();
        if let Err(e) = self.notifier.dispatch(notification) {
            error!("Failed to notify {}: {}", recipient, e);
        }
    }
}

impl Tracked for Order {
    type Status = OrderStatus;

    fn status(&self) -> OrderStatus {
        self.status
    }

    fn set_status(&mut self, status: OrderStatus, at: DateTime<Utc>) {
        self.status = status;
        self.archived = status.is_terminal();
        self.updated_at = at;
    }

    fn history(&self) -> &[StatusHistoryEntry<OrderStatus>] {
        &self.status_history
    }

    fn history_mut(&mut self) -> &mut Vec<StatusHistoryEntry<OrderStatus>> {
        &mut self.status_history
    }

    fn notification_for(&self, _previous: OrderStatus, actor: &Actor) -> Option<Notification> {
        let link = format!("/orders/{}", self.id);
        match self.status {
            OrderStatus::Completed => Some(
                Notification::new(
                    &self.client_id,
                    "Order completed",
                    format!("Order {} has been completed.", self.id),
                    NotificationType::Success,
                )
                .with_link(link),
            ),
            OrderStatus::Cancelled if actor.role != ActorRole::Client => Some(
                Notification::new(
                    &self.client_id,
                    "Order cancelled",
                    format!("Order {} has been cancelled.", self.id),
                    NotificationType::Warning,
                )
                .with_link(link),
            ),
            _ => None,
        }
    }
}

impl Tracked for Visit {
    type Status = VisitStatus;

    fn status(&self) -> VisitStatus {
        self.status
    }

    fn set_status(&mut self, status: VisitStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
    }

    fn history(&self) -> &[StatusHistoryEntry<VisitStatus>] {
        &self.status_history
    }

    fn history_mut(&mut self) -> &mut Vec<StatusHistoryEntry<VisitStatus>> {
        &mut self.status_history
    }

    fn check_guards(&self, target: VisitStatus) -> Result<(), TransitionError> {
        if target == VisitStatus::Completed {
            let pending = self.unresolved_devices();
            if !pending.is_empty() {
                return Err(TransitionError::DevicesUnresolved { pending });
            }
        }
        Ok(())
    }

    fn notification_for(&self, _previous: VisitStatus, actor: &Actor) -> Option<Notification> {
        let technician = self.employee_id.as_deref()?;
        let cancelled_by_someone_else = actor.id.as_deref() != Some(technician);
        if self.status == VisitStatus::Cancelled && cancelled_by_someone_else {
            return Some(
                Notification::new(
                    technician,
                    "Visit cancelled",
                    format!(
                        "Visit {} scheduled for {} has been cancelled.",
                        self.visit_id, self.scheduled_date
                    ),
                    NotificationType::Warning,
                )
                .with_link(format!("/visits/{}", self.visit_id)),
            );
        }
        None
    }
}

impl Tracked for PartRequest {
    type Status = PartRequestStatus;

    fn status(&self) -> PartRequestStatus {
        self.status
    }

    fn set_status(&mut self, status: PartRequestStatus, at: DateTime<Utc>) {
        self.status = status;
        self.updated_at = at;
    }

    fn history(&self) -> &[StatusHistoryEntry<PartRequestStatus>] {
        &self.status_history
    }

    fn history_mut(&mut self) -> &mut Vec<StatusHistoryEntry<PartRequestStatus>> {
        &mut self.status_history
    }

    fn notification_for(&self, _previous: PartRequestStatus, _actor: &Actor) -> Option<Notification> {
        let (title, notification_type) = match self.status {
            PartRequestStatus::Approved => ("Part request approved", NotificationType::Success),
            PartRequestStatus::Rejected => ("Part request rejected", NotificationType::Warning),
            PartRequestStatus::Delivered => ("Part delivered", NotificationType::Success),
            _ => return None,
        };
        Some(Notification::new(
            &self.requested_by,
            title,
            format!(
                "{} x {} is now {}.",
                self.quantity, self.part_name, self.status
            ),
            notification_type,
        ))
    }
}
