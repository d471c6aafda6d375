//! Status workflows for orders, visits, part requests and per-device work.

pub mod actor;
pub mod engine;
pub mod notify;
pub mod state_machine;

pub use actor::{Actor, ActorRole};
pub use engine::{apply_transition, TransitionPolicy, Tracked, WorkflowEngine};
pub use notify::{
    ChannelNotifier, Notification, NotificationDispatcher, NotificationType, TracingNotifier,
};
pub use state_machine::{
    DeviceWorkState, OrderStatus, PartRequestStatus, StatusMachine, VisitStatus,
};
