//! Relational integrity checks between clients, orders, visits and devices.
//!
//! [`scan`] is a pure, repeatable read over a [`crate::store::StoreSnapshot`];
//! [`Repairer`] applies explicitly requested fixes and logs each one.

pub mod repair;
pub mod scan;
pub mod sweeper;
pub mod types;


pub use repair::{RecordChange, RepairAction, RepairFailure, RepairLog, RepairStrategy, Repairer};
pub use scan::{scan, scan_store};
pub use sweeper::IntegritySweeper;
pub use types::{
    DanglingVisitRef, DeviceIndexProblem, IntegrityReport, MisindexedDevices, MismatchedVisitId,
    OrphanedOrder, OrphanedVisit, VisitLinkProblem,
};
