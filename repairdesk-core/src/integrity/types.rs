use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::RecordKind;

/// Order whose client does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanedOrder {
    pub order_id: String,
    pub client_id: String,
}

/// Visit whose order does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanedVisit {
    pub visit_id: String,
    pub order_id: String,
}

/// Visit whose identifier does not encode its own creation day.
///
/// `encoded` is `None` when the identifier is not a parseable visit ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MismatchedVisitId {
    pub visit_id: String,
    pub encoded: Option<NaiveDate>,
    pub created: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum DeviceIndexProblem {
    /// Order device at `position` carries index `found`
    Gap { position: usize, found: usize },
    /// Visit carries `found` device models for an order with `expected` devices
    CountMismatch { expected: usize, found: usize },
    /// Visit device model at `position` carries index `found`
    ModelIndex { position: usize, found: usize },
}

/// Device indexing that breaks the order/visit alignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MisindexedDevices {
    pub kind: RecordKind,
    pub id: String,
    #[serde(flatten)]
    pub problem: DeviceIndexProblem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "problem", rename_all = "snake_case")]
pub enum VisitLinkProblem {
    /// `visitIds` names a visit that does not exist
    MissingVisit,
    /// `visitIds` names a visit that belongs to another order
    ForeignVisit {
        #[serde(rename = "ownerId")]
        owner_id: String,
    },
    /// The visit points at the order but is absent from `visitIds`
    Unlisted,
}

/// Disagreement between an order's `visitIds` and the visits themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DanglingVisitRef {
    pub order_id: String,
    pub visit_id: String,
    #[serde(flatten)]
    pub problem: VisitLinkProblem,
}

/// Findings of one integrity scan.
///
/// Scans walk the collections in id order, so two scans of the same data
/// produce equal reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub orphaned_orders: Vec<OrphanedOrder>,
    pub orphaned_visits: Vec<OrphanedVisit>,
    pub mismatched_visit_ids: Vec<MismatchedVisitId>,
    pub misindexed_devices: Vec<MisindexedDevices>,
    pub dangling_visit_refs: Vec<DanglingVisitRef>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }

    pub fn total(&self) -> usize {
        self.orphaned_orders.len()
            + self.orphaned_visits.len()
            + self.mismatched_visit_ids.len()
            + self.misindexed_devices.len()
            + self.dangling_visit_refs.len()
    }

    pub fn flags_orphaned_order(&self, order_id: &str) -> bool {
        self.orphaned_orders.iter().any(|f| f.order_id == order_id)
    }

    pub fn flags_orphaned_visit(&self, visit_id: &str) -> bool {
        self.orphaned_visits.iter().any(|f| f.visit_id == visit_id)
    }

    pub fn flags_visit_id(&self, visit_id: &str) -> bool {
        self.mismatched_visit_ids.iter().any(|f| f.visit_id == visit_id)
    }

    pub fn flags_misindexed(&self, kind: RecordKind, id: &str) -> bool {
        self.misindexed_devices
            .iter()
            .any(|f| f.kind == kind && f.id == id)
    }

    pub fn flags_visit_refs(&self, order_id: &str) -> bool {
        self.dangling_visit_refs.iter().any(|f| f.order_id == order_id)
    }
}
