use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::StatusHistoryEntry;
use crate::workflow::{DeviceWorkState, VisitStatus};

/// Visit type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    Diagnosis,
    Repair,
    Installation,
    Control,
}

/// Per-device work carried by a visit.
///
/// Entry `i` of [`Visit::device_models`] belongs to device `i` of the parent
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceModel {
    pub device_index: usize,

    #[serde(default)]
    pub state: DeviceWorkState,

    /// Raw nameplate/scan output
    #[serde(default)]
    pub scan: Option<Value>,

    #[serde(default)]
    pub diagnosis: Option<String>,

    #[serde(default)]
    pub cost: Option<Decimal>,

    #[serde(default)]
    pub notes: Option<String>,
}

impl DeviceModel {
    /// Empty entry for a device nobody has looked at yet.
    pub fn stub(device_index: usize) -> Self {
        Self {
            device_index,
            state: DeviceWorkState::PendingScan,
            scan: None,
            diagnosis: None,
            cost: None,
            notes: None,
        }
    }
}

/// Partial update of one device entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceModelUpdate {
    pub state: Option<DeviceWorkState>,
    pub scan: Option<Value>,
    pub diagnosis: Option<String>,
    pub cost: Option<Decimal>,
    pub notes: Option<String>,
}

/// Visit model.
///
/// `visit_id`'s date code is the visit's own creation day, not the parent
/// order's.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub visit_id: String,

    pub order_id: String,

    #[serde(rename = "type")]
    pub visit_type: VisitType,

    pub status: VisitStatus,

    pub scheduled_date: NaiveDate,

    /// Assigned technician, if any
    #[serde(default)]
    pub employee_id: Option<String>,

    #[serde(default)]
    pub device_models: Vec<DeviceModel>,

    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub status_history: Vec<StatusHistoryEntry<VisitStatus>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Visit {
    /// Indices of devices that still block completion.
    pub fn unresolved_devices(&self) -> Vec<usize> {
        self.device_models
            .iter()
            .filter(|model| !model.state.is_settled())
            .map(|model| model.device_index)
            .collect()
    }
}

/// Dispatch request for a new visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVisit {
    pub order_id: String,
    #[serde(rename = "type")]
    pub visit_type: VisitType,
    pub scheduled_date: NaiveDate,
    pub employee_id: Option<String>,
    pub notes: Option<String>,
}
