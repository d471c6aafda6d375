use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::StatusHistoryEntry;
use crate::workflow::PartRequestStatus;

/// A technician's request for a spare part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartRequest {
    pub id: Uuid,

    /// Order the part is needed for, if any
    #[serde(default)]
    pub order_id: Option<String>,

    /// Technician who asked for the part
    pub requested_by: String,

    pub part_name: String,

    pub quantity: u32,

    pub status: PartRequestStatus,

    #[serde(default)]
    pub status_history: Vec<StatusHistoryEntry<PartRequestStatus>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Part request creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPartRequest {
    pub order_id: Option<String>,
    pub requested_by: String,
    pub part_name: String,
    pub quantity: u32,
}
