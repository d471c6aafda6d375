use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One accepted status change. History logs are append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry<S> {
    pub status: S,
    pub timestamp: DateTime<Utc>,
    /// Role of the actor (`client`, `technician`, `admin`, `system`)
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}
