use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::IntakeSource;

/// Client lifecycle flag. Clients are archived, never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientStatus {
    #[default]
    Active,
    Archived,
}

/// Structured postal address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    #[serde(default)]
    pub postal_code: String,
}

/// Client model.
///
/// `id` encodes the creation day and the per-day sequence (`CLI25271001`)
/// and never changes once assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,

    /// Full display name, when captured as a single field
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub last_name: Option<String>,

    pub phone: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub address: Option<Address>,

    #[serde(default)]
    pub status: ClientStatus,

    #[serde(default)]
    pub source: IntakeSource,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Name shown to operators, derived from whichever name fields are set.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_archived(&self) -> bool {
        self.status == ClientStatus::Archived
    }
}

/// Client intake request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClient {
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<Address>,
    #[serde(default)]
    pub source: IntakeSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Client {
        let now = Utc::now();
        Client {
            id: "CLI25271001".to_string(),
            name: None,
            first_name: Some("Anna".to_string()),
            last_name: Some("Nowak".to_string()),
            phone: "+48 600 100 200".to_string(),
            email: None,
            address: None,
            status: ClientStatus::Active,
            source: IntakeSource::Manual,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_display_name_prefers_full_name() {
        let mut c = client();
        assert_eq!(c.display_name(), "Anna Nowak");
        c.name = Some("Anna Nowak-Kowalska".to_string());
        assert_eq!(c.display_name(), "Anna Nowak-Kowalska");
    }

    #[test]
    fn test_deserializes_camel_case_records_with_defaults() {
        let json = serde_json::json!({
            "id": "CLI25271001",
            "firstName": "Anna",
            "phone": "600100200",
            "createdAt": "2025-09-28T10:00:00Z",
            "updatedAt": "2025-09-28T10:00:00Z"
        });
        let parsed: Client = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.status, ClientStatus::Active);
        assert_eq!(parsed.source, IntakeSource::Manual);
        assert_eq!(parsed.display_name(), "Anna");
    }
}
