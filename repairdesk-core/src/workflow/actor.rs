use serde::{Deserialize, Serialize};
use std::fmt;

/// Who initiated a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Client,
    Technician,
    Admin,
    System,
}

impl ActorRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ActorRole::Client => "client",
            ActorRole::Technician => "technician",
            ActorRole::Admin => "admin",
            ActorRole::System => "system",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The actor recorded in status history entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub role: ActorRole,
    pub id: Option<String>,
}

impl Actor {
    pub fn client(id: impl Into<String>) -> Self {
        Self {
            role: ActorRole::Client,
            id: Some(id.into()),
        }
    }

    pub fn technician(id: impl Into<String>) -> Self {
        Self {
            role: ActorRole::Technician,
            id: Some(id.into()),
        }
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self {
            role: ActorRole::Admin,
            id: Some(id.into()),
        }
    }

    pub fn system() -> Self {
        Self {
            role: ActorRole::System,
            id: None,
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(f, "{}:{}", self.role, id),
            None => write!(f, "{}", self.role),
        }
    }
}
