pub mod client;
pub mod history;
pub mod order;
pub mod part_request;
pub mod technician;
pub mod visit;

pub use client::{Address, Client, ClientStatus, NewClient};
pub use history::StatusHistoryEntry;
pub use order::{Device, NewDevice, NewOrder, Order, Priority};
pub use part_request::{NewPartRequest, PartRequest};
pub use technician::Technician;
pub use visit::{DeviceModel, DeviceModelUpdate, NewVisit, Visit, VisitType};

use serde::{Deserialize, Serialize};
use std::fmt;

/// The collections making up the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Client,
    Order,
    Visit,
    Technician,
    PartRequest,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::Client,
        RecordKind::Order,
        RecordKind::Visit,
        RecordKind::Technician,
        RecordKind::PartRequest,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::Client => "client",
            RecordKind::Order => "order",
            RecordKind::Visit => "visit",
            RecordKind::Technician => "technician",
            RecordKind::PartRequest => "part_request",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a client or order entered the system.
///
/// Non-manual sources stamp a single-letter tag into generated IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeSource {
    #[default]
    Manual,
    AiAssisted,
    WebForm,
    Reservation,
    Migration,
}

impl IntakeSource {
    pub fn source_tag(self) -> Option<char> {
        match self {
            IntakeSource::Manual => None,
            IntakeSource::AiAssisted => Some('A'),
            IntakeSource::WebForm => Some('W'),
            IntakeSource::Reservation => Some('R'),
            IntakeSource::Migration => Some('M'),
        }
    }
}

/// Any record the store can hold, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Record {
    Client(Client),
    Order(Order),
    Visit(Visit),
    Technician(Technician),
    PartRequest(PartRequest),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Client(_) => RecordKind::Client,
            Record::Order(_) => RecordKind::Order,
            Record::Visit(_) => RecordKind::Visit,
            Record::Technician(_) => RecordKind::Technician,
            Record::PartRequest(_) => RecordKind::PartRequest,
        }
    }

    pub fn id(&self) -> String {
        match self {
            Record::Client(client) => client.record_id(),
            Record::Order(order) => order.record_id(),
            Record::Visit(visit) => visit.record_id(),
            Record::Technician(technician) => technician.record_id(),
            Record::PartRequest(request) => request.record_id(),
        }
    }
}

/// A concrete record type that can be wrapped into and unwrapped from [`Record`].
pub trait TypedRecord: Clone + Into<Record> + TryFrom<Record, Error = Record> {
    const KIND: RecordKind;

    fn record_id(&self) -> String;
}

macro_rules! typed_record {
    ($ty:ident, $variant:ident, $id:ident) => {
        impl From<$ty> for Record {
            fn from(record: $ty) -> Self {
                Record::$variant(record)
            }
        }

        impl TryFrom<Record> for $ty {
            type Error = Record;

            fn try_from(record: Record) -> Result<Self, Self::Error> {
                match record {
                    Record::$variant(inner) => Ok(inner),
                    other => Err(other),
                }
            }
        }

        impl TypedRecord for $ty {
            const KIND: RecordKind = RecordKind::$variant;

            fn record_id(&self) -> String {
                self.$id.to_string()
            }
        }
    };
}

typed_record!(Client, Client, id);
typed_record!(Order, Order, id);
typed_record!(Visit, Visit, visit_id);
typed_record!(Technician, Technician, id);
typed_record!(PartRequest, PartRequest, id);

/// Trims optional free text, dropping it when nothing remains.
pub(crate) fn clean_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intake_sources_map_to_id_tags() {
        assert_eq!(IntakeSource::Manual.source_tag(), None);
        assert_eq!(IntakeSource::AiAssisted.source_tag(), Some('A'));
        assert_eq!(IntakeSource::WebForm.source_tag(), Some('W'));
    }

    #[test]
    fn test_clean_text_drops_blank_input() {
        assert_eq!(clean_text(Some("  ")), None);
        assert_eq!(clean_text(Some(" ok ")), Some("ok".to_string()));
        assert_eq!(clean_text(None), None);
    }
}
