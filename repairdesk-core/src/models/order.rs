use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{IntakeSource, StatusHistoryEntry};
use crate::workflow::OrderStatus;

/// Order priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// A physical appliance embedded in an order.
///
/// `device_index` is the device's 0-based position within the order and
/// stays stable for the order's lifetime; visits key their per-device
/// results by it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub device_index: usize,
    pub device_type: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub production_year: Option<i32>,
    #[serde(default)]
    pub purchase_date: Option<NaiveDate>,
}

/// Device data supplied at intake or when a device is added later.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDevice {
    pub device_type: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    pub serial_number: Option<String>,
    pub production_year: Option<i32>,
    pub purchase_date: Option<NaiveDate>,
}

impl NewDevice {
    pub fn into_device(self, device_index: usize) -> Device {
        Device {
            device_index,
            device_type: self.device_type.trim().to_string(),
            brand: self.brand.trim().to_string(),
            model: self.model.trim().to_string(),
            serial_number: crate::models::clean_text(self.serial_number.as_deref()),
            production_year: self.production_year,
            purchase_date: self.purchase_date,
        }
    }
}

/// Order model.
///
/// `client_id` must always resolve to an existing client. The client's name
/// is not copied here; read paths derive it through the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(alias = "orderNumber")]
    pub id: String,

    pub client_id: String,

    /// Devices in index order, at least one
    pub devices: Vec<Device>,

    pub status: OrderStatus,

    #[serde(default)]
    pub priority: Priority,

    /// Visits dispatched for this order
    #[serde(default)]
    pub visit_ids: Vec<String>,

    #[serde(default)]
    pub source: IntakeSource,

    #[serde(default)]
    pub notes: Option<String>,

    /// Set once the order reaches a terminal status
    #[serde(default)]
    pub archived: bool,

    #[serde(default)]
    pub status_history: Vec<StatusHistoryEntry<OrderStatus>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether new devices may still be attached.
    pub fn accepts_devices(&self) -> bool {
        matches!(self.status, OrderStatus::New | OrderStatus::Assigned)
    }
}

/// Order intake request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOrder {
    pub client_id: String,
    pub devices: Vec<NewDevice>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub source: IntakeSource,
    pub notes: Option<String>,
}
