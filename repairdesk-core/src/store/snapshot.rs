use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::models::{Client, Order, PartRequest, Record, RecordKind, Technician, Visit};
use crate::store::RecordStore;
use crate::validation::ReferenceLookup;

/// Read-only copy of the record collections, ordered by id.
///
/// Used as the lookup for validation and as the input of integrity scans;
/// ordered maps keep scan output deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoreSnapshot {
    pub clients: BTreeMap<String, Client>,
    pub orders: BTreeMap<String, Order>,
    pub visits: BTreeMap<String, Visit>,
    pub technicians: BTreeMap<String, Technician>,
    pub part_requests: BTreeMap<String, PartRequest>,
}

impl StoreSnapshot {
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut snapshot = Self::default();
        for record in records {
            snapshot.insert(record);
        }
        snapshot
    }

    /// Loads every collection from `store`.
    pub async fn load(store: &dyn RecordStore) -> Result<Self, StoreError> {
        let mut snapshot = Self::default();
        for kind in RecordKind::ALL {
            for record in store.load_all(kind).await? {
                snapshot.insert(record);
            }
        }
        Ok(snapshot)
    }

    pub fn insert(&mut self, record: Record) {
        match record {
            Record::Client(client) => {
                self.clients.insert(client.id.clone(), client);
            }
            Record::Order(order) => {
                self.orders.insert(order.id.clone(), order);
            }
            Record::Visit(visit) => {
                self.visits.insert(visit.visit_id.clone(), visit);
            }
            Record::Technician(technician) => {
                self.technicians.insert(technician.id.clone(), technician);
            }
            Record::PartRequest(request) => {
                self.part_requests.insert(request.id.to_string(), request);
            }
        }
    }

    /// Every generated identifier held in the snapshot.
    pub fn generated_ids(&self) -> impl Iterator<Item = &str> {
        self.clients
            .keys()
            .chain(self.orders.keys())
            .chain(self.visits.keys())
            .map(String::as_str)
    }
}

impl ReferenceLookup for StoreSnapshot {
    fn client(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    fn order(&self, id: &str) -> Option<&Order> {
        self.orders.get(id)
    }

    fn visit(&self, id: &str) -> Option<&Visit> {
        self.visits.get(id)
    }

    fn technician(&self, id: &str) -> Option<&Technician> {
        self.technicians.get(id)
    }
}
