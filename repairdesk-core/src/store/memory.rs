//! In-memory record store for tests and single-process deployments

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::error::StoreError;
use crate::models::{Record, RecordKind};
use crate::store::{Change, RecordStore};

type Collections = HashMap<RecordKind, BTreeMap<String, Record>>;

/// Uses an `RwLock` around all collections, so a committed batch is never
/// observed half-applied.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    collections: Arc<RwLock<Collections>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store pre-populated with `records`.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut collections = Collections::new();
        for record in records {
            collections
                .entry(record.kind())
                .or_default()
                .insert(record.id(), record);
        }
        Self {
            collections: Arc::new(RwLock::new(collections)),
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn load_all(&self, kind: RecordKind) -> Result<Vec<Record>, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;

        Ok(collections
            .get(&kind)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn load_by_id(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;

        Ok(collections
            .get(&kind)
            .and_then(|records| records.get(id))
            .cloned())
    }

    async fn commit(&self, changes: Vec<Change>) -> Result<(), StoreError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;

        for change in changes {
            match change {
                Change::Put(record) => {
                    collections
                        .entry(record.kind())
                        .or_default()
                        .insert(record.id(), record);
                }
                Change::Delete { kind, id } => {
                    if let Some(records) = collections.get_mut(&kind) {
                        records.remove(&id);
                    }
                }
            }
        }

        Ok(())
    }
}
