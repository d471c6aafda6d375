//! Persistence collaborator interface.
//!
//! The core only needs whole-record loads and writes keyed by
//! `(kind, id)`; multi-record writes go through [`RecordStore::commit`],
//! which applies a batch atomically.

pub mod memory;
pub mod postgres;
pub mod snapshot;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::error::StoreError;
use crate::ids::{InMemorySequenceCounter, SequenceCounter};
use crate::models::{Record, RecordKind, TypedRecord};

pub use memory::InMemoryStore;
pub use postgres::{PgRecordStore, PgSequenceCounter};
pub use snapshot::StoreSnapshot;

/// One write in a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Put(Record),
    Delete { kind: RecordKind, id: String },
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// All records of a kind, ordered by id.
    async fn load_all(&self, kind: RecordKind) -> Result<Vec<Record>, StoreError>;

    async fn load_by_id(&self, kind: RecordKind, id: &str) -> Result<Option<Record>, StoreError>;

    /// Applies every change or none of them.
    async fn commit(&self, changes: Vec<Change>) -> Result<(), StoreError>;

    /// Inserts or replaces a single record.
    async fn save(&self, record: Record) -> Result<(), StoreError> {
        self.commit(vec![Change::Put(record)]).await
    }

    async fn remove(&self, kind: RecordKind, id: &str) -> Result<(), StoreError> {
        self.commit(vec![Change::Delete {
            kind,
            id: id.to_string(),
        }])
        .await
    }

    /// Cheap connectivity probe for health checks.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// A record store and the sequence counter that lives next to it.
#[derive(Clone)]
pub struct Backend {
    pub records: Arc<dyn RecordStore>,
    pub counter: Arc<dyn SequenceCounter>,
}

/// Opens PostgreSQL when a URL is given, otherwise an empty in-memory
/// backend.
pub async fn open_backend(database_url: Option<&str>, max_connections: u32) -> Result<Backend, StoreError> {
    match database_url {
        Some(url) => {
            let pool = postgres::connect(url, max_connections).await?;
            info!("Using PostgreSQL record store");
            Ok(Backend {
                records: Arc::new(PgRecordStore::new(pool.clone())),
                counter: Arc::new(PgSequenceCounter::new(pool)),
            })
        }
        None => {
            info!("DATABASE_URL not set, using in-memory record store");
            Ok(Backend {
                records: Arc::new(InMemoryStore::new()),
                counter: Arc::new(InMemorySequenceCounter::new()),
            })
        }
    }
}

/// Loads a record and unwraps it into its concrete type.
pub async fn load<T: TypedRecord>(store: &dyn RecordStore, id: &str) -> Result<Option<T>, StoreError> {
    match store.load_by_id(T::KIND, id).await? {
        None => Ok(None),
        Some(record) => T::try_from(record)
            .map(Some)
            .map_err(|_| StoreError::UnexpectedShape {
                kind: T::KIND,
                id: id.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::IdKind;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_without_a_url_the_backend_is_in_memory() {
        let backend = open_backend(None, 5).await.unwrap();
        backend.records.ping().await.unwrap();
        assert!(backend.records.load_all(RecordKind::Order).await.unwrap().is_empty());

        let day = NaiveDate::from_ymd_opt(2025, 9, 28).unwrap();
        assert_eq!(backend.counter.next(IdKind::Visit, day, 999).await.unwrap(), 1);
    }
}
