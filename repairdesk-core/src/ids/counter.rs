use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::error::IdError;
use crate::ids::parse::parse_id;
use crate::ids::scheme::IdKind;

/// Authoritative per-`(kind, day)` sequence counter.
///
/// Allocation is a short read-modify-write that must be atomic per key;
/// implementations never hold their lock across persistence of the record
/// the number is used for.
#[async_trait]
pub trait SequenceCounter: Send + Sync {
    /// Allocates the next sequence number for `(kind, day)`.
    ///
    /// Fails closed with [`IdError::SequenceOverflow`] once `capacity` numbers
    /// were handed out; an overflowing call does not consume a number.
    async fn next(&self, kind: IdKind, day: NaiveDate, capacity: u32) -> Result<u32, IdError>;

    /// Last number allocated for `(kind, day)`, 0 if none.
    async fn current(&self, kind: IdKind, day: NaiveDate) -> Result<u32, IdError>;

    /// Raises the counter for `(kind, day)` to at least `value`.
    async fn seed(&self, kind: IdKind, day: NaiveDate, value: u32) -> Result<(), IdError>;
}

/// Seeds a counter from identifiers that already exist.
///
/// Each `(kind, day)` counter is raised to the highest sequence found, so
/// fresh allocations continue after the existing records. Unparseable IDs
/// are skipped and counted in the return value.
pub async fn seed_from_ids<'a, I>(counter: &dyn SequenceCounter, ids: I) -> Result<usize, IdError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut highest: HashMap<(IdKind, NaiveDate), u32> = HashMap::new();
    let mut skipped = 0;

    for id in ids {
        match parse_id(id) {
            Ok(parsed) => {
                let entry = highest.entry((parsed.kind(), parsed.date)).or_insert(0);
                *entry = (*entry).max(parsed.sequence);
            }
            Err(_) => skipped += 1,
        }
    }

    for ((kind, day), value) in highest {
        debug!("Seeding {} sequence for {} at {}", kind, day, value);
        counter.seed(kind, day, value).await?;
    }

    Ok(skipped)
}

/// Process-local counter guarded by a mutex.
#[derive(Debug, Default)]
pub struct InMemorySequenceCounter {
    counters: Mutex<HashMap<(IdKind, NaiveDate), u32>>,
}

impl InMemorySequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_counters<T>(
        &self,
        f: impl FnOnce(&mut HashMap<(IdKind, NaiveDate), u32>) -> T,
    ) -> Result<T, IdError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|e| IdError::Counter(format!("counter lock poisoned: {}", e)))?;
        Ok(f(&mut counters))
    }
}

#[async_trait]
impl SequenceCounter for InMemorySequenceCounter {
    async fn next(&self, kind: IdKind, day: NaiveDate, capacity: u32) -> Result<u32, IdError> {
        self.with_counters(|counters| {
            let value = counters.entry((kind, day)).or_insert(0);
            if *value >= capacity {
                return Err(IdError::SequenceOverflow {
                    kind,
                    day,
                    capacity,
                });
            }
            *value += 1;
            Ok(*value)
        })?
    }

    async fn current(&self, kind: IdKind, day: NaiveDate) -> Result<u32, IdError> {
        self.with_counters(|counters| counters.get(&(kind, day)).copied().unwrap_or(0))
    }

    async fn seed(&self, kind: IdKind, day: NaiveDate, value: u32) -> Result<(), IdError> {
        self.with_counters(|counters| {
            let current = counters.entry((kind, day)).or_insert(0);
            *current = (*current).max(value);
        })
    }
}
