//! Explicit, logged repairs for integrity findings.
//!
//! Every strategy names its target, must match a finding in the report it is
//! applied against, and records the before/after value of each record it
//! touches. Multi-record repairs are committed as one batch.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::error::RepairError;
use crate::ids::{parse_id, IdGenerator, IdKind, IdScheme};
use crate::integrity::types::IntegrityReport;
use crate::models::{Client, DeviceModel, Order, RecordKind, TypedRecord, Visit};
use crate::store::{load, Change, RecordStore};

/// A single requested repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum RepairStrategy {
    /// Point an orphaned order at an existing client.
    ReassignToClient { order_id: String, client_id: String },
    /// Give a visit an identifier that encodes its own creation day.
    ///
    /// With `new_id` unset a fresh one is minted for the creation day.
    RegenerateId {
        visit_id: String,
        new_id: Option<String>,
    },
    /// Remove an orphaned order or visit. Clients are never dropped.
    DropOrphan { kind: RecordKind, id: String },
    /// Re-key a visit's device models by device index and add stubs for
    /// devices without one. Never discards device data.
    RealignDeviceModels { visit_id: String },
    /// Rebuild an order's `visitIds` from the visits pointing at it.
    RelinkVisits { order_id: String },
}

impl RepairStrategy {
    /// The record the strategy is aimed at.
    pub fn target(&self) -> (RecordKind, &str) {
        match self {
            RepairStrategy::ReassignToClient { order_id, .. } => (RecordKind::Order, order_id),
            RepairStrategy::RegenerateId { visit_id, .. } => (RecordKind::Visit, visit_id),
            RepairStrategy::DropOrphan { kind, id } => (*kind, id),
            RepairStrategy::RealignDeviceModels { visit_id } => (RecordKind::Visit, visit_id),
            RepairStrategy::RelinkVisits { order_id } => (RecordKind::Order, order_id),
        }
    }
}

/// Compact JSON for the repair log line; absent values print as `null`.
fn snapshot_text(value: Option<&Value>) -> String {
    value.map_or_else(|| "null".to_string(), |v| v.to_string())
}

/// Before/after values of one touched record. `None` means absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordChange {
    pub kind: RecordKind,
    pub id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl RecordChange {
    fn of<T: TypedRecord + Serialize>(before: Option<&T>, after: Option<&T>) -> Self {
        let id = before
            .or(after)
            .map(T::record_id)
            .unwrap_or_default();
        Self {
            kind: T::KIND,
            id,
            before: before.map(to_json),
            after: after.map(to_json),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// An applied repair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairAction {
    pub strategy: RepairStrategy,
    pub changes: Vec<RecordChange>,
    pub applied_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairFailure {
    pub strategy: RepairStrategy,
    pub error: String,
}

/// Outcome of a repair run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairLog {
    pub actions: Vec<RepairAction>,
    pub failures: Vec<RepairFailure>,
}

#[derive(Clone)]
pub struct Repairer {
    store: Arc<dyn RecordStore>,
    ids: IdGenerator,
    clock: Arc<dyn Clock>,
}

impl Repairer {
    pub fn new(store: Arc<dyn RecordStore>, ids: IdGenerator, clock: Arc<dyn Clock>) -> Self {
        Self { store, ids, clock }
    }

    /// Applies one strategy.
    ///
    /// # Errors
    ///
    /// Returns [`RepairError::NotInReport`] when the target is not flagged in
    /// `report`, and nothing is written in that case or any other failure.
    pub async fn apply(
        &self,
        report: &IntegrityReport,
        strategy: &RepairStrategy,
    ) -> Result<RepairAction, RepairError> {
        let (kind, id) = strategy.target();
        let flagged = match strategy {
            RepairStrategy::ReassignToClient { order_id, .. } => report.flags_orphaned_order(order_id),
            RepairStrategy::RegenerateId { visit_id, .. } => report.flags_visit_id(visit_id),
            RepairStrategy::DropOrphan { kind, id } => match kind {
                RecordKind::Order => report.flags_orphaned_order(id),
                RecordKind::Visit => report.flags_orphaned_visit(id),
                other => return Err(RepairError::NotDroppable(*other)),
            },
            RepairStrategy::RealignDeviceModels { visit_id } => {
                report.flags_misindexed(RecordKind::Visit, visit_id)
            }
            RepairStrategy::RelinkVisits { order_id } => report.flags_visit_refs(order_id),
        };
        if !flagged {
            return Err(RepairError::NotInReport {
                kind,
                id: id.to_string(),
            });
        }

        let changes = match strategy {
            RepairStrategy::ReassignToClient { order_id, client_id } => {
                self.reassign_to_client(order_id, client_id).await?
            }
            RepairStrategy::RegenerateId { visit_id, new_id } => {
                self.regenerate_id(visit_id, new_id.as_deref()).await?
            }
            RepairStrategy::DropOrphan { kind, id } => self.drop_orphan(*kind, id).await?,
            RepairStrategy::RealignDeviceModels { visit_id } => {
                self.realign_device_models(visit_id).await?
            }
            RepairStrategy::RelinkVisits { order_id } => self.relink_visits(order_id).await?,
        };

        for change in &changes {
            let before = snapshot_text(change.before.as_ref());
            let after = snapshot_text(change.after.as_ref());
            info!(
                "Repaired {} {} via {:?}: {} -> {}",
                change.kind,
                change.id,
                strategy.target(),
                before,
                after,
            );
        }

        Ok(RepairAction {
            strategy: strategy.clone(),
            changes,
            applied_at: self.clock.now(),
        })
    }

    async fn require<T: TypedRecord>(&self, id: &str) -> Result<T, RepairError> {
        load::<T>(self.store.as_ref(), id)
            .await?
            .ok_or_else(|| RepairError::TargetMissing {
                kind: T::KIND,
                id: id.to_string(),
            })
    }

    async fn reassign_to_client(
        &self,
        order_id: &str,
        client_id: &str,
    ) -> Result<Vec<RecordChange>, RepairError> {
        let order: Order = self.require(order_id).await?;
        if load::<Client>(self.store.as_ref(), client_id).await?.is_none() {
            return Err(RepairError::UnknownClient(client_id.to_string()));
        }

        let mut updated = order.clone();
        updated.client_id = client_id.to_string();
        updated.updated_at = self.clock.now();

        self.store.save(updated.clone().into()).await?;
        Ok(vec![RecordChange::of(Some(&order), Some(&updated))])
    }

    async fn regenerate_id(
        &self,
        visit_id: &str,
        new_id: Option<&str>,
    ) -> Result<Vec<RecordChange>, RepairError> {
        let visit: Visit = self.require(visit_id).await?;
        let created = visit.created_at.date_naive();

        let replacement = match new_id {
            Some(id) => {
                check_replacement(id, created)?;
                self.ids.seed([id]).await?;
                id.to_string()
            }
            None => self.ids.next_id(IdScheme::Visit, None, created).await?,
        };
        if self
            .store
            .load_by_id(RecordKind::Visit, &replacement)
            .await?
            .is_some()
        {
            return Err(RepairError::InvalidReplacementId {
                id: replacement,
                reason: "already in use".to_string(),
            });
        }

        let mut renamed = visit.clone();
        renamed.visit_id = replacement.clone();
        renamed.updated_at = self.clock.now();

        let mut writes = vec![
            Change::Delete {
                kind: RecordKind::Visit,
                id: visit.visit_id.clone(),
            },
            Change::Put(renamed.clone().into()),
        ];
        let mut changes = vec![RecordChange::of(Some(&visit), Some(&renamed))];

        if let Some(order) = load::<Order>(self.store.as_ref(), &visit.order_id).await? {
            if order.visit_ids.iter().any(|id| id == visit_id) {
                let mut updated = order.clone();
                for id in updated.visit_ids.iter_mut().filter(|id| id.as_str() == visit_id) {
                    *id = replacement.clone();
                }
                updated.updated_at = self.clock.now();
                writes.push(Change::Put(updated.clone().into()));
                changes.push(RecordChange::of(Some(&order), Some(&updated)));
            }
        }

        self.store.commit(writes).await?;
        Ok(changes)
    }

    async fn drop_orphan(&self, kind: RecordKind, id: &str) -> Result<Vec<RecordChange>, RepairError> {
        let change = match kind {
            RecordKind::Order => {
                let order: Order = self.require(id).await?;
                RecordChange::of(Some(&order), None)
            }
            RecordKind::Visit => {
                let visit: Visit = self.require(id).await?;
                RecordChange::of(Some(&visit), None)
            }
            other => return Err(RepairError::NotDroppable(other)),
        };

        self.store.remove(kind, id).await?;
        Ok(vec![change])
    }

    async fn realign_device_models(&self, visit_id: &str) -> Result<Vec<RecordChange>, RepairError> {
        let visit: Visit = self.require(visit_id).await?;
        let order: Order = self.require(&visit.order_id).await?;

        let models = realign(&visit.device_models, order.devices.len()).map_err(|extra| {
            RepairError::WouldDropDeviceData {
                visit_id: visit_id.to_string(),
                extra,
            }
        })?;

        let mut updated = visit.clone();
        updated.device_models = models;
        updated.updated_at = self.clock.now();

        self.store.save(updated.clone().into()).await?;
        Ok(vec![RecordChange::of(Some(&visit), Some(&updated))])
    }

    async fn relink_visits(&self, order_id: &str) -> Result<Vec<RecordChange>, RepairError> {
        let order: Order = self.require(order_id).await?;

        let owned: Vec<String> = self
            .store
            .load_all(RecordKind::Visit)
            .await?
            .into_iter()
            .filter_map(|record| Visit::try_from(record).ok())
            .filter(|visit| visit.order_id == order.id)
            .map(|visit| visit.visit_id)
            .collect();

        let mut visit_ids: Vec<String> = order
            .visit_ids
            .iter()
            .filter(|id| owned.contains(*id))
            .cloned()
            .collect();
        visit_ids.dedup();
        for id in owned {
            if !visit_ids.contains(&id) {
                visit_ids.push(id);
            }
        }

        let mut updated = order.clone();
        updated.visit_ids = visit_ids;
        updated.updated_at = self.clock.now();

        self.store.save(updated.clone().into()).await?;
        Ok(vec![RecordChange::of(Some(&order), Some(&updated))])
    }
}

fn check_replacement(id: &str, created: NaiveDate) -> Result<(), RepairError> {
    let invalid = |reason: String| RepairError::InvalidReplacementId {
        id: id.to_string(),
        reason,
    };

    let parsed = parse_id(id).map_err(|e| invalid(e.to_string()))?;
    if parsed.kind() != IdKind::Visit {
        return Err(invalid(format!("it is a {} identifier", parsed.kind())));
    }
    if parsed.date != created {
        return Err(invalid(format!(
            "it encodes {} but the visit was created on {}",
            parsed.date, created
        )));
    }
    Ok(())
}

/// Places each model at its device index and stubs the gaps.
///
/// Returns the indices that have no slot (out of range or duplicated) as
/// the error, since keeping them is impossible without discarding data.
fn realign(models: &[DeviceModel], device_count: usize) -> Result<Vec<DeviceModel>, Vec<usize>> {
    let mut slots: Vec<Option<DeviceModel>> = vec![None; device_count];
    let mut extra = Vec::new();

    for model in models {
        match slots.get_mut(model.device_index) {
            Some(slot) if slot.is_none() => *slot = Some(model.clone()),
            _ => extra.push(model.device_index),
        }
    }

    if !extra.is_empty() {
        return Err(extra);
    }

    Ok(slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.unwrap_or_else(|| DeviceModel::stub(index)))
        .collect())
}
