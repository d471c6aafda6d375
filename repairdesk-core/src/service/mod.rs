//! Record lifecycle orchestration.
//!
//! [`RecordService`] is what HTTP or CLI entry points call. It strings the
//! pieces together in a fixed order: validate the draft, mint the ID,
//! validate the complete record, persist. State changes run under a
//! per-record lock and are persisted before any notification goes out.

pub mod locks;

#[cfg(test)]
mod tests;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{DeviceError, IdError, ServiceError, StoreError, ValidationError, ValidationErrors};
use crate::ids::{IdGenerator, IdScheme, SequenceCounter};
use crate::integrity::{scan_store, IntegrityReport, RepairFailure, RepairLog, RepairStrategy, Repairer};
use crate::models::{
    clean_text, Client, ClientStatus, DeviceModel, DeviceModelUpdate, IntakeSource, NewClient,
    NewDevice, NewOrder, NewPartRequest, NewVisit, Order, PartRequest, Record, RecordKind,
    StatusHistoryEntry, Technician, Visit,
};
use crate::store::{load, Change, RecordStore, StoreSnapshot};
use crate::validation::{validate, validate_draft, validate_update, ReferenceLookup, Validated};
use crate::workflow::{
    Actor, Notification, NotificationDispatcher, NotificationType, OrderStatus, PartRequestStatus,
    StatusMachine, Tracked, TransitionPolicy, VisitStatus, WorkflowEngine,
};

use locks::RecordLocks;

/// Behaviour switches for [`RecordService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Scheme for new order IDs
    pub order_scheme: IdScheme,
    /// Fall back to the high-volume order scheme when the daily capacity of
    /// the standard one is used up
    pub escalate_order_ids: bool,
    pub policy: TransitionPolicy,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            order_scheme: IdScheme::Order,
            escalate_order_ids: true,
            policy: TransitionPolicy::default(),
        }
    }
}

/// The client an order points at, resolved at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ClientRef {
    Resolved {
        id: String,
        name: String,
        phone: String,
        archived: bool,
    },
    /// The referenced client does not exist
    Dangling { id: String },
}

/// An order with its derived display data.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub order: Order,
    pub client: ClientRef,
    pub visits: Vec<Visit>,
    /// Entries of `visitIds` that could not be loaded
    pub missing_visit_ids: Vec<String>,
}

pub struct RecordService {
    store: Arc<dyn RecordStore>,
    ids: IdGenerator,
    engine: WorkflowEngine,
    repairer: Repairer,
    locks: RecordLocks,
    clock: Arc<dyn Clock>,
    settings: ServiceSettings,
}

fn initial_entry<S: StatusMachine>(actor: &Actor, at: DateTime<Utc>) -> StatusHistoryEntry<S> {
    StatusHistoryEntry {
        status: S::initial(),
        timestamp: at,
        actor: actor.role.as_str().to_string(),
        actor_id: actor.id.clone(),
        notes: None,
    }
}

fn rejected(error: ValidationError) -> ServiceError {
    ServiceError::Validation(ValidationErrors(vec![error]))
}

fn assignment_notification(visit: &Visit) -> Option<Notification> {
    let technician = visit.employee_id.as_deref()?;
    Some(
        Notification::new(
            technician,
            "New visit assigned",
            format!(
                "You have been assigned visit {} on {}.",
                visit.visit_id, visit.scheduled_date
            ),
            NotificationType::Info,
        )
        .with_link(format!("/visits/{}", visit.visit_id)),
    )
}

impl RecordService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        counter: Arc<dyn SequenceCounter>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Self {
        let ids = IdGenerator::new(counter);
        Self {
            repairer: Repairer::new(store.clone(), ids.clone(), clock.clone()),
            engine: WorkflowEngine::new(settings.policy, notifier),
            store,
            ids,
            locks: RecordLocks::new(),
            clock,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Raises the sequence counters past every ID already stored.
    ///
    /// Run once at startup, before the first ID is minted. Returns how many
    /// stored IDs could not be parsed.
    pub async fn seed_counters(&self) -> Result<usize, ServiceError> {
        let snapshot = StoreSnapshot::load(self.store.as_ref()).await?;
        let skipped = self.ids.seed(snapshot.generated_ids()).await?;
        if skipped > 0 {
            warn!("{} stored identifier(s) are malformed and were not counted", skipped);
        }
        info!("Sequence counters seeded from existing records");
        Ok(skipped)
    }

    /// Loads just the records `record` references.
    async fn references(&self, record: &Record) -> Result<StoreSnapshot, StoreError> {
        let mut wanted: Vec<(RecordKind, &str)> = Vec::new();
        match record {
            Record::Client(_) | Record::Technician(_) => {}
            Record::Order(order) => {
                wanted.push((RecordKind::Client, order.client_id.as_str()));
                wanted.extend(order.visit_ids.iter().map(|id| (RecordKind::Visit, id.as_str())));
            }
            Record::Visit(visit) => {
                wanted.push((RecordKind::Order, visit.order_id.as_str()));
                if let Some(employee_id) = &visit.employee_id {
                    wanted.push((RecordKind::Technician, employee_id.as_str()));
                }
            }
            Record::PartRequest(request) => {
                wanted.push((RecordKind::Technician, request.requested_by.as_str()));
                if let Some(order_id) = &request.order_id {
                    wanted.push((RecordKind::Order, order_id.as_str()));
                }
            }
        }

        let mut snapshot = StoreSnapshot::default();
        for (kind, id) in wanted {
            if let Some(found) = self.store.load_by_id(kind, id).await? {
                snapshot.insert(found);
            }
        }
        Ok(snapshot)
    }

    /// Validates a draft and returns the reference snapshot it was checked
    /// against.
    async fn check_draft(&self, record: &Record) -> Result<StoreSnapshot, ServiceError> {
        let lookup = self.references(record).await?;
        validate_draft(record, &lookup)?;
        Ok(lookup)
    }

    async fn persist(&self, record: Validated<Record>) -> Result<(), StoreError> {
        self.store.save(record.into_inner()).await
    }

    async fn require<T: crate::models::TypedRecord>(&self, id: &str) -> Result<T, ServiceError> {
        load::<T>(self.store.as_ref(), id)
            .await?
            .ok_or_else(|| ServiceError::not_found(T::KIND, id))
    }

    async fn mint_order_id(&self, source: IntakeSource, date: NaiveDate) -> Result<String, IdError> {
        let scheme = self.settings.order_scheme;
        if self.settings.escalate_order_ids {
            self.ids
                .next_id_escalating(scheme, source.source_tag(), date)
                .await
        } else {
            self.ids.next_id(scheme, source.source_tag(), date).await
        }
    }

    pub async fn create_client(&self, input: NewClient) -> Result<Client, ServiceError> {
        let now = self.clock.now();
        let mut client = Client {
            id: String::new(),
            name: clean_text(input.name.as_deref()),
            first_name: clean_text(input.first_name.as_deref()),
            last_name: clean_text(input.last_name.as_deref()),
            phone: input.phone.trim().to_string(),
            email: clean_text(input.email.as_deref()),
            address: input.address,
            status: ClientStatus::Active,
            source: input.source,
            created_at: now,
            updated_at: now,
        };

        let lookup = self.check_draft(&client.clone().into()).await?;
        client.id = self
            .ids
            .next_id(IdScheme::Client, input.source.source_tag(), now.date_naive())
            .await?;
        self.persist(validate(client.clone().into(), &lookup)?).await?;

        info!("Created client {}", client.id);
        Ok(client)
    }

    /// Soft-deletes a client. Clients are never removed from the store.
    pub async fn archive_client(&self, client_id: &str) -> Result<Client, ServiceError> {
        let _guard = self.locks.acquire(RecordKind::Client, client_id).await;
        let mut client: Client = self.require(client_id).await?;

        if !client.is_archived() {
            client.status = ClientStatus::Archived;
            client.updated_at = self.clock.now();
            self.store.save(client.clone().into()).await?;
            info!("Archived client {}", client.id);
        }
        Ok(client)
    }

    /// Registers a technician or updates an existing one.
    pub async fn register_technician(&self, technician: Technician) -> Result<Technician, ServiceError> {
        let technician = Technician {
            id: technician.id.trim().to_string(),
            name: technician.name.trim().to_string(),
            phone: clean_text(technician.phone.as_deref()),
            active: technician.active,
        };
        self.persist(validate(technician.clone().into(), &StoreSnapshot::default())?)
            .await?;

        info!("Registered technician {}", technician.id);
        Ok(technician)
    }

    /// Creates an order for an existing, active client.
    ///
    /// The ID is minted only after the draft passed validation. With
    /// escalation enabled a day's 1000th order gets an `ORDA` ID instead of
    /// failing with a sequence overflow.
    pub async fn create_order(&self, input: NewOrder, actor: &Actor) -> Result<Order, ServiceError> {
        let now = self.clock.now();
        let mut order = Order {
            id: String::new(),
            client_id: input.client_id.trim().to_string(),
            devices: input
                .devices
                .into_iter()
                .enumerate()
                .map(|(index, device)| device.into_device(index))
                .collect(),
            status: OrderStatus::initial(),
            priority: input.priority,
            visit_ids: Vec::new(),
            source: input.source,
            notes: clean_text(input.notes.as_deref()),
            archived: false,
            status_history: vec![initial_entry(actor, now)],
            created_at: now,
            updated_at: now,
        };

        let lookup = self.check_draft(&order.clone().into()).await?;
        if lookup.client(&order.client_id).is_some_and(Client::is_archived) {
            return Err(rejected(ValidationError::InvalidField {
                record: RecordKind::Order,
                field: "clientId".to_string(),
                reason: format!("client '{}' is archived", order.client_id),
            }));
        }

        order.id = self.mint_order_id(order.source, now.date_naive()).await?;
        self.persist(validate(order.clone().into(), &lookup)?).await?;

        info!(
            "Created order {} for client {} with {} device(s)",
            order.id,
            order.client_id,
            order.devices.len()
        );
        Ok(order)
    }

    /// Loads an order with its client and visits.
    ///
    /// A missing client does not fail the read; it is reported as
    /// [`ClientRef::Dangling`] and left for the integrity repair.
    pub async fn order_view(&self, order_id: &str) -> Result<OrderView, ServiceError> {
        let order: Order = self.require(order_id).await?;

        let client = match load::<Client>(self.store.as_ref(), &order.client_id).await? {
            Some(client) => ClientRef::Resolved {
                name: client.display_name(),
                archived: client.is_archived(),
                phone: client.phone,
                id: client.id,
            },
            None => {
                warn!(
                    "Order {} references missing client {}",
                    order.id, order.client_id
                );
                ClientRef::Dangling {
                    id: order.client_id.clone(),
                }
            }
        };

        let mut visits = Vec::with_capacity(order.visit_ids.len());
        let mut missing_visit_ids = Vec::new();
        for visit_id in &order.visit_ids {
            match load::<Visit>(self.store.as_ref(), visit_id).await? {
                Some(visit) => visits.push(visit),
                None => {
                    warn!("Order {} references missing visit {}", order.id, visit_id);
                    missing_visit_ids.push(visit_id.clone());
                }
            }
        }

        Ok(OrderView {
            order,
            client,
            visits,
            missing_visit_ids,
        })
    }

    /// Loads, transitions and stores a record under its lock, then emits
    /// the notification for the change.
    async fn transition_record<R: Tracked>(
        &self,
        id: &str,
        target: R::Status,
        actor: &Actor,
        notes: Option<&str>,
    ) -> Result<R, ServiceError> {
        let guard = self.locks.acquire(R::KIND, id).await;

        let record: R = self.require(id).await?;
        let previous = record.status();
        let updated = self
            .engine
            .transition(&record, target, actor, notes, self.clock.now())?;
        self.store.save(updated.clone().into()).await?;

        drop(guard);
        self.engine.announce(&updated, previous, actor);
        Ok(updated)
    }

    pub async fn transition_order(
        &self,
        order_id: &str,
        target: OrderStatus,
        actor: &Actor,
        notes: Option<&str>,
    ) -> Result<Order, ServiceError> {
        self.transition_record(order_id, target, actor, notes).await
    }

    /// Dispatches a visit for an order.
    ///
    /// The visit ID encodes the visit's own creation day, and the visit
    /// starts with one empty device model per order device.
    pub async fn create_visit(&self, input: NewVisit, actor: &Actor) -> Result<Visit, ServiceError> {
        let guard = self.locks.acquire(RecordKind::Order, &input.order_id).await;

        let order: Order = self.require(&input.order_id).await?;
        if order.status.is_terminal() {
            return Err(ServiceError::Closed {
                kind: RecordKind::Order,
                id: order.id,
                status: order.status.to_string(),
            });
        }

        let now = self.clock.now();
        let mut visit = Visit {
            visit_id: String::new(),
            order_id: order.id.clone(),
            visit_type: input.visit_type,
            status: VisitStatus::initial(),
            scheduled_date: input.scheduled_date,
            employee_id: clean_text(input.employee_id.as_deref()),
            device_models: (0..order.devices.len()).map(DeviceModel::stub).collect(),
            notes: clean_text(input.notes.as_deref()),
            status_history: vec![initial_entry(actor, now)],
            created_at: now,
            updated_at: now,
        };

        let lookup = self.check_draft(&visit.clone().into()).await?;
        visit.visit_id = self
            .ids
            .next_id(IdScheme::Visit, None, visit.created_at.date_naive())
            .await?;
        let validated = validate(visit.clone().into(), &lookup)?;

        let mut updated_order = order;
        updated_order.visit_ids.push(visit.visit_id.clone());
        updated_order.updated_at = now;
        self.store
            .commit(vec![
                Change::Put(validated.into_inner()),
                Change::Put(updated_order.into()),
            ])
            .await?;
        drop(guard);

        info!("Created visit {} for order {}", visit.visit_id, visit.order_id);
        if let Some(notification) = assignment_notification(&visit) {
            self.engine.notify(notification);
        }
        Ok(visit)
    }

    /// Assigns an active technician to an open visit and notifies them.
    pub async fn assign_technician(
        &self,
        visit_id: &str,
        employee_id: &str,
        actor: &Actor,
    ) -> Result<Visit, ServiceError> {
        let guard = self.locks.acquire(RecordKind::Visit, visit_id).await;

        let mut visit: Visit = self.require(visit_id).await?;
        if visit.status.is_terminal() {
            return Err(ServiceError::Closed {
                kind: RecordKind::Visit,
                id: visit.visit_id,
                status: visit.status.to_string(),
            });
        }

        match load::<Technician>(self.store.as_ref(), employee_id).await? {
            None => {
                return Err(rejected(ValidationError::DanglingReference {
                    record: RecordKind::Visit,
                    field: "employeeId".to_string(),
                    target: RecordKind::Technician,
                    value: employee_id.to_string(),
                }))
            }
            Some(technician) if !technician.active => {
                return Err(rejected(ValidationError::InvalidField {
                    record: RecordKind::Visit,
                    field: "employeeId".to_string(),
                    reason: format!("technician '{}' is inactive", employee_id),
                }))
            }
            Some(_) => {}
        }

        visit.employee_id = Some(employee_id.to_string());
        visit.updated_at = self.clock.now();
        self.store.save(visit.clone().into()).await?;
        drop(guard);

        info!(
            "Assigned technician {} to visit {} by {}",
            employee_id, visit.visit_id, actor
        );
        if let Some(notification) = assignment_notification(&visit) {
            self.engine.notify(notification);
        }
        Ok(visit)
    }

    pub async fn transition_visit(
        &self,
        visit_id: &str,
        target: VisitStatus,
        actor: &Actor,
        notes: Option<&str>,
    ) -> Result<Visit, ServiceError> {
        self.transition_record(visit_id, target, actor, notes).await
    }

    /// Appends a device to an order and a matching stub to each of its
    /// visits, all in one batch.
    ///
    /// Only allowed while the order is `new` or `assigned`.
    pub async fn add_device(&self, order_id: &str, input: NewDevice) -> Result<Order, ServiceError> {
        let _order_guard = self.locks.acquire(RecordKind::Order, order_id).await;

        let mut order: Order = self.require(order_id).await?;
        if !order.accepts_devices() {
            return Err(DeviceError::OrderLocked {
                order_id: order.id,
                status: order.status.to_string(),
            }
            .into());
        }

        let _visit_guard = self
            .locks
            .acquire_many(
                order
                    .visit_ids
                    .iter()
                    .map(|id| (RecordKind::Visit, id.clone()))
                    .collect(),
            )
            .await;

        let index = order.devices.len();
        order.devices.push(input.into_device(index));
        order.updated_at = self.clock.now();

        let mut visits = Vec::with_capacity(order.visit_ids.len());
        for visit_id in &order.visit_ids {
            match load::<Visit>(self.store.as_ref(), visit_id).await? {
                Some(mut visit) => {
                    visit.device_models.push(DeviceModel::stub(index));
                    visit.updated_at = order.updated_at;
                    visits.push(visit);
                }
                None => warn!(
                    "Order {} references missing visit {}; no device stub added",
                    order.id, visit_id
                ),
            }
        }

        let lookup = self.references(&order.clone().into()).await?;
        let validated = validate_update(order.clone().into(), &lookup)?;

        let mut changes = vec![Change::Put(validated.into_inner())];
        changes.extend(visits.into_iter().map(|visit| Change::Put(visit.into())));
        self.store.commit(changes).await?;

        info!("Added device {} to order {}", index, order.id);
        Ok(order)
    }

    /// Records work on one device of a visit.
    ///
    /// Device sub-states move forward independently of each other; a state
    /// change must follow the device workflow.
    pub async fn update_device_model(
        &self,
        visit_id: &str,
        device_index: usize,
        update: DeviceModelUpdate,
    ) -> Result<Visit, ServiceError> {
        let _guard = self.locks.acquire(RecordKind::Visit, visit_id).await;

        let mut visit: Visit = self.require(visit_id).await?;
        if visit.status.is_terminal() {
            return Err(DeviceError::VisitClosed {
                visit_id: visit.visit_id,
                status: visit.status.to_string(),
            }
            .into());
        }

        let model = visit
            .device_models
            .get_mut(device_index)
            .ok_or_else(|| DeviceError::UnknownDevice {
                visit_id: visit_id.to_string(),
                index: device_index,
            })?;

        if let Some(state) = update.state {
            if state != model.state && !model.state.can_transition(state) {
                return Err(DeviceError::InvalidDeviceTransition {
                    index: device_index,
                    from: model.state.to_string(),
                    to: state.to_string(),
                }
                .into());
            }
            model.state = state;
        }
        if let Some(scan) = update.scan {
            model.scan = Some(scan);
        }
        if let Some(diagnosis) = clean_text(update.diagnosis.as_deref()) {
            model.diagnosis = Some(diagnosis);
        }
        if let Some(cost) = update.cost {
            model.cost = Some(cost);
        }
        if let Some(notes) = clean_text(update.notes.as_deref()) {
            model.notes = Some(notes);
        }
        let state = model.state;

        visit.updated_at = self.clock.now();
        self.store.save(visit.clone().into()).await?;

        debug!(
            "Visit {} device {} is now {}",
            visit.visit_id, device_index, state
        );
        Ok(visit)
    }

    pub async fn create_part_request(
        &self,
        input: NewPartRequest,
        actor: &Actor,
    ) -> Result<PartRequest, ServiceError> {
        let now = self.clock.now();
        let request = PartRequest {
            id: Uuid::new_v4(),
            order_id: clean_text(input.order_id.as_deref()),
            requested_by: input.requested_by.trim().to_string(),
            part_name: input.part_name.trim().to_string(),
            quantity: input.quantity,
            status: PartRequestStatus::initial(),
            status_history: vec![initial_entry(actor, now)],
            created_at: now,
            updated_at: now,
        };

        let record: Record = request.clone().into();
        let lookup = self.references(&record).await?;
        self.persist(validate(record, &lookup)?).await?;

        info!(
            "Created part request {} for {} x {}",
            request.id, request.quantity, request.part_name
        );
        Ok(request)
    }

    pub async fn transition_part_request(
        &self,
        request_id: Uuid,
        target: PartRequestStatus,
        actor: &Actor,
        notes: Option<&str>,
    ) -> Result<PartRequest, ServiceError> {
        self.transition_record(&request_id.to_string(), target, actor, notes)
            .await
    }

    /// Scans the whole store. Read-only.
    pub async fn integrity_report(&self) -> Result<IntegrityReport, ServiceError> {
        Ok(scan_store(self.store.as_ref()).await?)
    }

    /// Locks a strategy needs: its target, plus the parent order of a
    /// target visit.
    async fn repair_lock_keys(
        &self,
        strategy: &RepairStrategy,
    ) -> Result<Vec<(RecordKind, String)>, StoreError> {
        let (kind, id) = strategy.target();
        let mut keys = vec![(kind, id.to_string())];
        if kind == RecordKind::Visit {
            if let Some(visit) = load::<Visit>(self.store.as_ref(), id).await? {
                keys.push((RecordKind::Order, visit.order_id));
            }
        }
        Ok(keys)
    }

    /// Applies operator-chosen repairs for findings in `report`.
    ///
    /// Each strategy runs under the locks of the records it touches. A
    /// failed strategy is recorded in the log and the rest still run.
    pub async fn repair(
        &self,
        report: &IntegrityReport,
        strategies: Vec<RepairStrategy>,
    ) -> Result<RepairLog, ServiceError> {
        let mut log = RepairLog::default();

        for strategy in strategies {
            let keys = self.repair_lock_keys(&strategy).await?;
            let _guard = self.locks.acquire_many(keys).await;

            match self.repairer.apply(report, &strategy).await {
                Ok(action) => log.actions.push(action),
                Err(e) => {
                    warn!("Repair {:?} failed: {}", strategy, e);
                    log.failures.push(RepairFailure {
                        strategy,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Repair finished: {} applied, {} failed",
            log.actions.len(),
            log.failures.len()
        );
        Ok(log)
    }
}
