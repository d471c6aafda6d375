use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::clock::ManualClock;
use crate::error::{DeviceError, IdError, ServiceError, TransitionError, ValidationError};
use crate::ids::{IdKind, InMemorySequenceCounter, SequenceCounter};
use crate::integrity::{DeviceIndexProblem, RepairStrategy};
use crate::models::{
    Client, DeviceModelUpdate, IntakeSource, NewClient, NewDevice, NewOrder, NewPartRequest,
    NewVisit, Order, Record, RecordKind, Technician, Visit, VisitType,
};
use crate::service::{ClientRef, RecordService, ServiceSettings};
use crate::store::{load, InMemoryStore, RecordStore};
use crate::workflow::{
    Actor, ChannelNotifier, DeviceWorkState, Notification, OrderStatus, PartRequestStatus,
    VisitStatus,
};

struct Harness {
    service: Arc<RecordService>,
    store: InMemoryStore,
    clock: Arc<ManualClock>,
    counter: Arc<InMemorySequenceCounter>,
    notifications: UnboundedReceiver<Notification>,
}

fn day(ordinal: u32) -> DateTime<Utc> {
    let date = NaiveDate::from_yo_opt(2025, ordinal).unwrap();
    Utc.from_utc_datetime(&date.and_hms_opt(9, 0, 0).unwrap())
}

fn harness_with(settings: ServiceSettings) -> Harness {
    let store = InMemoryStore::new();
    let clock = Arc::new(ManualClock::new(day(271)));
    let counter = Arc::new(InMemorySequenceCounter::new());
    let (notifier, notifications) = ChannelNotifier::new();
    let service = RecordService::new(
        Arc::new(store.clone()),
        counter.clone(),
        Arc::new(notifier),
        clock.clone(),
        settings,
    );
    Harness {
        service: Arc::new(service),
        store,
        clock,
        counter,
        notifications,
    }
}

fn harness() -> Harness {
    harness_with(ServiceSettings::default())
}

fn admin() -> Actor {
    Actor::admin("ADM1")
}

fn new_client(name: &str) -> NewClient {
    NewClient {
        name: Some(name.to_string()),
        phone: "+48 600 100 200".to_string(),
        email: Some("klient@example.com".to_string()),
        ..Default::default()
    }
}

fn new_device(device_type: &str) -> NewDevice {
    NewDevice {
        device_type: device_type.to_string(),
        brand: "Bosch".to_string(),
        model: "WAN28".to_string(),
        ..Default::default()
    }
}

fn new_order(client_id: &str, devices: usize) -> NewOrder {
    NewOrder {
        client_id: client_id.to_string(),
        devices: (0..devices).map(|_| new_device("washing machine")).collect(),
        ..Default::default()
    }
}

fn new_visit(order_id: &str, employee_id: Option<&str>) -> NewVisit {
    NewVisit {
        order_id: order_id.to_string(),
        visit_type: VisitType::Diagnosis,
        scheduled_date: NaiveDate::from_yo_opt(2025, 275).unwrap(),
        employee_id: employee_id.map(str::to_string),
        notes: None,
    }
}

fn technician(id: &str) -> Technician {
    Technician {
        id: id.to_string(),
        name: "Piotr Wiśniewski".to_string(),
        phone: None,
        active: true,
    }
}

async fn order_for_new_client(h: &Harness, devices: usize) -> Order {
    let client = h.service.create_client(new_client("Anna Nowak")).await.unwrap();
    h.service
        .create_order(new_order(&client.id, devices), &admin())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_client_ids_follow_the_daily_sequence() {
    let h = harness();
    let mut ids = Vec::new();
    for name in ["Anna Nowak", "Jan Kowalski", "Ewa Lis"] {
        ids.push(h.service.create_client(new_client(name)).await.unwrap().id);
    }
    assert_eq!(ids, ["CLI25271001", "CLI25271002", "CLI25271003"]);

    let web = h
        .service
        .create_client(NewClient {
            source: IntakeSource::WebForm,
            ..new_client("Marek Zając")
        })
        .await
        .unwrap();
    assert_eq!(web.id, "CLIW25271004");
}

#[tokio::test]
async fn test_rejected_client_does_not_burn_a_sequence_number() {
    let h = harness();
    let err = h
        .service
        .create_client(NewClient {
            phone: " ".to_string(),
            email: Some("not-an-email".to_string()),
            ..new_client("Anna Nowak")
        })
        .await
        .unwrap_err();

    match err {
        ServiceError::Validation(errors) => assert_eq!(errors.len(), 2),
        other => panic!("expected validation errors, got {:?}", other),
    }
    assert_eq!(
        h.counter.current(IdKind::Client, day(271).date_naive()).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn test_order_for_unknown_client_is_rejected() {
    let h = harness();
    let err = h
        .service
        .create_order(new_order("CLI999999999", 1), &admin())
        .await
        .unwrap_err();

    let ServiceError::Validation(errors) = err else {
        panic!("expected validation errors");
    };
    assert!(errors.iter().any(|e| matches!(
        e,
        ValidationError::DanglingReference { field, value, .. }
            if field == "clientId" && value == "CLI999999999"
    )));

    let order = order_for_new_client(&h, 1).await;
    assert_eq!(order.id, "ORD25271001");
}

#[tokio::test]
async fn test_archived_clients_take_no_new_orders() {
    let h = harness();
    let client = h.service.create_client(new_client("Anna Nowak")).await.unwrap();
    let archived = h.service.archive_client(&client.id).await.unwrap();
    assert!(archived.is_archived());

    let err = h
        .service
        .create_order(new_order(&client.id, 1), &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert!(load::<Client>(&h.store, &client.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_completed_order_cannot_be_reassigned() {
    let h = harness();
    let order = order_for_new_client(&h, 1).await;
    for target in [OrderStatus::Assigned, OrderStatus::InProgress, OrderStatus::Completed] {
        h.service
            .transition_order(&order.id, target, &admin(), None)
            .await
            .unwrap();
    }

    let err = h
        .service
        .transition_order(&order.id, OrderStatus::Assigned, &admin(), None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Transition(TransitionError::InvalidTransition { .. })
    ));
    let stored: Order = load(&h.store, &order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Completed);
    assert!(stored.archived);
    assert_eq!(stored.status_history.len(), 4);
}

#[tokio::test]
async fn test_client_cancellation_needs_a_reason() {
    let h = harness();
    let order = order_for_new_client(&h, 1).await;
    let client = Actor::client(order.client_id.clone());

    let err = h
        .service
        .transition_order(&order.id, OrderStatus::Cancelled, &client, Some("no"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Transition(TransitionError::CancellationReasonRequired { min_chars: 5 })
    ));

    let cancelled = h
        .service
        .transition_order(
            &order.id,
            OrderStatus::Cancelled,
            &client,
            Some("Klient zmienił decyzję"),
        )
        .await
        .unwrap();

    let entry = cancelled.status_history.last().unwrap();
    assert_eq!(entry.status, OrderStatus::Cancelled);
    assert_eq!(entry.actor, "client");
    assert_eq!(entry.notes.as_deref(), Some("Klient zmienił decyzję"));
    assert_eq!(cancelled.status_history.len(), 2);
}

#[tokio::test]
async fn test_order_ids_escalate_after_the_999th_of_the_day() {
    let h = harness();
    let client = h.service.create_client(new_client("Anna Nowak")).await.unwrap();
    h.counter
        .seed(IdKind::Order, day(271).date_naive(), 998)
        .await
        .unwrap();

    let last_standard = h
        .service
        .create_order(new_order(&client.id, 1), &admin())
        .await
        .unwrap();
    let escalated = h
        .service
        .create_order(new_order(&client.id, 1), &admin())
        .await
        .unwrap();

    assert_eq!(last_standard.id, "ORD25271999");
    assert_eq!(escalated.id, "ORDA252711000");
    assert!(escalated.id > last_standard.id);
}

#[tokio::test]
async fn test_web_form_orders_keep_their_order_past_the_999th() {
    let h = harness();
    let client = h.service.create_client(new_client("Anna Nowak")).await.unwrap();
    h.counter
        .seed(IdKind::Order, day(271).date_naive(), 998)
        .await
        .unwrap();
    let web_order = || NewOrder {
        source: IntakeSource::WebForm,
        ..new_order(&client.id, 1)
    };

    let last = h.service.create_order(web_order(), &admin()).await.unwrap();
    assert_eq!(last.id, "ORDW25271999");

    let err = h.service.create_order(web_order(), &admin()).await.unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Id(IdError::SequenceOverflow { capacity: 999, .. })
    ));

    let manual = h
        .service
        .create_order(new_order(&client.id, 1), &admin())
        .await
        .unwrap();
    assert_eq!(manual.id, "ORDA252711000");
}

#[tokio::test]
async fn test_thousandth_order_overflows_without_escalation() {
    let h = harness_with(ServiceSettings {
        escalate_order_ids: false,
        ..ServiceSettings::default()
    });
    let client = h.service.create_client(new_client("Anna Nowak")).await.unwrap();
    h.counter
        .seed(IdKind::Order, day(271).date_naive(), 999)
        .await
        .unwrap();

    let err = h
        .service
        .create_order(new_order(&client.id, 1), &admin())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Id(IdError::SequenceOverflow { capacity: 999, .. })
    ));
}

#[tokio::test]
async fn test_visit_id_carries_the_visit_creation_day() {
    let h = harness();
    h.service.register_technician(technician("EMP1")).await.unwrap();
    let order = order_for_new_client(&h, 2).await;

    h.clock.set(day(272));
    let visit = h
        .service
        .create_visit(new_visit(&order.id, Some("EMP1")), &admin())
        .await
        .unwrap();

    assert_eq!(visit.visit_id, "VIS25272001");
    assert_eq!(visit.device_models.len(), 2);
    let stored: Order = load(&h.store, &order.id).await.unwrap().unwrap();
    assert_eq!(stored.visit_ids, vec![visit.visit_id.clone()]);
    assert!(h.service.integrity_report().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_assigning_a_technician_notifies_them() {
    let mut h = harness();
    h.service.register_technician(technician("EMP7")).await.unwrap();
    let order = order_for_new_client(&h, 1).await;
    let visit = h
        .service
        .create_visit(new_visit(&order.id, None), &admin())
        .await
        .unwrap();

    let err = h
        .service
        .assign_technician(&visit.visit_id, "EMP404", &admin())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let assigned = h
        .service
        .assign_technician(&visit.visit_id, "EMP7", &admin())
        .await
        .unwrap();
    assert_eq!(assigned.employee_id.as_deref(), Some("EMP7"));

    let notification = h.notifications.try_recv().unwrap();
    assert_eq!(notification.recipient_id, "EMP7");
    assert_eq!(
        notification.link.as_deref(),
        Some(format!("/visits/{}", visit.visit_id).as_str())
    );
}

#[tokio::test]
async fn test_completing_an_order_notifies_the_client() {
    let mut h = harness();
    let order = order_for_new_client(&h, 1).await;
    for target in [OrderStatus::Assigned, OrderStatus::InProgress, OrderStatus::Completed] {
        h.service
            .transition_order(&order.id, target, &admin(), None)
            .await
            .unwrap();
    }

    let notification = h.notifications.try_recv().unwrap();
    assert_eq!(notification.recipient_id, order.client_id);
    assert_eq!(notification.title, "Order completed");
    assert!(h.notifications.try_recv().is_err());
}

#[tokio::test]
async fn test_adding_a_device_stubs_every_visit() {
    let h = harness();
    let order = order_for_new_client(&h, 1).await;
    let first = h
        .service
        .create_visit(new_visit(&order.id, None), &admin())
        .await
        .unwrap();
    let second = h
        .service
        .create_visit(new_visit(&order.id, None), &admin())
        .await
        .unwrap();

    let updated = h
        .service
        .add_device(&order.id, new_device("dryer"))
        .await
        .unwrap();

    assert_eq!(updated.devices.len(), 2);
    assert_eq!(updated.devices[1].device_index, 1);
    for visit_id in [&first.visit_id, &second.visit_id] {
        let visit: Visit = load(&h.store, visit_id).await.unwrap().unwrap();
        assert_eq!(visit.device_models.len(), 2);
        assert_eq!(visit.device_models[1].device_index, 1);
        assert_eq!(visit.device_models[1].state, DeviceWorkState::PendingScan);
    }
    assert!(h.service.integrity_report().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_stale_visit_ids_do_not_block_new_devices() {
    let h = harness();
    let order = order_for_new_client(&h, 1).await;
    let visit = h
        .service
        .create_visit(new_visit(&order.id, None), &admin())
        .await
        .unwrap();

    let mut stale: Order = load(&h.store, &order.id).await.unwrap().unwrap();
    stale.visit_ids.push("VIS25271042".to_string());
    h.store.save(stale.into()).await.unwrap();

    let updated = h
        .service
        .add_device(&order.id, new_device("dryer"))
        .await
        .unwrap();

    assert_eq!(updated.devices.len(), 2);
    assert_eq!(updated.visit_ids, vec![visit.visit_id.clone(), "VIS25271042".to_string()]);
    let stubbed: Visit = load(&h.store, &visit.visit_id).await.unwrap().unwrap();
    assert_eq!(stubbed.device_models.len(), 2);

    let report = h.service.integrity_report().await.unwrap();
    assert!(report.flags_visit_refs(&order.id));
}

#[tokio::test]
async fn test_devices_are_frozen_once_work_starts() {
    let h = harness();
    let order = order_for_new_client(&h, 1).await;
    h.service
        .transition_order(&order.id, OrderStatus::Assigned, &admin(), None)
        .await
        .unwrap();
    h.service
        .transition_order(&order.id, OrderStatus::InProgress, &admin(), None)
        .await
        .unwrap();

    let err = h
        .service
        .add_device(&order.id, new_device("dryer"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::Device(DeviceError::OrderLocked { .. })
    ));
}

#[tokio::test]
async fn test_visit_completes_only_when_every_device_is_settled() {
    let h = harness();
    let order = order_for_new_client(&h, 2).await;
    let visit = h
        .service
        .create_visit(new_visit(&order.id, None), &admin())
        .await
        .unwrap();
    let technician = Actor::technician("EMP1");
    h.service
        .transition_visit(&visit.visit_id, VisitStatus::InProgress, &technician, None)
        .await
        .unwrap();

    let skip = DeviceModelUpdate {
        state: Some(DeviceWorkState::Resolved),
        ..Default::default()
    };
    let err = h
        .service
        .update_device_model(&visit.visit_id, 0, skip)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Device(DeviceError::InvalidDeviceTransition { index: 0, .. })
    ));

    for state in [DeviceWorkState::Scanned, DeviceWorkState::Diagnosed, DeviceWorkState::Resolved] {
        h.service
            .update_device_model(
                &visit.visit_id,
                0,
                DeviceModelUpdate {
                    state: Some(state),
                    diagnosis: Some("Worn drum bearing".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let err = h
        .service
        .transition_visit(&visit.visit_id, VisitStatus::Completed, &technician, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Transition(TransitionError::DevicesUnresolved { ref pending }) if pending == &[1]
    ));

    h.service
        .update_device_model(
            &visit.visit_id,
            1,
            DeviceModelUpdate {
                state: Some(DeviceWorkState::Skipped),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let completed = h
        .service
        .transition_visit(&visit.visit_id, VisitStatus::Completed, &technician, None)
        .await
        .unwrap();

    assert_eq!(completed.status, VisitStatus::Completed);
    assert_eq!(
        completed.device_models[0].diagnosis.as_deref(),
        Some("Worn drum bearing")
    );
    let err = h
        .service
        .update_device_model(&visit.visit_id, 0, DeviceModelUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Device(DeviceError::VisitClosed { .. })));
}

#[tokio::test]
async fn test_short_visit_is_reported_as_misindexed() {
    let h = harness();
    let order = order_for_new_client(&h, 2).await;
    let visit = h
        .service
        .create_visit(new_visit(&order.id, None), &admin())
        .await
        .unwrap();

    let mut broken = visit.clone();
    broken.device_models.truncate(1);
    h.store.save(Record::Visit(broken)).await.unwrap();

    let report = h.service.integrity_report().await.unwrap();
    assert_eq!(report.misindexed_devices.len(), 1);
    assert_eq!(
        report.misindexed_devices[0].problem,
        DeviceIndexProblem::CountMismatch {
            expected: 2,
            found: 1
        }
    );
}

#[tokio::test]
async fn test_order_view_flags_a_missing_client() {
    let h = harness();
    let order = order_for_new_client(&h, 1).await;

    let view = h.service.order_view(&order.id).await.unwrap();
    assert!(matches!(view.client, ClientRef::Resolved { ref name, .. } if name == "Anna Nowak"));

    let mut orphan = order.clone();
    orphan.client_id = "CLI25271999".to_string();
    h.store.save(orphan.into()).await.unwrap();

    let view = h.service.order_view(&order.id).await.unwrap();
    assert_eq!(
        view.client,
        ClientRef::Dangling {
            id: "CLI25271999".to_string()
        }
    );
}

#[tokio::test]
async fn test_repair_fixes_an_orphaned_order() {
    let h = harness();
    let order = order_for_new_client(&h, 1).await;
    let mut orphan = order.clone();
    orphan.client_id = "CLI25271999".to_string();
    h.store.save(orphan.into()).await.unwrap();

    let report = h.service.integrity_report().await.unwrap();
    let log = h
        .service
        .repair(
            &report,
            vec![
                RepairStrategy::ReassignToClient {
                    order_id: order.id.clone(),
                    client_id: order.client_id.clone(),
                },
                RepairStrategy::DropOrphan {
                    kind: RecordKind::Client,
                    id: order.client_id.clone(),
                },
            ],
        )
        .await
        .unwrap();

    assert_eq!(log.actions.len(), 1);
    assert_eq!(log.failures.len(), 1);
    assert!(h.service.integrity_report().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_part_requests_follow_their_workflow() {
    let mut h = harness();
    h.service.register_technician(technician("EMP3")).await.unwrap();
    let order = order_for_new_client(&h, 1).await;

    let request = h
        .service
        .create_part_request(
            NewPartRequest {
                order_id: Some(order.id.clone()),
                requested_by: "EMP3".to_string(),
                part_name: "Drum bearing 6205".to_string(),
                quantity: 2,
            },
            &Actor::technician("EMP3"),
        )
        .await
        .unwrap();
    assert_eq!(request.status, PartRequestStatus::Pending);

    let approved = h
        .service
        .transition_part_request(request.id, PartRequestStatus::Approved, &admin(), None)
        .await
        .unwrap();
    assert_eq!(approved.status_history.len(), 2);
    assert_eq!(h.notifications.try_recv().unwrap().recipient_id, "EMP3");

    let err = h
        .service
        .transition_part_request(request.id, PartRequestStatus::Rejected, &admin(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Transition(_)));
}

#[tokio::test]
async fn test_concurrent_intake_never_duplicates_ids() {
    let h = harness();
    let mut handles = Vec::new();
    for i in 0..25 {
        let service = h.service.clone();
        handles.push(tokio::spawn(async move {
            service
                .create_client(new_client(&format!("Client {}", i)))
                .await
                .map(|client| client.id)
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        assert!(ids.insert(handle.await.unwrap().unwrap()));
    }
    assert_eq!(ids.len(), 25);
}

#[tokio::test]
async fn test_concurrent_transitions_on_one_order_are_serialized() {
    let h = harness();
    let order = order_for_new_client(&h, 1).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = h.service.clone();
        let order_id = order.id.clone();
        handles.push(tokio::spawn(async move {
            service
                .transition_order(&order_id, OrderStatus::Assigned, &Actor::system(), None)
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            succeeded += 1;
        }
    }

    assert_eq!(succeeded, 1);
    let stored: Order = load(&h.store, &order.id).await.unwrap().unwrap();
    assert_eq!(stored.status_history.len(), 2);
}

#[tokio::test]
async fn test_counters_resume_after_existing_records() {
    let source = harness();
    let mut imported = source.service.create_client(new_client("Anna Nowak")).await.unwrap();
    imported.id = "CLI25271005".to_string();

    let h = harness();
    h.store.save(imported.into()).await.unwrap();
    h.clock.advance(Duration::minutes(5));

    assert_eq!(h.service.seed_counters().await.unwrap(), 0);
    let next = h.service.create_client(new_client("Jan Kowalski")).await.unwrap();
    assert_eq!(next.id, "CLI25271006");
}
