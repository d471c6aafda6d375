use crate::error::StoreError;
use crate::ids::{parse_id, IdKind};
use crate::integrity::types::{
    DanglingVisitRef, DeviceIndexProblem, IntegrityReport, MisindexedDevices, MismatchedVisitId,
    OrphanedOrder, OrphanedVisit, VisitLinkProblem,
};
use crate::models::{Order, RecordKind, Visit};
use crate::store::{RecordStore, StoreSnapshot};

/// Checks referential integrity across a snapshot.
///
/// Read-only: nothing is corrected here. Findings go to the report and are
/// fixed only through an explicit repair strategy.
pub fn scan(snapshot: &StoreSnapshot) -> IntegrityReport {
    let mut report = IntegrityReport::default();

    for order in snapshot.orders.values() {
        scan_order(snapshot, order, &mut report);
    }
    for visit in snapshot.visits.values() {
        scan_visit(snapshot, visit, &mut report);
    }

    report
}

/// Loads a fresh snapshot from `store` and scans it.
pub async fn scan_store(store: &dyn RecordStore) -> Result<IntegrityReport, StoreError> {
    let snapshot = StoreSnapshot::load(store).await?;
    Ok(scan(&snapshot))
}

fn scan_order(snapshot: &StoreSnapshot, order: &Order, report: &mut IntegrityReport) {
    if !snapshot.clients.contains_key(&order.client_id) {
        report.orphaned_orders.push(OrphanedOrder {
            order_id: order.id.clone(),
            client_id: order.client_id.clone(),
        });
    }

    for (position, device) in order.devices.iter().enumerate() {
        if device.device_index != position {
            report.misindexed_devices.push(MisindexedDevices {
                kind: RecordKind::Order,
                id: order.id.clone(),
                problem: DeviceIndexProblem::Gap {
                    position,
                    found: device.device_index,
                },
            });
        }
    }

    for visit_id in &order.visit_ids {
        let problem = match snapshot.visits.get(visit_id) {
            None => Some(VisitLinkProblem::MissingVisit),
            Some(visit) if visit.order_id != order.id => Some(VisitLinkProblem::ForeignVisit {
                owner_id: visit.order_id.clone(),
            }),
            Some(_) => None,
        };
        if let Some(problem) = problem {
            report.dangling_visit_refs.push(DanglingVisitRef {
                order_id: order.id.clone(),
                visit_id: visit_id.clone(),
                problem,
            });
        }
    }
}

fn scan_visit(snapshot: &StoreSnapshot, visit: &Visit, report: &mut IntegrityReport) {
    let created = visit.created_at.date_naive();
    let encoded = parse_id(&visit.visit_id)
        .ok()
        .filter(|parsed| parsed.kind() == IdKind::Visit)
        .map(|parsed| parsed.date);
    if encoded != Some(created) {
        report.mismatched_visit_ids.push(MismatchedVisitId {
            visit_id: visit.visit_id.clone(),
            encoded,
            created,
        });
    }

    match snapshot.orders.get(&visit.order_id) {
        None => report.orphaned_visits.push(OrphanedVisit {
            visit_id: visit.visit_id.clone(),
            order_id: visit.order_id.clone(),
        }),
        Some(order) => {
            if !order.visit_ids.contains(&visit.visit_id) {
                report.dangling_visit_refs.push(DanglingVisitRef {
                    order_id: order.id.clone(),
                    visit_id: visit.visit_id.clone(),
                    problem: VisitLinkProblem::Unlisted,
                });
            }
            if order.devices.len() != visit.device_models.len() {
                report.misindexed_devices.push(MisindexedDevices {
                    kind: RecordKind::Visit,
                    id: visit.visit_id.clone(),
                    problem: DeviceIndexProblem::CountMismatch {
                        expected: order.devices.len(),
                        found: visit.device_models.len(),
                    },
                });
            }
        }
    }

    for (position, model) in visit.device_models.iter().enumerate() {
        if model.device_index != position {
            report.misindexed_devices.push(MisindexedDevices {
                kind: RecordKind::Visit,
                id: visit.visit_id.clone(),
                problem: DeviceIndexProblem::ModelIndex {
                    position,
                    found: model.device_index,
                },
            });
        }
    }
}
