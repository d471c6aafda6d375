use chrono::{DateTime, Utc};
use validator::ValidateEmail;

use crate::error::ValidationError;
use crate::ids::{parse_id, IdKind};
use crate::models::{Client, Order, PartRequest, RecordKind, Technician, Visit};
use crate::validation::{ReferenceLookup, Stage};

const MIN_PHONE_DIGITS: usize = 7;

fn missing(record: RecordKind, field: impl Into<String>) -> ValidationError {
    ValidationError::MissingField {
        record,
        field: field.into(),
    }
}

fn invalid(record: RecordKind, field: impl Into<String>, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidField {
        record,
        field: field.into(),
        reason: reason.into(),
    }
}

fn dangling(record: RecordKind, field: &str, target: RecordKind, value: &str) -> ValidationError {
    ValidationError::DanglingReference {
        record,
        field: field.to_string(),
        target,
        value: value.to_string(),
    }
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// The identifier must parse, belong to `kind`, and encode the day the
/// record was created.
fn check_id(
    record: RecordKind,
    kind: IdKind,
    id: &str,
    created_at: DateTime<Utc>,
    errors: &mut Vec<ValidationError>,
) {
    if is_blank(id) {
        errors.push(missing(record, "id"));
        return;
    }

    let parsed = match parse_id(id) {
        Ok(parsed) => parsed,
        Err(e) => {
            errors.push(invalid(record, "id", e.to_string()));
            return;
        }
    };

    if parsed.kind() != kind {
        errors.push(invalid(
            record,
            "id",
            format!("'{}' is a {} identifier, expected {}", id, parsed.kind(), kind),
        ));
        return;
    }

    let created = created_at.date_naive();
    if parsed.date != created {
        errors.push(ValidationError::IdDateMismatch {
            record,
            id: id.to_string(),
            encoded: parsed.date,
            created,
        });
    }
}

pub fn check_client(client: &Client, stage: Stage) -> Vec<ValidationError> {
    let record = RecordKind::Client;
    let mut errors = Vec::new();

    if stage != Stage::Draft {
        check_id(record, IdKind::Client, &client.id, client.created_at, &mut errors);
    }

    if client.display_name().is_empty() {
        errors.push(missing(record, "name"));
    }

    if is_blank(&client.phone) {
        errors.push(missing(record, "phone"));
    } else if client.phone.chars().filter(char::is_ascii_digit).count() < MIN_PHONE_DIGITS {
        errors.push(invalid(
            record,
            "phone",
            format!("must contain at least {} digits", MIN_PHONE_DIGITS),
        ));
    }

    if let Some(email) = client.email.as_deref().filter(|e| !is_blank(e)) {
        if !email.to_string().validate_email() {
            errors.push(invalid(record, "email", format!("'{}' is not an email address", email)));
        }
    }

    if let Some(address) = &client.address {
        if is_blank(&address.street) {
            errors.push(missing(record, "address.street"));
        }
        if is_blank(&address.city) {
            errors.push(missing(record, "address.city"));
        }
    }

    errors
}

pub fn check_order(order: &Order, lookup: &dyn ReferenceLookup, stage: Stage) -> Vec<ValidationError> {
    let record = RecordKind::Order;
    let mut errors = Vec::new();

    if stage != Stage::Draft {
        check_id(record, IdKind::Order, &order.id, order.created_at, &mut errors);
    }

    if is_blank(&order.client_id) {
        errors.push(missing(record, "clientId"));
    } else if lookup.client(&order.client_id).is_none() {
        errors.push(dangling(record, "clientId", RecordKind::Client, &order.client_id));
    }

    if order.devices.is_empty() {
        errors.push(missing(record, "devices"));
    }

    for (position, device) in order.devices.iter().enumerate() {
        if device.device_index != position {
            errors.push(ValidationError::DeviceIndexGap {
                position,
                found: device.device_index,
                expected: order.devices.len(),
            });
        }
        if is_blank(&device.device_type) {
            errors.push(missing(record, format!("devices[{}].deviceType", position)));
        }
    }

    // Stale entries on a stored order are an integrity finding, not a
    // reason to refuse the update.
    for visit_id in order.visit_ids.iter().filter(|_| stage != Stage::Update) {
        if lookup.visit(visit_id).is_none() {
            errors.push(dangling(record, "visitIds", RecordKind::Visit, visit_id));
        }
    }

    errors
}

pub fn check_visit(visit: &Visit, lookup: &dyn ReferenceLookup, stage: Stage) -> Vec<ValidationError> {
    let record = RecordKind::Visit;
    let mut errors = Vec::new();

    if stage != Stage::Draft {
        check_id(record, IdKind::Visit, &visit.visit_id, visit.created_at, &mut errors);
    }

    if is_blank(&visit.order_id) {
        errors.push(missing(record, "orderId"));
    } else {
        match lookup.order(&visit.order_id) {
            None => errors.push(dangling(record, "orderId", RecordKind::Order, &visit.order_id)),
            Some(order) if order.devices.len() != visit.device_models.len() => {
                errors.push(ValidationError::DeviceModelCountMismatch {
                    expected: order.devices.len(),
                    found: visit.device_models.len(),
                });
            }
            Some(_) => {}
        }
    }

    for (position, model) in visit.device_models.iter().enumerate() {
        if model.device_index != position {
            errors.push(ValidationError::DeviceModelIndexMismatch {
                position,
                found: model.device_index,
            });
        }
    }

    if let Some(employee_id) = &visit.employee_id {
        if lookup.technician(employee_id).is_none() {
            errors.push(dangling(record, "employeeId", RecordKind::Technician, employee_id));
        }
    }

    errors
}

pub fn check_technician(technician: &Technician) -> Vec<ValidationError> {
    let record = RecordKind::Technician;
    let mut errors = Vec::new();
    if is_blank(&technician.id) {
        errors.push(missing(record, "id"));
    }
    if is_blank(&technician.name) {
        errors.push(missing(record, "name"));
    }
    errors
}

pub fn check_part_request(request: &PartRequest, lookup: &dyn ReferenceLookup) -> Vec<ValidationError> {
    let record = RecordKind::PartRequest;
    let mut errors = Vec::new();

    if is_blank(&request.part_name) {
        errors.push(missing(record, "partName"));
    }
    if request.quantity == 0 {
        errors.push(invalid(record, "quantity", "must be at least 1"));
    }
    if lookup.technician(&request.requested_by).is_none() {
        errors.push(dangling(
            record,
            "requestedBy",
            RecordKind::Technician,
            &request.requested_by,
        ));
    }
    if let Some(order_id) = &request.order_id {
        if lookup.order(order_id).is_none() {
            errors.push(dangling(record, "orderId", RecordKind::Order, order_id));
        }
    }

    errors
}
