//! Record schema validation.
//!
//! Validation is a pure function over a record and a read-only view of the
//! records it references. It collects every violation instead of stopping
//! at the first one, so callers can report them all at once.

pub mod rules;

use std::ops::Deref;

use crate::error::{ValidationError, ValidationErrors};
use crate::models::{Client, Order, Record, Technician, Visit};

pub use rules::{check_client, check_order, check_part_request, check_technician, check_visit};

/// Read-only access to the collections a record may reference.
pub trait ReferenceLookup {
    fn client(&self, id: &str) -> Option<&Client>;
    fn order(&self, id: &str) -> Option<&Order>;
    fn visit(&self, id: &str) -> Option<&Visit>;
    fn technician(&self, id: &str) -> Option<&Technician>;
}

/// How much of a record is checked.
///
/// Drafts are validated before an ID is minted, so a rejected draft never
/// consumes a sequence number. Updates to stored records skip the
/// `visitIds` existence check; dangling entries there are reported by the
/// integrity scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Draft,
    Complete,
    Update,
}

/// A record that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated<T>(T);

impl<T> Validated<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Validated<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

/// Lists every rule `record` violates at `stage`.
pub fn check(record: &Record, lookup: &dyn ReferenceLookup, stage: Stage) -> Vec<ValidationError> {
    match record {
        Record::Client(client) => check_client(client, stage),
        Record::Order(order) => check_order(order, lookup, stage),
        Record::Visit(visit) => check_visit(visit, lookup, stage),
        Record::Technician(technician) => check_technician(technician),
        Record::PartRequest(request) => check_part_request(request, lookup),
    }
}

/// Validates a complete record before it is admitted to the store.
pub fn validate(
    record: Record,
    lookup: &dyn ReferenceLookup,
) -> Result<Validated<Record>, ValidationErrors> {
    into_result(check(&record, lookup, Stage::Complete)).map(|_| Validated(record))
}

/// Validates a change to a record that is already stored.
pub fn validate_update(
    record: Record,
    lookup: &dyn ReferenceLookup,
) -> Result<Validated<Record>, ValidationErrors> {
    into_result(check(&record, lookup, Stage::Update)).map(|_| Validated(record))
}

/// Validates a record that does not have its identifier yet.
pub fn validate_draft(record: &Record, lookup: &dyn ReferenceLookup) -> Result<(), ValidationErrors> {
    into_result(check(record, lookup, Stage::Draft))
}

fn into_result(errors: Vec<ValidationError>) -> Result<(), ValidationErrors> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationErrors(errors))
    }
}
