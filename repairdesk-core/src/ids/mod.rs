//! Identifier generation for clients, orders and visits.
//!
//! IDs have the shape `prefix + source tag? + date code + sequence`, for
//! example `CLI25271001` or `ORDA252711000`. The date code is
//! `(year mod 100) * 1000 + day of year`, so IDs sort by creation day and
//! decode back to it.

pub mod counter;
pub mod date_code;
pub mod generator;
pub mod parse;
pub mod scheme;

pub use counter::{seed_from_ids, InMemorySequenceCounter, SequenceCounter};
pub use generator::{generate_id, IdGenerator};
pub use parse::{parse_id, ParsedId};
pub use scheme::{IdKind, IdScheme};
