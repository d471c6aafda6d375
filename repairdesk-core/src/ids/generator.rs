use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::IdError;
use crate::ids::counter::{seed_from_ids, SequenceCounter};
use crate::ids::date_code;
use crate::ids::scheme::IdScheme;

/// Formats an identifier from its parts.
///
/// `sequence` is the 1-based ordinal of the record among same-kind records
/// created on `date`. Numbers above the scheme's capacity fail with
/// [`IdError::SequenceOverflow`] instead of widening or wrapping.
///
/// # Example
///
/// ```rust
/// use chrono::NaiveDate;
/// use repairdesk_core::ids::{generate_id, IdScheme};
///
/// let day = NaiveDate::from_yo_opt(2025, 271).unwrap();
/// assert_eq!(generate_id(IdScheme::Client, None, day, 1).unwrap(), "CLI25271001");
/// ```
pub fn generate_id(
    scheme: IdScheme,
    source_tag: Option<char>,
    date: NaiveDate,
    sequence: u32,
) -> Result<String, IdError> {
    check_source_tag(source_tag)?;
    let code = date_code::encode(date)?;

    if sequence == 0 {
        return Err(IdError::ZeroSequence);
    }
    if sequence > scheme.capacity() {
        return Err(IdError::SequenceOverflow {
            kind: scheme.kind(),
            day: date,
            capacity: scheme.capacity(),
        });
    }

    let tag = source_tag.map(String::from).unwrap_or_default();
    Ok(format!(
        "{}{}{:05}{:0width$}",
        scheme.prefix(),
        tag,
        code,
        sequence,
        width = scheme.sequence_width()
    ))
}

fn check_source_tag(source_tag: Option<char>) -> Result<(), IdError> {
    match source_tag {
        Some(tag) if !tag.is_ascii_uppercase() => Err(IdError::InvalidSourceTag(tag)),
        _ => Ok(()),
    }
}

/// Mints identifiers from an injected [`SequenceCounter`].
///
/// The counter allocation is the only serialized step; the caller persists
/// the record afterwards without holding any counter lock.
#[derive(Clone)]
pub struct IdGenerator {
    counter: Arc<dyn SequenceCounter>,
}

impl IdGenerator {
    pub fn new(counter: Arc<dyn SequenceCounter>) -> Self {
        Self { counter }
    }

    /// Allocates the next sequence for the scheme's kind on `date` and
    /// formats the identifier.
    ///
    /// Tag and date are checked before allocating so a rejected request
    /// does not burn a sequence number.
    pub async fn next_id(
        &self,
        scheme: IdScheme,
        source_tag: Option<char>,
        date: NaiveDate,
    ) -> Result<String, IdError> {
        check_source_tag(source_tag)?;
        date_code::encode(date)?;

        let sequence = self
            .counter
            .next(scheme.kind(), date, scheme.capacity())
            .await?;
        let id = generate_id(scheme, source_tag, date, sequence)?;
        debug!("Minted {} id {}", scheme.kind(), id);
        Ok(id)
    }

    /// Like [`IdGenerator::next_id`], but moves to the scheme's wider variant
    /// once the standard one overflows for the day.
    ///
    /// Only untagged IDs escalate. A tagged wide ID (`ORDAW…`) would sort
    /// before the tagged narrow IDs of the same day (`ORDW…`), so tagged
    /// requests keep failing with [`IdError::SequenceOverflow`].
    pub async fn next_id_escalating(
        &self,
        scheme: IdScheme,
        source_tag: Option<char>,
        date: NaiveDate,
    ) -> Result<String, IdError> {
        let wider = scheme.escalated().filter(|_| source_tag.is_none());
        match (self.next_id(scheme, source_tag, date).await, wider) {
            (Err(IdError::SequenceOverflow { .. }), Some(wider)) => {
                warn!(
                    "{} sequence exhausted for {}; escalating to {}",
                    scheme, date, wider
                );
                self.next_id(wider, source_tag, date).await
            }
            (result, _) => result,
        }
    }

    /// Raises the daily counters past every identifier in `ids`.
    pub async fn seed<'a, I>(&self, ids: I) -> Result<usize, IdError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        seed_from_ids(self.counter.as_ref(), ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::counter::InMemorySequenceCounter;
    use crate::ids::parse::parse_id;
    use crate::ids::scheme::IdKind;
    use std::collections::HashSet;

    fn day_271() -> NaiveDate {
        NaiveDate::from_yo_opt(2025, 271).unwrap()
    }

    fn generator() -> IdGenerator {
        IdGenerator::new(Arc::new(InMemorySequenceCounter::new()))
    }

    #[test]
    fn test_formats_prefix_tag_date_and_sequence() {
        assert_eq!(
            generate_id(IdScheme::Client, None, day_271(), 1).unwrap(),
            "CLI25271001"
        );
        assert_eq!(
            generate_id(IdScheme::Order, Some('W'), day_271(), 42).unwrap(),
            "ORDW25271042"
        );
        assert_eq!(
            generate_id(IdScheme::OrderHighVolume, None, day_271(), 1000).unwrap(),
            "ORDA252711000"
        );
    }

    #[test]
    fn test_rejects_out_of_range_sequences_and_bad_tags() {
        assert_eq!(
            generate_id(IdScheme::Visit, None, day_271(), 0),
            Err(IdError::ZeroSequence)
        );
        assert!(matches!(
            generate_id(IdScheme::Visit, None, day_271(), 1000),
            Err(IdError::SequenceOverflow { capacity: 999, .. })
        ));
        assert_eq!(
            generate_id(IdScheme::Client, Some('a'), day_271(), 1),
            Err(IdError::InvalidSourceTag('a'))
        );
    }

    #[tokio::test]
    async fn test_three_clients_on_day_271() {
        let ids = generator();
        let mut minted = Vec::new();
        for _ in 0..3 {
            minted.push(ids.next_id(IdScheme::Client, None, day_271()).await.unwrap());
        }
        assert_eq!(minted, ["CLI25271001", "CLI25271002", "CLI25271003"]);
    }

    #[tokio::test]
    async fn test_minted_ids_are_unique_monotonic_and_decodable() {
        let ids = generator();
        let mut previous: Option<String> = None;
        let mut seen = HashSet::new();

        for _ in 0..250 {
            let id = ids.next_id(IdScheme::Visit, None, day_271()).await.unwrap();
            assert_eq!(parse_id(&id).unwrap().date, day_271());
            if let Some(prev) = &previous {
                assert!(id > *prev, "{id} should sort after {prev}");
            }
            assert!(seen.insert(id.clone()));
            previous = Some(id);
        }
    }

    #[tokio::test]
    async fn test_thousandth_order_overflows_the_standard_scheme() {
        let ids = generator();
        for _ in 0..999 {
            ids.next_id(IdScheme::Order, None, day_271()).await.unwrap();
        }

        let err = ids.next_id(IdScheme::Order, None, day_271()).await.unwrap_err();
        assert!(matches!(err, IdError::SequenceOverflow { capacity: 999, .. }));

        let escalated = ids
            .next_id_escalating(IdScheme::Order, None, day_271())
            .await
            .unwrap();
        assert_eq!(escalated, "ORDA252711000");
        assert!(escalated.as_str() > "ORD25271999");
    }

    #[tokio::test]
    async fn test_tagged_orders_do_not_escalate() {
        let ids = generator();
        let counter = InMemorySequenceCounter::new();
        counter.seed(IdKind::Order, day_271(), 998).await.unwrap();
        let ids_near_capacity = IdGenerator::new(Arc::new(counter));

        let last = ids_near_capacity
            .next_id_escalating(IdScheme::Order, Some('W'), day_271())
            .await
            .unwrap();
        assert_eq!(last, "ORDW25271999");

        let err = ids_near_capacity
            .next_id_escalating(IdScheme::Order, Some('W'), day_271())
            .await
            .unwrap_err();
        assert!(matches!(err, IdError::SequenceOverflow { capacity: 999, .. }));

        let untagged = ids_near_capacity
            .next_id_escalating(IdScheme::Order, None, day_271())
            .await
            .unwrap();
        assert_eq!(untagged, "ORDA252711000");
        assert!(untagged.as_str() > "ORD25271999");

        assert_eq!(
            ids.next_id_escalating(IdScheme::Order, Some('W'), day_271())
                .await
                .unwrap(),
            "ORDW25271001"
        );
    }

    #[tokio::test]
    async fn test_rejected_requests_do_not_burn_numbers() {
        let ids = generator();
        let bad_day = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        assert!(ids.next_id(IdScheme::Client, None, bad_day).await.is_err());
        assert!(ids
            .next_id(IdScheme::Client, Some('1'), day_271())
            .await
            .is_err());
        assert_eq!(
            ids.next_id(IdScheme::Client, None, day_271()).await.unwrap(),
            "CLI25271001"
        );
    }
}
