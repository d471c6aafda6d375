use serde::{Deserialize, Serialize};
use std::fmt;

/// The record kinds that carry generated identifiers.
///
/// Sequence counters are kept per `(kind, day)`, so both order schemes
/// draw from the same daily counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdKind {
    Client,
    Order,
    Visit,
}

impl IdKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IdKind::Client => "client",
            IdKind::Order => "order",
            IdKind::Visit => "visit",
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete ID layout: prefix plus sequence width.
///
/// - `Client`: `CLI`, 3-digit sequence
/// - `Order`: `ORD`, 3-digit sequence
/// - `OrderHighVolume`: `ORDA`, 4-digit sequence for days above 999 orders
/// - `Visit`: `VIS`, 3-digit sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdScheme {
    Client,
    Order,
    OrderHighVolume,
    Visit,
}

impl IdScheme {
    pub fn kind(self) -> IdKind {
        match self {
            IdScheme::Client => IdKind::Client,
            IdScheme::Order | IdScheme::OrderHighVolume => IdKind::Order,
            IdScheme::Visit => IdKind::Visit,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            IdScheme::Client => "CLI",
            IdScheme::Order => "ORD",
            IdScheme::OrderHighVolume => "ORDA",
            IdScheme::Visit => "VIS",
        }
    }

    /// Number of digits in the sequence segment.
    pub fn sequence_width(self) -> usize {
        match self {
            IdScheme::OrderHighVolume => 4,
            _ => 3,
        }
    }

    /// Largest sequence number the scheme can represent.
    pub fn capacity(self) -> u32 {
        10u32.pow(self.sequence_width() as u32) - 1
    }

    /// The wider scheme to fall back to once this one overflows, if any.
    pub fn escalated(self) -> Option<IdScheme> {
        match self {
            IdScheme::Order => Some(IdScheme::OrderHighVolume),
            _ => None,
        }
    }

    pub(crate) fn from_prefix(prefix: &str) -> Option<IdScheme> {
        match prefix {
            "CLI" => Some(IdScheme::Client),
            "ORD" => Some(IdScheme::Order),
            "ORDA" => Some(IdScheme::OrderHighVolume),
            "VIS" => Some(IdScheme::Visit),
            _ => None,
        }
    }
}

impl fmt::Display for IdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_schemes_share_a_kind() {
        assert_eq!(IdScheme::Order.kind(), IdKind::Order);
        assert_eq!(IdScheme::OrderHighVolume.kind(), IdKind::Order);
        assert_eq!(IdScheme::Order.escalated(), Some(IdScheme::OrderHighVolume));
        assert_eq!(IdScheme::Client.escalated(), None);
    }

    #[test]
    fn test_capacity_follows_width() {
        assert_eq!(IdScheme::Client.capacity(), 999);
        assert_eq!(IdScheme::OrderHighVolume.capacity(), 9999);
    }
}
