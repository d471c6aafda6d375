use chrono::NaiveDate;
use regex::Regex;
use std::sync::OnceLock;

use crate::error::IdError;
use crate::ids::date_code;
use crate::ids::scheme::{IdKind, IdScheme};

// ORDA must come before ORD so the longer prefix wins.
const ID_PATTERN: &str = r"^(CLI|ORDA|ORD|VIS)([A-Z])?(\d{5})(\d{3,4})$";

fn id_regex() -> &'static Regex {
    static ID_REGEX: OnceLock<Regex> = OnceLock::new();
    ID_REGEX.get_or_init(|| Regex::new(ID_PATTERN).expect("ID pattern is a valid regex"))
}

/// The decoded segments of a generated identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedId {
    pub scheme: IdScheme,
    pub source_tag: Option<char>,
    pub date_code: u32,
    pub date: NaiveDate,
    pub sequence: u32,
}

impl ParsedId {
    pub fn kind(&self) -> IdKind {
        self.scheme.kind()
    }
}

/// Parses and decodes an identifier such as `CLI25271001` or `ORDW252710042`.
///
/// The date segment must decode to a real calendar day and the sequence
/// must be non-zero.
pub fn parse_id(id: &str) -> Result<ParsedId, IdError> {
    let malformed = || IdError::Malformed(id.to_string());
    let captures = id_regex().captures(id).ok_or_else(malformed)?;

    let mut scheme = IdScheme::from_prefix(&captures[1]).ok_or_else(malformed)?;
    let mut source_tag = captures.get(2).and_then(|m| m.as_str().chars().next());
    let date_code: u32 = captures[3].parse().map_err(|_| malformed())?;
    let sequence_digits = &captures[4];

    // `ORDA` + 3 digits is a standard order minted with the AI source tag.
    if scheme == IdScheme::OrderHighVolume
        && source_tag.is_none()
        && sequence_digits.len() == IdScheme::Order.sequence_width()
    {
        scheme = IdScheme::Order;
        source_tag = Some('A');
    }

    let sequence: u32 = sequence_digits.parse().map_err(|_| malformed())?;

    // A 4-digit tail on a 3-digit scheme means the ID was not produced by it.
    if sequence_digits.len() != scheme.sequence_width() || sequence == 0 {
        return Err(malformed());
    }

    let date = date_code::decode(date_code)?;

    Ok(ParsedId {
        scheme,
        source_tag,
        date_code,
        date,
        sequence,
    })
}
