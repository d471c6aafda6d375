use chrono::{Datelike, NaiveDate};

use crate::error::IdError;

/// Encodes a calendar date as `(year mod 100) * 1000 + day of year`.
///
/// Only years 2000-2099 round-trip, since decoding assumes the 2000s.
pub fn encode(date: NaiveDate) -> Result<u32, IdError> {
    let year = date.year();
    if !(2000..=2099).contains(&year) {
        return Err(IdError::DateOutOfRange(date));
    }
    Ok((year as u32 % 100) * 1000 + date.ordinal())
}

/// Decodes a date code back into the date it was generated on.
pub fn decode(code: u32) -> Result<NaiveDate, IdError> {
    let year = 2000 + (code / 1000) as i32;
    let day_of_year = code % 1000;
    NaiveDate::from_yo_opt(year, day_of_year).ok_or(IdError::InvalidDateCode(code))
}
