//! Vendor timestamp normalization.

use time::{
    format_description::well_known::{Iso8601, Rfc3339},
    OffsetDateTime, PrimitiveDateTime,
};

/// Converts an ISO-8601 timestamp into epoch seconds.
///
/// Accepts RFC 3339 (`2024-05-01T12:00:00Z`, `...+02:00`, fractional seconds)
/// and offset-less ISO-8601, which is read as UTC. Anything unparsable,
/// empty, or absent yields `None`.
pub fn iso_to_epoch(value: Option<&str>) -> Option<i64> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(parsed.unix_timestamp());
    }
    if let Ok(parsed) = OffsetDateTime::parse(value, &Iso8601::DEFAULT) {
        return Some(parsed.unix_timestamp());
    }
    PrimitiveDateTime::parse(value, &Iso8601::DEFAULT)
        .ok()
        .map(|parsed| parsed.assume_utc().unix_timestamp())
}

/// The current wall-clock time in epoch seconds.
pub fn now_epoch() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
