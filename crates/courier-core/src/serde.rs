// Module name shadows the `serde` crate, use `::serde` for the external crate.
use ::serde::Serializer;
use chrono::{DateTime, SecondsFormat, Utc};

/// Render `DateTime<Utc>` as RFC 3339 with 3-digit fractional seconds and a `Z` suffix.
///
/// This is the one date format on the wire: webhook bodies, API responses and
/// canonicalized idempotency payloads all use it.
pub fn format_rfc3339_ms(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn to_rfc3339_ms<S>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&format_rfc3339_ms(dt))
}

pub fn option_to_rfc3339_ms<S>(dt: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match dt {
        Some(dt) => s.serialize_str(&format_rfc3339_ms(dt)),
        None => s.serialize_none(),
    }
}
