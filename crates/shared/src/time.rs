//! Timezone parsing and local-time formatting.
//!
//! The timezone is always passed explicitly; nothing here reads process-wide
//! state.

use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

/// Error returned for an unknown IANA timezone name.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown timezone: {0}")]
pub struct TimezoneError(pub String);

/// Parses an IANA timezone name such as `Europe/Moscow`.
pub fn parse_timezone(name: &str) -> Result<Tz, TimezoneError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| TimezoneError(name.to_string()))
}

/// Formats an instant as `DD.MM.YYYY` in the given timezone.
pub fn format_local_date<T: TimeZone>(at: &DateTime<Utc>, tz: &T) -> String
where
    T::Offset: std::fmt::Display,
{
    at.with_timezone(tz).format("%d.%m.%Y").to_string()
}

/// Formats an instant as `HH:MM` in the given timezone.
pub fn format_local_time<T: TimeZone>(at: &DateTime<Utc>, tz: &T) -> String
where
    T::Offset: std::fmt::Display,
{
    at.with_timezone(tz).format("%H:%M").to_string()
}

/// Formats an instant as `DD.MM.YYYY HH:MM` in the given timezone.
pub fn format_local_datetime<T: TimeZone>(at: &DateTime<Utc>, tz: &T) -> String
where
    T::Offset: std::fmt::Display,
{
    at.with_timezone(tz).format("%d.%m.%Y %H:%M").to_string()
}
