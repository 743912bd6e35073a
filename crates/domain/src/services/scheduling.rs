//! Dispatch time rule for event passes.
//!
//! Passes for an event go out one day before it on weekdays and two days
//! before it on weekends. The send hour depends on the weekday of the send
//! day itself: 16:00 on Mon-Fri, 12:00 on Sat/Sun.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, NaiveTime, TimeZone, Utc, Weekday};

/// Send hour for passes dispatched on `weekday`.
pub fn send_hour_for(weekday: Weekday) -> u32 {
    if is_weekend(weekday) {
        12
    } else {
        16
    }
}

/// Days between the send day and an event held on `weekday`.
pub fn offset_days_for(weekday: Weekday) -> i64 {
    if is_weekend(weekday) {
        2
    } else {
        1
    }
}

pub fn is_weekend(weekday: Weekday) -> bool {
    matches!(weekday, Weekday::Sat | Weekday::Sun)
}

/// Computes the dispatch moment for an event starting at `start`.
///
/// Calendar arithmetic happens in `start`'s own timezone.
pub fn dispatch_time<T: TimeZone>(start: &DateTime<T>) -> DateTime<T> {
    let tz = start.timezone();
    let event_day = start.date_naive();
    let send_day = event_day - Duration::days(offset_days_for(event_day.weekday()));
    let send_at = NaiveTime::from_hms_opt(send_hour_for(send_day.weekday()), 0, 0)
        .unwrap_or_default();
    resolve_local(&tz, send_day.and_time(send_at))
}

/// Dispatch moment for an event stored as a UTC instant, evaluated in `tz`.
pub fn dispatch_time_utc<T: TimeZone>(start: DateTime<Utc>, tz: &T) -> DateTime<Utc> {
    dispatch_time(&start.with_timezone(tz)).with_timezone(&Utc)
}

/// Maps a local wall-clock time to an instant in `tz`.
///
/// Ambiguous times take the earliest instant. Times inside a DST gap roll
/// forward by whole hours until they exist.
pub fn resolve_local<T: TimeZone>(tz: &T, local: NaiveDateTime) -> DateTime<T> {
    (0..=2)
        .find_map(|hours| {
            tz.from_local_datetime(&(local + Duration::hours(hours)))
                .earliest()
        })
        .unwrap_or_else(|| tz.from_utc_datetime(&local))
}
