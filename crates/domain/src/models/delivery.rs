//! Scheduled delivery configuration.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::Serialize;

use crate::services::scheduling::resolve_local;

/// Where a consolidated report is sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryTargets {
    pub email_recipients: Vec<String>,
    pub chat_id: Option<String>,
}

impl DeliveryTargets {
    pub fn has_email(&self) -> bool {
        !self.email_recipients.is_empty()
    }

    pub fn has_chat(&self) -> bool {
        self.chat_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }
}

/// A fixed wall-clock trigger: `hour:minute` on the listed weekdays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WallClockTrigger {
    pub hour: u32,
    pub minute: u32,
    pub weekdays: Vec<Weekday>,
    pub tz: Tz,
}

impl WallClockTrigger {
    /// Returns the first fire time strictly after `after`.
    ///
    /// `None` when the trigger has no weekdays or an invalid time.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let time = NaiveTime::from_hms_opt(self.hour, self.minute, 0)?;
        let local_date = after.with_timezone(&self.tz).date_naive();

        (0..=7)
            .filter_map(|days| local_date.checked_add_signed(Duration::days(days)))
            .filter(|date| self.weekdays.contains(&date.weekday()))
            .map(|date| resolve_local(&self.tz, date.and_time(time)).with_timezone(&Utc))
            .find(|fire| *fire > after)
    }

    /// Human-readable description, e.g. `16:00 Mon,Tue (Europe/Moscow)`.
    pub fn describe(&self) -> String {
        let days: Vec<String> = self.weekdays.iter().map(|d| d.to_string()).collect();
        format!(
            "{:02}:{:02} {} ({})",
            self.hour,
            self.minute,
            days.join(","),
            self.tz.name()
        )
    }
}

/// One delivery bucket (weekday or weekend), built once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryBucket {
    pub name: String,
    pub targets: DeliveryTargets,
    /// How long before the event the bucket's passes go out.
    pub lead_time: Duration,
    pub active: bool,
    pub trigger: WallClockTrigger,
}

impl DeliveryBucket {
    /// Default weekday bucket: 16:00 Mon-Fri, 24h before the event.
    pub fn weekday(tz: Tz, targets: DeliveryTargets) -> Self {
        Self {
            name: "weekday".to_string(),
            targets,
            lead_time: Duration::hours(24),
            active: true,
            trigger: WallClockTrigger {
                hour: 16,
                minute: 0,
                weekdays: vec![
                    Weekday::Mon,
                    Weekday::Tue,
                    Weekday::Wed,
                    Weekday::Thu,
                    Weekday::Fri,
                ],
                tz,
            },
        }
    }

    /// Default weekend bucket: 12:00 Sat/Sun, 48h before the event.
    pub fn weekend(tz: Tz, targets: DeliveryTargets) -> Self {
        Self {
            name: "weekend".to_string(),
            targets,
            lead_time: Duration::hours(48),
            active: true,
            trigger: WallClockTrigger {
                hour: 12,
                minute: 0,
                weekdays: vec![Weekday::Sat, Weekday::Sun],
                tz,
            },
        }
    }
}

/// Parses a three-letter or full English weekday name.
pub fn parse_weekday(name: &str) -> Option<Weekday> {
    name.trim().parse::<Weekday>().ok()
}
