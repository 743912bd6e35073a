//! Consolidated pass report.
//!
//! One report covers every event with passes due in a tick: a short summary
//! for the message body and a CSV export with one row per pass.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use shared::time::{format_local_date, format_local_datetime, format_local_time};
use uuid::Uuid;

use super::dispatch::Attachment;
use crate::models::{Event, Pass, User};

/// Summary used when nothing is due.
pub const EMPTY_SUMMARY: &str = "No passes due for delivery.";

pub const CSV_CONTENT_TYPE: &str = "text/csv";

const CSV_HEADER: [&str; 6] = ["Event", "Date", "Time", "Location", "FIO", "Role"];

const UTF8_BOM: char = '\u{FEFF}';

const FORMULA_PREFIXES: [char; 6] = ['=', '+', '-', '@', '\t', '\r'];

/// An event together with its due passes.
#[derive(Debug, Clone)]
pub struct EventPasses {
    pub event: Event,
    pub passes: Vec<Pass>,
}

/// Per-event line of the summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSection {
    pub event_id: Uuid,
    pub name: String,
    pub start: String,
    pub location: String,
    pub pass_count: usize,
}

/// A rendered report, ready to dispatch.
#[derive(Debug, Clone)]
pub struct ConsolidatedReport {
    pub generated_at: DateTime<Utc>,
    pub event_count: usize,
    pub pass_count: usize,
    pub sections: Vec<EventSection>,
    pub subject: String,
    pub summary_html: String,
    pub summary_text: String,
    pub export: Attachment,
}

impl ConsolidatedReport {
    pub fn is_empty(&self) -> bool {
        self.pass_count == 0
    }
}

/// Groups passes by event ID, keeping each group's input order.
pub fn group_by_event(passes: Vec<Pass>) -> HashMap<Uuid, Vec<Pass>> {
    let mut groups: HashMap<Uuid, Vec<Pass>> = HashMap::new();
    for pass in passes {
        groups.entry(pass.event_id).or_default().push(pass);
    }
    groups
}

/// Builds the report. Pure: output depends only on the arguments.
pub fn build(
    mut groups: Vec<EventPasses>,
    users: &HashMap<i64, User>,
    tz: &Tz,
    generated_at: DateTime<Utc>,
) -> ConsolidatedReport {
    groups.sort_by(|a, b| {
        a.event
            .start_time
            .cmp(&b.event.start_time)
            .then_with(|| a.event.name.cmp(&b.event.name))
            .then_with(|| a.event.id.cmp(&b.event.id))
    });
    for group in &mut groups {
        group.passes.sort_by(|a, b| {
            user_fio(users, a.user_id)
                .cmp(&user_fio(users, b.user_id))
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
    }

    let sections: Vec<EventSection> = groups
        .iter()
        .map(|g| EventSection {
            event_id: g.event.id,
            name: g.event.name.clone(),
            start: format_local_datetime(&g.event.start_time, tz),
            location: g.event.location.clone(),
            pass_count: g.passes.len(),
        })
        .collect();

    let event_count = sections.len();
    let pass_count: usize = sections.iter().map(|s| s.pass_count).sum();

    let (summary_html, summary_text) = if pass_count == 0 {
        (EMPTY_SUMMARY.to_string(), EMPTY_SUMMARY.to_string())
    } else {
        (
            render_html(&sections, pass_count),
            render_text(&sections, pass_count),
        )
    };

    ConsolidatedReport {
        generated_at,
        event_count,
        pass_count,
        subject: format!(
            "Pass summary - {} events ({} passes)",
            event_count, pass_count
        ),
        summary_html,
        summary_text,
        export: Attachment {
            filename: format!("passes_{}.csv", generated_at.with_timezone(tz).format("%Y-%m-%d")),
            content_type: CSV_CONTENT_TYPE.to_string(),
            bytes: render_csv(&groups, users, tz).into_bytes(),
        },
        sections,
    }
}

fn user_fio(users: &HashMap<i64, User>, user_id: i64) -> String {
    users
        .get(&user_id)
        .map(|u| u.fio.clone())
        .unwrap_or_else(|| format!("unknown user #{}", user_id))
}

fn render_text(sections: &[EventSection], pass_count: usize) -> String {
    let mut out = format!(
        "Passes due: {} events, {} passes\n",
        sections.len(),
        pass_count
    );
    for (i, s) in sections.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. {}\nStart: {}\nLocation: {}\nPasses: {}\n",
            i + 1,
            s.name,
            s.start,
            s.location,
            s.pass_count
        ));
    }
    out
}

fn render_html(sections: &[EventSection], pass_count: usize) -> String {
    let mut out = format!(
        "<b>Passes due:</b> {} events, {} passes\n",
        sections.len(),
        pass_count
    );
    for (i, s) in sections.iter().enumerate() {
        out.push_str(&format!(
            "\n<b>{}. {}</b>\nStart: {}\nLocation: {}\nPasses: {}\n",
            i + 1,
            escape_html(&s.name),
            s.start,
            escape_html(&s.location),
            s.pass_count
        ));
    }
    out
}

fn render_csv(groups: &[EventPasses], users: &HashMap<i64, User>, tz: &Tz) -> String {
    let mut csv = String::new();

    // UTF-8 BOM so Excel reads Cyrillic names correctly
    csv.push(UTF8_BOM);
    csv.push_str(&CSV_HEADER.join(","));
    csv.push('\n');
    for group in groups {
        let date = format_local_date(&group.event.start_time, tz);
        let time = format_local_time(&group.event.start_time, tz);
        for pass in &group.passes {
            let user = users.get(&pass.user_id);
            let fio = user_fio(users, pass.user_id);
            let role = user.map(|u| u.role.as_str()).unwrap_or("");
            let row = [
                group.event.name.as_str(),
                date.as_str(),
                time.as_str(),
                group.event.location.as_str(),
                fio.as_str(),
                role,
            ];
            let fields: Vec<String> = row.iter().map(|f| csv_field(f)).collect();
            csv.push_str(&fields.join(","));
            csv.push('\n');
        }
    }
    csv
}

/// Quotes a CSV field when it contains a separator, quote or line break.
///
/// Values a spreadsheet would evaluate as a formula get a leading `'`.
fn csv_field(value: &str) -> String {
    let value = if value.starts_with(FORMULA_PREFIXES) {
        format!("'{}", value)
    } else {
        value.to_string()
    };
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value
    }
}

/// Escapes text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewPass, Requester, UserRole};
    use chrono::TimeZone;
    use chrono_tz::Europe::Moscow;

    fn event(name: &str, start: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::new_v4(),
            club_id: Uuid::new_v4(),
            name: name.to_string(),
            location: "Room 101".to_string(),
            start_time: start,
            pass_required: true,
            deleted_at: None,
        }
    }

    fn pass(event_id: Uuid, user_id: i64) -> Pass {
        NewPass {
            event_id,
            user_id,
            requester: Requester::User(user_id),
            reason: "registration".to_string(),
            scheduled_at: Utc::now(),
        }
        .into_pass(Uuid::new_v4(), Utc::now())
    }

    fn users() -> HashMap<i64, User> {
        [(1, "Sidorov Petr"), (2, "Antonova Maria"), (3, "Belov Ilya")]
            .into_iter()
            .map(|(id, fio)| {
                (
                    id,
                    User {
                        id,
                        fio: fio.to_string(),
                        role: UserRole::ExternalUser,
                        email: None,
                    },
                )
            })
            .collect()
    }

    fn generated_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 11, 13, 0, 0).unwrap()
    }

    fn csv_lines(report: &ConsolidatedReport) -> Vec<String> {
        String::from_utf8(report.export.bytes.clone())
            .unwrap()
            .trim_start_matches(UTF8_BOM)
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_empty_report() {
        let report = build(vec![], &HashMap::new(), &Moscow, generated_at());
        assert!(report.is_empty());
        assert_eq!(report.summary_text, EMPTY_SUMMARY);
        assert_eq!(report.summary_html, EMPTY_SUMMARY);
        assert_eq!(report.subject, "Pass summary - 0 events (0 passes)");
        assert_eq!(csv_lines(&report), vec!["Event,Date,Time,Location,FIO,Role"]);
        assert_eq!(report.export.filename, "passes_2025-03-11.csv");
        assert_eq!(report.export.content_type, "text/csv");
    }

    #[test]
    fn test_two_events_two_sections() {
        let later = event("Robotics", Utc.with_ymd_and_hms(2025, 3, 12, 15, 0, 0).unwrap());
        let earlier = event("Chess", Utc.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap());
        let groups = vec![
            EventPasses {
                passes: vec![pass(later.id, 1), pass(later.id, 2)],
                event: later.clone(),
            },
            EventPasses {
                passes: vec![pass(earlier.id, 3)],
                event: earlier.clone(),
            },
        ];

        let report = build(groups, &users(), &Moscow, generated_at());

        assert_eq!(report.event_count, 2);
        assert_eq!(report.pass_count, 3);
        assert_eq!(report.sections.len(), 2);
        assert_eq!(report.sections[0].name, "Chess");
        assert_eq!(report.sections[0].start, "12.03.2025 12:00");
        assert_eq!(report.sections[1].pass_count, 2);
        assert_eq!(report.subject, "Pass summary - 2 events (3 passes)");
        assert!(report.summary_text.contains("1. Chess"));
        assert!(report.summary_text.contains("2. Robotics"));

        let lines = csv_lines(&report);
        assert_eq!(lines.len(), 1 + 3);
        assert_eq!(lines[1], "Chess,12.03.2025,12:00,Room 101,Belov Ilya,external_user");
        // users ordered by FIO within an event
        assert!(lines[2].contains("Antonova Maria"));
        assert!(lines[3].contains("Sidorov Petr"));
    }

    #[test]
    fn test_missing_user_still_gets_a_row() {
        let ev = event("Chess", Utc.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap());
        let groups = vec![EventPasses {
            passes: vec![pass(ev.id, 77)],
            event: ev,
        }];
        let report = build(groups, &users(), &Moscow, generated_at());
        let lines = csv_lines(&report);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].ends_with("unknown user #77,"));
    }

    #[test]
    fn test_html_escapes_names() {
        let mut ev = event("Q&A <live>", Utc.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap());
        ev.location = "Hall \"B\"".to_string();
        let groups = vec![EventPasses {
            passes: vec![pass(ev.id, 1)],
            event: ev,
        }];
        let report = build(groups, &users(), &Moscow, generated_at());
        assert!(report.summary_html.contains("Q&amp;A &lt;live&gt;"));
        assert!(report.summary_html.contains("Hall &quot;B&quot;"));
        assert!(report.summary_text.contains("Q&A <live>"));
    }

    #[test]
    fn test_csv_quotes_special_fields() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_csv_neutralises_formulas() {
        assert_eq!(csv_field("=HYPERLINK(\"x\")"), "\"'=HYPERLINK(\"\"x\"\")\"");
        assert_eq!(csv_field("+7 900"), "'+7 900");
        assert_eq!(csv_field("-1"), "'-1");
        assert_eq!(csv_field("@SUM(A1)"), "'@SUM(A1)");
        assert_eq!(csv_field("Ivanov-Petrov"), "Ivanov-Petrov");
    }

    #[test]
    fn test_export_starts_with_bom_and_keeps_cyrillic() {
        let mut ev = event("Шахматный турнир", Utc.with_ymd_and_hms(2025, 3, 12, 9, 0, 0).unwrap());
        ev.location = "Аудитория 5".to_string();
        let mut users = users();
        users.insert(
            4,
            User {
                id: 4,
                fio: "Иванов Иван".to_string(),
                role: UserRole::ExternalUser,
                email: None,
            },
        );
        let groups = vec![EventPasses {
            passes: vec![pass(ev.id, 4)],
            event: ev,
        }];

        let report = build(groups, &users, &Moscow, generated_at());

        assert_eq!(&report.export.bytes[..3], &[0xEF, 0xBB, 0xBF]);
        let lines = csv_lines(&report);
        assert_eq!(lines[0], "Event,Date,Time,Location,FIO,Role");
        assert_eq!(
            lines[1],
            "Шахматный турнир,12.03.2025,12:00,Аудитория 5,Иванов Иван,external_user"
        );
    }

    #[test]
    fn test_group_by_event() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let groups = group_by_event(vec![pass(a, 1), pass(b, 2), pass(a, 3)]);
        assert_eq!(groups.len(), 2);
        let users: Vec<i64> = groups[&a].iter().map(|p| p.user_id).collect();
        assert_eq!(users, vec![1, 3]);
    }

    #[test]
    fn test_filename_uses_local_date() {
        // 22:30 UTC is already the next day in Moscow
        let at = Utc.with_ymd_and_hms(2025, 3, 11, 22, 30, 0).unwrap();
        let report = build(vec![], &HashMap::new(), &Moscow, at);
        assert_eq!(report.export.filename, "passes_2025-03-12.csv");
    }
}
