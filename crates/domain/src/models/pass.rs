//! Pass domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::PassError;

/// How a pass came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassType {
    /// Created automatically on event registration.
    Event,
    /// Created by an administrator.
    Manual,
    /// Created by a club through the API.
    Api,
}

impl PassType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassType::Event => "event",
            PassType::Manual => "manual",
            PassType::Api => "api",
        }
    }

}

impl FromStr for PassType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "event" => Ok(PassType::Event),
            "manual" => Ok(PassType::Manual),
            "api" => Ok(PassType::Api),
            _ => Err(format!("Invalid pass type: {}", s)),
        }
    }
}

impl std::fmt::Display for PassType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery status of a pass. `Sent` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStatus {
    Pending,
    Sent,
    Cancelled,
}

impl PassStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PassStatus::Pending => "pending",
            PassStatus::Sent => "sent",
            PassStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PassStatus::Pending)
    }
}

impl FromStr for PassStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PassStatus::Pending),
            "sent" => Ok(PassStatus::Sent),
            "cancelled" => Ok(PassStatus::Cancelled),
            _ => Err(format!("Invalid pass status: {}", s)),
        }
    }
}

impl std::fmt::Display for PassStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The actor that caused a pass to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Requester {
    /// A user registering themselves; carries the user ID.
    User(i64),
    /// An administrator; carries the administrator's user ID.
    Admin(i64),
    /// A club acting through the API; carries the club ID.
    Club(Uuid),
}

impl Requester {
    /// Storage tag for the `requester_type` column.
    pub fn kind(&self) -> &'static str {
        match self {
            Requester::User(_) => "user",
            Requester::Admin(_) => "admin",
            Requester::Club(_) => "club",
        }
    }

    /// Storage value for the `requester_id` column.
    pub fn id_string(&self) -> String {
        match self {
            Requester::User(id) | Requester::Admin(id) => id.to_string(),
            Requester::Club(id) => id.to_string(),
        }
    }

    /// Rebuilds a requester from its stored tag and ID.
    pub fn from_parts(kind: &str, id: &str) -> Option<Self> {
        match kind {
            "user" => id.parse().ok().map(Requester::User),
            "admin" => id.parse().ok().map(Requester::Admin),
            "club" => Uuid::parse_str(id).ok().map(Requester::Club),
            _ => None,
        }
    }

    /// The pass type a requester of this kind produces.
    pub fn pass_type(&self) -> PassType {
        match self {
            Requester::User(_) => PassType::Event,
            Requester::Admin(_) => PassType::Manual,
            Requester::Club(_) => PassType::Api,
        }
    }
}

impl std::fmt::Display for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id_string())
    }
}

/// An access authorization tying one user to one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pass {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub pass_type: PassType,
    pub status: PassStatus,
    pub requester: Requester,
    pub scheduled_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub reason: String,
    pub notes: String,
    pub email_sent: bool,
    pub telegram_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pass {
    /// Records a delivery. Only pending passes can be sent.
    pub fn mark_sent(
        &mut self,
        sent_at: DateTime<Utc>,
        email_sent: bool,
        telegram_sent: bool,
    ) -> Result<(), PassError> {
        self.transition_to(PassStatus::Sent)?;
        self.sent_at = Some(sent_at);
        self.email_sent = email_sent;
        self.telegram_sent = telegram_sent;
        self.updated_at = sent_at;
        Ok(())
    }

    /// Cancels a pending pass, appending `note` to its notes.
    pub fn cancel(&mut self, at: DateTime<Utc>, note: Option<&str>) -> Result<(), PassError> {
        self.transition_to(PassStatus::Cancelled)?;
        if let Some(note) = note {
            if self.notes.is_empty() {
                self.notes = note.to_string();
            } else {
                self.notes = format!("{}; {}", self.notes, note);
            }
        }
        self.updated_at = at;
        Ok(())
    }

    fn transition_to(&mut self, next: PassStatus) -> Result<(), PassError> {
        if self.status.is_terminal() {
            return Err(PassError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Fields needed to insert a new pass.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPass {
    pub event_id: Uuid,
    pub user_id: i64,
    pub requester: Requester,
    pub reason: String,
    pub scheduled_at: DateTime<Utc>,
}

impl NewPass {
    pub fn pass_type(&self) -> PassType {
        self.requester.pass_type()
    }

    /// Materializes the row as it is stored on insert.
    pub fn into_pass(self, id: Uuid, now: DateTime<Utc>) -> Pass {
        Pass {
            id,
            event_id: self.event_id,
            user_id: self.user_id,
            pass_type: self.requester.pass_type(),
            status: PassStatus::Pending,
            requester: self.requester,
            scheduled_at: self.scheduled_at,
            sent_at: None,
            reason: self.reason,
            notes: String::new(),
            email_sent: false,
            telegram_sent: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-status pass counts for one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassStatistics {
    pub total: i64,
    pub pending: i64,
    pub sent: i64,
    pub cancelled: i64,
}

impl PassStatistics {
    pub fn from_passes<'a>(passes: impl IntoIterator<Item = &'a Pass>) -> Self {
        passes.into_iter().fold(Self::default(), |mut stats, pass| {
            stats.total += 1;
            match pass.status {
                PassStatus::Pending => stats.pending += 1,
                PassStatus::Sent => stats.sent += 1,
                PassStatus::Cancelled => stats.cancelled += 1,
            }
            stats
        })
    }
}
