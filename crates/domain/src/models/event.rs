//! Event domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::{User, UserRole};

/// A club event. Read-only from the pass engine's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub club_id: Uuid,
    pub name: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub pass_required: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Event {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether `user` needs a physical pass to attend.
    ///
    /// Users whose role is listed in `excluded_roles` never get one.
    pub fn is_pass_required_for(&self, user: &User, excluded_roles: &[UserRole]) -> bool {
        self.pass_required && !excluded_roles.contains(&user.role)
    }
}
