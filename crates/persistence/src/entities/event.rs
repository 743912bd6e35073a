//! Event entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the events table.
#[derive(Debug, Clone, FromRow)]
pub struct EventEntity {
    pub id: Uuid,
    pub club_id: Uuid,
    pub name: String,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub pass_required: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<EventEntity> for domain::models::Event {
    fn from(entity: EventEntity) -> Self {
        Self {
            id: entity.id,
            club_id: entity.club_id,
            name: entity.name,
            location: entity.location,
            start_time: entity.start_time,
            pass_required: entity.pass_required,
            deleted_at: entity.deleted_at,
        }
    }
}
