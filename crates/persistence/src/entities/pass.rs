//! Pass entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{Pass, PassStatus, PassType, Requester};
use domain::StoreError;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the passes table.
#[derive(Debug, Clone, FromRow)]
pub struct PassEntity {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: i64,
    #[sqlx(rename = "type")]
    pub pass_type: String,
    pub status: String,
    pub requester_type: String,
    pub requester_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub reason: String,
    pub notes: String,
    pub email_sent: bool,
    pub telegram_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PassEntity> for Pass {
    type Error = StoreError;

    fn try_from(entity: PassEntity) -> Result<Self, Self::Error> {
        let pass_type = entity
            .pass_type
            .parse::<PassType>()
            .map_err(StoreError::Database)?;
        let status = entity
            .status
            .parse::<PassStatus>()
            .map_err(StoreError::Database)?;
        let requester = Requester::from_parts(&entity.requester_type, &entity.requester_id)
            .ok_or_else(|| {
                StoreError::Database(format!(
                    "Invalid requester {}:{} on pass {}",
                    entity.requester_type, entity.requester_id, entity.id
                ))
            })?;

        Ok(Pass {
            id: entity.id,
            event_id: entity.event_id,
            user_id: entity.user_id,
            pass_type,
            status,
            requester,
            scheduled_at: entity.scheduled_at,
            sent_at: entity.sent_at,
            reason: entity.reason,
            notes: entity.notes,
            email_sent: entity.email_sent,
            telegram_sent: entity.telegram_sent,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

/// Per-status counts for one event.
#[derive(Debug, Clone, FromRow)]
pub struct PassStatisticsEntity {
    pub total: i64,
    pub pending: i64,
    pub sent: i64,
    pub cancelled: i64,
}

impl From<PassStatisticsEntity> for domain::models::PassStatistics {
    fn from(entity: PassStatisticsEntity) -> Self {
        Self {
            total: entity.total,
            pending: entity.pending,
            sent: entity.sent,
            cancelled: entity.cancelled,
        }
    }
}
