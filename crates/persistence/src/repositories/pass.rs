//! Pass repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{NewPass, Pass, PassStatistics, Requester};
use domain::store::PassStore;
use domain::StoreError;
use shared::pagination::Page;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{PassEntity, PassStatisticsEntity};
use crate::error::store_error;
use crate::metrics::QueryTimer;

const PASS_COLUMNS: &str = "id, event_id, user_id, type, status, requester_type, requester_id, \
     scheduled_at, sent_at, reason, notes, email_sent, telegram_sent, created_at, updated_at";

/// Repository for pass-related database operations.
#[derive(Clone)]
pub struct PassRepository {
    pool: PgPool,
}

impl PassRepository {
    /// Creates a new PassRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn event_is_live(&self, event_id: Uuid) -> Result<bool, StoreError> {
        let (live,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM events WHERE id = $1 AND deleted_at IS NULL)",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;
        Ok(live)
    }
}

fn into_passes(result: Result<Vec<PassEntity>, sqlx::Error>) -> Result<Vec<Pass>, StoreError> {
    result
        .map_err(store_error)?
        .into_iter()
        .map(Pass::try_from)
        .collect()
}

#[async_trait]
impl PassStore for PassRepository {
    async fn create_pass(&self, new_pass: NewPass) -> Result<Option<Pass>, StoreError> {
        let timer = QueryTimer::new("create_pass");
        // The share lock serializes with the cascade, which locks the event
        // row FOR UPDATE before cancelling its pending passes.
        let sql = format!(
            r#"
            INSERT INTO passes (event_id, user_id, type, status, requester_type, requester_id,
                                scheduled_at, reason, created_at, updated_at)
            SELECT $1, $2, $3, 'pending', $4, $5, $6, $7, $8, $8
            WHERE EXISTS (
                SELECT 1 FROM events WHERE id = $1 AND deleted_at IS NULL FOR SHARE
            )
            ON CONFLICT (event_id, user_id) WHERE status <> 'cancelled' DO NOTHING
            RETURNING {}
            "#,
            PASS_COLUMNS
        );
        let result = sqlx::query_as::<_, PassEntity>(&sql)
            .bind(new_pass.event_id)
            .bind(new_pass.user_id)
            .bind(new_pass.pass_type().as_str())
            .bind(new_pass.requester.kind())
            .bind(new_pass.requester.id_string())
            .bind(new_pass.scheduled_at)
            .bind(&new_pass.reason)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await;
        timer.record();

        match result {
            Ok(Some(entity)) => Ok(Some(Pass::try_from(entity)?)),
            Ok(None) => {
                // Nothing inserted: either a duplicate or the event is gone
                if self.event_is_live(new_pass.event_id).await? {
                    Ok(None)
                } else {
                    Err(StoreError::NotFound(format!("Event {}", new_pass.event_id)))
                }
            }
            Err(e) => match store_error(e) {
                StoreError::UniqueViolation(_) => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn get_pass(&self, id: Uuid) -> Result<Option<Pass>, StoreError> {
        let timer = QueryTimer::new("get_pass");
        let sql = format!("SELECT {} FROM passes WHERE id = $1", PASS_COLUMNS);
        let result = sqlx::query_as::<_, PassEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result.map_err(store_error)?.map(Pass::try_from).transpose()
    }

    async fn list_by_event(&self, event_id: Uuid) -> Result<Vec<Pass>, StoreError> {
        let sql = format!(
            "SELECT {} FROM passes WHERE event_id = $1 ORDER BY created_at ASC",
            PASS_COLUMNS
        );
        let timer = QueryTimer::new("list_passes_by_event");
        let result = sqlx::query_as::<_, PassEntity>(&sql)
            .bind(event_id)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        into_passes(result)
    }

    async fn list_by_user(&self, user_id: i64, page: Page) -> Result<Vec<Pass>, StoreError> {
        let sql = format!(
            "SELECT {} FROM passes WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            PASS_COLUMNS
        );
        let timer = QueryTimer::new("list_passes_by_user");
        let result = sqlx::query_as::<_, PassEntity>(&sql)
            .bind(user_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        into_passes(result)
    }

    async fn list_by_requester(
        &self,
        requester: Requester,
        page: Page,
    ) -> Result<Vec<Pass>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM passes
            WHERE requester_type = $1 AND requester_id = $2
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
            PASS_COLUMNS
        );
        let timer = QueryTimer::new("list_passes_by_requester");
        let result = sqlx::query_as::<_, PassEntity>(&sql)
            .bind(requester.kind())
            .bind(requester.id_string())
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        into_passes(result)
    }

    async fn count_by_requester(&self, requester: Requester) -> Result<i64, StoreError> {
        let timer = QueryTimer::new("count_passes_by_requester");
        let result: Result<(i64,), sqlx::Error> = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM passes
            WHERE requester_type = $1 AND requester_id = $2
            "#,
        )
        .bind(requester.kind())
        .bind(requester.id_string())
        .fetch_one(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(store_error)?.0)
    }

    async fn list_due(&self, before: DateTime<Utc>) -> Result<Vec<Pass>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM passes
            WHERE status = 'pending' AND scheduled_at <= $1
            ORDER BY scheduled_at ASC
            "#,
            PASS_COLUMNS
        );
        let timer = QueryTimer::new("list_due_passes");
        let result = sqlx::query_as::<_, PassEntity>(&sql)
            .bind(before)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        into_passes(result)
    }

    async fn mark_sent(
        &self,
        ids: &[Uuid],
        sent_at: DateTime<Utc>,
        email_sent: bool,
        telegram_sent: bool,
    ) -> Result<u64, StoreError> {
        let timer = QueryTimer::new("mark_passes_sent");
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        let result = sqlx::query(
            r#"
            UPDATE passes
            SET status = 'sent', sent_at = $2, email_sent = $3, telegram_sent = $4, updated_at = $2
            WHERE id = ANY($1) AND status = 'pending'
            "#,
        )
        .bind(ids)
        .bind(sent_at)
        .bind(email_sent)
        .bind(telegram_sent)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;
        tx.commit().await.map_err(store_error)?;
        timer.record();
        Ok(result.rows_affected())
    }

    async fn get_active_pass(
        &self,
        event_id: Uuid,
        user_id: i64,
    ) -> Result<Option<Pass>, StoreError> {
        let timer = QueryTimer::new("get_active_pass");
        let sql = format!(
            r#"
            SELECT {} FROM passes
            WHERE event_id = $1 AND user_id = $2 AND status <> 'cancelled'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
            PASS_COLUMNS
        );
        let result = sqlx::query_as::<_, PassEntity>(&sql)
            .bind(event_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result.map_err(store_error)?.map(Pass::try_from).transpose()
    }

    async fn has_active_pass(&self, event_id: Uuid, user_id: i64) -> Result<bool, StoreError> {
        let timer = QueryTimer::new("has_active_pass");
        let result: Result<(bool,), sqlx::Error> = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM passes
                WHERE event_id = $1 AND user_id = $2 AND status <> 'cancelled'
            )
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(store_error)?.0)
    }

    async fn cancel_for_pair(
        &self,
        event_id: Uuid,
        user_id: i64,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let timer = QueryTimer::new("cancel_passes_for_pair");
        let result = sqlx::query(
            r#"
            UPDATE passes
            SET status = 'cancelled',
                notes = CASE WHEN notes = '' THEN $3 ELSE notes || '; ' || $3 END,
                updated_at = $4
            WHERE event_id = $1 AND user_id = $2 AND status = 'pending'
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .bind(note)
        .bind(at)
        .execute(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(store_error)?.rows_affected())
    }

    async fn statistics_for_event(&self, event_id: Uuid) -> Result<PassStatistics, StoreError> {
        let timer = QueryTimer::new("pass_statistics_for_event");
        let result = sqlx::query_as::<_, PassStatisticsEntity>(
            r#"
            SELECT COUNT(*) AS total,
                   COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                   COUNT(*) FILTER (WHERE status = 'sent') AS sent,
                   COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled
            FROM passes
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(store_error)?.into())
    }
}
