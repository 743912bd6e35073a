//! Soft-delete transactions for the cascade.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::store::{SoftDeleteStore, SoftDeleteTx};
use domain::StoreError;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::store_error;

/// Opens Postgres transactions for cascading soft-delete.
#[derive(Clone)]
pub struct SoftDeleteRepository {
    pool: PgPool,
}

impl SoftDeleteRepository {
    /// Creates a new SoftDeleteRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SoftDeleteStore for SoftDeleteRepository {
    async fn begin(&self) -> Result<Box<dyn SoftDeleteTx>, StoreError> {
        let tx = self.pool.begin().await.map_err(store_error)?;
        Ok(Box::new(PgSoftDeleteTx { tx }))
    }
}

/// A soft-delete transaction. Dropping it without commit rolls back.
pub struct PgSoftDeleteTx {
    tx: Transaction<'static, Postgres>,
}

impl PgSoftDeleteTx {
    /// Sets `deleted_at` on live rows of `table` where `column` matches.
    async fn soft_delete_where(
        &mut self,
        table: &'static str,
        column: &'static str,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let sql = format!(
            "UPDATE {} SET deleted_at = $2 WHERE {} = $1 AND deleted_at IS NULL",
            table, column
        );
        let result = sqlx::query(&sql)
            .bind(id)
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(store_error)?;
        Ok(result.rows_affected())
    }

    /// Locks the row when it is live, so concurrent pass inserts for it
    /// wait for this transaction.
    async fn lock_live(&mut self, table: &'static str, id: Uuid) -> Result<bool, StoreError> {
        let sql = format!(
            "SELECT id FROM {} WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
            table
        );
        let row: Option<(Uuid,)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(store_error)?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl SoftDeleteTx for PgSoftDeleteTx {
    async fn event_is_live(&mut self, event_id: Uuid) -> Result<bool, StoreError> {
        self.lock_live("events", event_id).await
    }

    async fn club_is_live(&mut self, club_id: Uuid) -> Result<bool, StoreError> {
        self.lock_live("clubs", club_id).await
    }

    async fn live_events_of_club(&mut self, club_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM events
            WHERE club_id = $1 AND deleted_at IS NULL
            ORDER BY start_time ASC
            FOR UPDATE
            "#,
        )
        .bind(club_id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn cancel_pending_passes(
        &mut self,
        event_id: Uuid,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE passes
            SET status = 'cancelled',
                notes = CASE WHEN notes = '' THEN $2 ELSE notes || '; ' || $2 END,
                updated_at = $3
            WHERE event_id = $1 AND status = 'pending'
            "#,
        )
        .bind(event_id)
        .bind(note)
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(store_error)?;
        Ok(result.rows_affected())
    }

    async fn soft_delete_participants(
        &mut self,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.soft_delete_where("event_participants", "event_id", event_id, at)
            .await
    }

    async fn soft_delete_notifications(
        &mut self,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.soft_delete_where("notifications", "event_id", event_id, at)
            .await
    }

    async fn soft_delete_club_owners(
        &mut self,
        club_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.soft_delete_where("club_owners", "club_id", club_id, at)
            .await
    }

    async fn soft_delete_ignore_mailings(
        &mut self,
        club_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.soft_delete_where("ignore_mailings", "club_id", club_id, at)
            .await
    }

    async fn mark_event_deleted(
        &mut self,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.soft_delete_where("events", "id", event_id, at).await
    }

    async fn mark_club_deleted(
        &mut self,
        club_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.soft_delete_where("clubs", "id", club_id, at).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(store_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await.map_err(store_error)
    }
}
