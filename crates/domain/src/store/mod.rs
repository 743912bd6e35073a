//! Storage abstractions used by the domain services.
//!
//! The Postgres implementations live in the `persistence` crate; [`memory`]
//! holds an in-process implementation for development and tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::pagination::Page;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Event, NewPass, Pass, PassStatistics, Requester, User};

pub use memory::InMemoryStore;

/// Persistence of pass rows.
#[async_trait]
pub trait PassStore: Send + Sync {
    /// Inserts a pending pass.
    ///
    /// Returns `Ok(None)` when a non-cancelled pass already exists for the
    /// (event, user) pair. Uniqueness is enforced by the store itself.
    /// Fails with [`StoreError::NotFound`] unless the event is live at the
    /// moment of the insert.
    async fn create_pass(&self, new_pass: NewPass) -> Result<Option<Pass>, StoreError>;

    async fn get_pass(&self, id: Uuid) -> Result<Option<Pass>, StoreError>;

    async fn list_by_event(&self, event_id: Uuid) -> Result<Vec<Pass>, StoreError>;

    async fn list_by_user(&self, user_id: i64, page: Page) -> Result<Vec<Pass>, StoreError>;

    async fn list_by_requester(
        &self,
        requester: Requester,
        page: Page,
    ) -> Result<Vec<Pass>, StoreError>;

    async fn count_by_requester(&self, requester: Requester) -> Result<i64, StoreError>;

    /// Pending passes with `scheduled_at <= before`, oldest first.
    async fn list_due(&self, before: DateTime<Utc>) -> Result<Vec<Pass>, StoreError>;

    /// Marks the given pending passes as sent in one transaction.
    ///
    /// Passes that are no longer pending are skipped. Returns the number of
    /// rows updated.
    async fn mark_sent(
        &self,
        ids: &[Uuid],
        sent_at: DateTime<Utc>,
        email_sent: bool,
        telegram_sent: bool,
    ) -> Result<u64, StoreError>;

    /// Returns the non-cancelled pass for the pair, if any.
    async fn get_active_pass(
        &self,
        event_id: Uuid,
        user_id: i64,
    ) -> Result<Option<Pass>, StoreError>;

    async fn has_active_pass(&self, event_id: Uuid, user_id: i64) -> Result<bool, StoreError> {
        Ok(self.get_active_pass(event_id, user_id).await?.is_some())
    }

    /// Cancels every pending pass for the pair, appending `note`.
    async fn cancel_for_pair(
        &self,
        event_id: Uuid,
        user_id: i64,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn statistics_for_event(&self, event_id: Uuid) -> Result<PassStatistics, StoreError>;
}

/// Read-only lookups into the surrounding event and user tables.
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    /// Returns the event if it exists and is not soft-deleted.
    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, StoreError>;

    async fn find_users(&self, ids: &[i64]) -> Result<Vec<User>, StoreError>;

    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.find_users(&[id]).await?.into_iter().next())
    }
}

/// Entry point of a soft-delete transaction.
#[async_trait]
pub trait SoftDeleteStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn SoftDeleteTx>, StoreError>;
}

/// Operations available inside one soft-delete transaction.
///
/// Nothing is visible to other readers until [`SoftDeleteTx::commit`].
/// Dropping the transaction without committing rolls it back.
#[async_trait]
pub trait SoftDeleteTx: Send {
    /// Whether the event exists and is not yet soft-deleted.
    async fn event_is_live(&mut self, event_id: Uuid) -> Result<bool, StoreError>;

    async fn club_is_live(&mut self, club_id: Uuid) -> Result<bool, StoreError>;

    /// IDs of the club's events that are not yet soft-deleted.
    async fn live_events_of_club(&mut self, club_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    async fn cancel_pending_passes(
        &mut self,
        event_id: Uuid,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn soft_delete_participants(
        &mut self,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn soft_delete_notifications(
        &mut self,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn soft_delete_club_owners(
        &mut self,
        club_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn soft_delete_ignore_mailings(
        &mut self,
        club_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    async fn mark_event_deleted(&mut self, event_id: Uuid, at: DateTime<Utc>)
        -> Result<u64, StoreError>;

    async fn mark_club_deleted(&mut self, club_id: Uuid, at: DateTime<Utc>)
        -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
