//! In-memory storage backend.
//!
//! Implements every storage trait over a single mutex-guarded state. A
//! soft-delete transaction holds the lock for its whole lifetime and
//! restores a snapshot unless committed, so it is atomic and isolated.
//! Named operations can be made to fail for tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::pagination::Page;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{DirectoryLookup, PassStore, SoftDeleteStore, SoftDeleteTx};
use crate::error::StoreError;
use crate::models::{
    Club, Event, NewPass, Pass, PassStatistics, PassStatus, Requester, User,
};

/// Kinds of rows that hang off an event or a club.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependentKind {
    /// Event registration; parent is the event.
    Participant,
    /// Scheduled event notification; parent is the event.
    Notification,
    /// Club ownership; parent is the club.
    ClubOwner,
    /// Mailing opt-out; parent is the club.
    IgnoreMailing,
}

#[derive(Debug, Clone)]
struct DependentRow {
    kind: DependentKind,
    parent_id: Uuid,
    user_id: Option<i64>,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
struct MemoryState {
    passes: Vec<Pass>,
    events: HashMap<Uuid, Event>,
    users: HashMap<i64, User>,
    clubs: HashMap<Uuid, Club>,
    dependents: Vec<DependentRow>,
    failures: HashSet<String>,
}

impl MemoryState {
    fn check(&self, operation: &str) -> Result<(), StoreError> {
        if self.failures.contains(operation) {
            return Err(StoreError::Database(format!(
                "injected failure in {}",
                operation
            )));
        }
        Ok(())
    }

    fn soft_delete_dependents(
        &mut self,
        kind: DependentKind,
        parent_id: Uuid,
        at: DateTime<Utc>,
    ) -> u64 {
        let mut affected = 0;
        for row in self
            .dependents
            .iter_mut()
            .filter(|r| r.kind == kind && r.parent_id == parent_id && r.deleted_at.is_none())
        {
            row.deleted_at = Some(at);
            affected += 1;
        }
        affected
    }
}

/// In-memory implementation of [`PassStore`], [`DirectoryLookup`] and
/// [`SoftDeleteStore`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_event(&self, event: Event) {
        self.state.lock().await.events.insert(event.id, event);
    }

    pub async fn insert_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_club(&self, club: Club) {
        self.state.lock().await.clubs.insert(club.id, club);
    }

    /// Registers `user_id` as a participant of `event_id`.
    pub async fn add_participant(&self, event_id: Uuid, user_id: i64) {
        self.state.lock().await.dependents.push(DependentRow {
            kind: DependentKind::Participant,
            parent_id: event_id,
            user_id: Some(user_id),
            deleted_at: None,
        });
    }

    pub async fn add_dependent(&self, kind: DependentKind, parent_id: Uuid) {
        self.state.lock().await.dependents.push(DependentRow {
            kind,
            parent_id,
            user_id: None,
            deleted_at: None,
        });
    }

    /// Makes every later call of `operation` fail with a database error.
    pub async fn fail_operation(&self, operation: &str) {
        self.state.lock().await.failures.insert(operation.to_string());
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }

    /// Number of dependents of `kind` under `parent_id` that are not deleted.
    pub async fn live_dependents(&self, kind: DependentKind, parent_id: Uuid) -> usize {
        self.state
            .lock()
            .await
            .dependents
            .iter()
            .filter(|r| r.kind == kind && r.parent_id == parent_id && r.deleted_at.is_none())
            .count()
    }

    /// Returns the event row including soft-deleted ones.
    pub async fn raw_event(&self, id: Uuid) -> Option<Event> {
        self.state.lock().await.events.get(&id).cloned()
    }

    /// Returns the club row including soft-deleted ones.
    pub async fn raw_club(&self, id: Uuid) -> Option<Club> {
        self.state.lock().await.clubs.get(&id).cloned()
    }

    pub async fn all_passes(&self) -> Vec<Pass> {
        self.state.lock().await.passes.clone()
    }
}

fn paginate(mut passes: Vec<Pass>, page: Page) -> Vec<Pass> {
    passes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let (start, end) = page.bounds(passes.len());
    passes[start..end].to_vec()
}

#[async_trait]
impl PassStore for InMemoryStore {
    async fn create_pass(&self, new_pass: NewPass) -> Result<Option<Pass>, StoreError> {
        let mut state = self.state.lock().await;
        state.check("create_pass")?;

        if !state
            .events
            .get(&new_pass.event_id)
            .is_some_and(|e| !e.is_deleted())
        {
            return Err(StoreError::NotFound(format!("Event {}", new_pass.event_id)));
        }

        let duplicate = state.passes.iter().any(|p| {
            p.event_id == new_pass.event_id
                && p.user_id == new_pass.user_id
                && p.status != PassStatus::Cancelled
        });
        if duplicate {
            return Ok(None);
        }

        let pass = new_pass.into_pass(Uuid::new_v4(), Utc::now());
        state.passes.push(pass.clone());
        Ok(Some(pass))
    }

    async fn get_pass(&self, id: Uuid) -> Result<Option<Pass>, StoreError> {
        let state = self.state.lock().await;
        state.check("get_pass")?;
        Ok(state.passes.iter().find(|p| p.id == id).cloned())
    }

    async fn list_by_event(&self, event_id: Uuid) -> Result<Vec<Pass>, StoreError> {
        let state = self.state.lock().await;
        state.check("list_by_event")?;
        let mut passes: Vec<Pass> = state
            .passes
            .iter()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect();
        passes.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(passes)
    }

    async fn list_by_user(&self, user_id: i64, page: Page) -> Result<Vec<Pass>, StoreError> {
        let state = self.state.lock().await;
        state.check("list_by_user")?;
        let passes = state
            .passes
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        Ok(paginate(passes, page))
    }

    async fn list_by_requester(
        &self,
        requester: Requester,
        page: Page,
    ) -> Result<Vec<Pass>, StoreError> {
        let state = self.state.lock().await;
        state.check("list_by_requester")?;
        let passes = state
            .passes
            .iter()
            .filter(|p| p.requester == requester)
            .cloned()
            .collect();
        Ok(paginate(passes, page))
    }

    async fn count_by_requester(&self, requester: Requester) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        state.check("count_by_requester")?;
        Ok(state.passes.iter().filter(|p| p.requester == requester).count() as i64)
    }

    async fn list_due(&self, before: DateTime<Utc>) -> Result<Vec<Pass>, StoreError> {
        let state = self.state.lock().await;
        state.check("list_due")?;
        let mut passes: Vec<Pass> = state
            .passes
            .iter()
            .filter(|p| p.status == PassStatus::Pending && p.scheduled_at <= before)
            .cloned()
            .collect();
        passes.sort_by(|a, b| a.scheduled_at.cmp(&b.scheduled_at));
        Ok(passes)
    }

    async fn mark_sent(
        &self,
        ids: &[Uuid],
        sent_at: DateTime<Utc>,
        email_sent: bool,
        telegram_sent: bool,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        state.check("mark_sent")?;
        let ids: HashSet<&Uuid> = ids.iter().collect();
        let mut affected = 0;
        for pass in state
            .passes
            .iter_mut()
            .filter(|p| ids.contains(&p.id) && p.status == PassStatus::Pending)
        {
            if pass.mark_sent(sent_at, email_sent, telegram_sent).is_ok() {
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn get_active_pass(
        &self,
        event_id: Uuid,
        user_id: i64,
    ) -> Result<Option<Pass>, StoreError> {
        let state = self.state.lock().await;
        state.check("get_active_pass")?;
        Ok(state
            .passes
            .iter()
            .filter(|p| {
                p.event_id == event_id && p.user_id == user_id && p.status != PassStatus::Cancelled
            })
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn cancel_for_pair(
        &self,
        event_id: Uuid,
        user_id: i64,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        state.check("cancel_for_pair")?;
        let mut affected = 0;
        for pass in state.passes.iter_mut().filter(|p| {
            p.event_id == event_id && p.user_id == user_id && p.status == PassStatus::Pending
        }) {
            if pass.cancel(at, Some(note)).is_ok() {
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn statistics_for_event(&self, event_id: Uuid) -> Result<PassStatistics, StoreError> {
        let state = self.state.lock().await;
        state.check("statistics_for_event")?;
        Ok(PassStatistics::from_passes(
            state.passes.iter().filter(|p| p.event_id == event_id),
        ))
    }
}

#[async_trait]
impl DirectoryLookup for InMemoryStore {
    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        let state = self.state.lock().await;
        state.check("find_event")?;
        Ok(state.events.get(&id).filter(|e| !e.is_deleted()).cloned())
    }

    async fn find_users(&self, ids: &[i64]) -> Result<Vec<User>, StoreError> {
        let state = self.state.lock().await;
        state.check("find_users")?;
        let unique: HashSet<&i64> = ids.iter().collect();
        Ok(unique
            .into_iter()
            .filter_map(|id| state.users.get(id).cloned())
            .collect())
    }
}

/// Soft-delete transaction over the in-memory state.
struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    snapshot: Option<MemoryState>,
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl SoftDeleteStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn SoftDeleteTx>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        guard.check("begin")?;
        let snapshot = Some(guard.clone());
        Ok(Box::new(MemoryTx { guard, snapshot }))
    }
}

#[async_trait]
impl SoftDeleteTx for MemoryTx {
    async fn event_is_live(&mut self, event_id: Uuid) -> Result<bool, StoreError> {
        self.guard.check("event_is_live")?;
        Ok(self
            .guard
            .events
            .get(&event_id)
            .is_some_and(|e| !e.is_deleted()))
    }

    async fn club_is_live(&mut self, club_id: Uuid) -> Result<bool, StoreError> {
        self.guard.check("club_is_live")?;
        Ok(self
            .guard
            .clubs
            .get(&club_id)
            .is_some_and(|c| c.deleted_at.is_none()))
    }

    async fn live_events_of_club(&mut self, club_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        self.guard.check("live_events_of_club")?;
        let mut events: Vec<&Event> = self
            .guard
            .events
            .values()
            .filter(|e| e.club_id == club_id && !e.is_deleted())
            .collect();
        events.sort_by_key(|e| e.start_time);
        Ok(events.into_iter().map(|e| e.id).collect())
    }

    async fn cancel_pending_passes(
        &mut self,
        event_id: Uuid,
        note: &str,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.guard.check("cancel_pending_passes")?;
        let mut affected = 0;
        for pass in self
            .guard
            .passes
            .iter_mut()
            .filter(|p| p.event_id == event_id && p.status == PassStatus::Pending)
        {
            if pass.cancel(at, Some(note)).is_ok() {
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn soft_delete_participants(
        &mut self,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.guard.check("soft_delete_participants")?;
        Ok(self
            .guard
            .soft_delete_dependents(DependentKind::Participant, event_id, at))
    }

    async fn soft_delete_notifications(
        &mut self,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.guard.check("soft_delete_notifications")?;
        Ok(self
            .guard
            .soft_delete_dependents(DependentKind::Notification, event_id, at))
    }

    async fn soft_delete_club_owners(
        &mut self,
        club_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.guard.check("soft_delete_club_owners")?;
        Ok(self
            .guard
            .soft_delete_dependents(DependentKind::ClubOwner, club_id, at))
    }

    async fn soft_delete_ignore_mailings(
        &mut self,
        club_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.guard.check("soft_delete_ignore_mailings")?;
        Ok(self
            .guard
            .soft_delete_dependents(DependentKind::IgnoreMailing, club_id, at))
    }

    async fn mark_event_deleted(
        &mut self,
        event_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.guard.check("mark_event_deleted")?;
        match self.guard.events.get_mut(&event_id) {
            Some(event) if event.deleted_at.is_none() => {
                event.deleted_at = Some(at);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn mark_club_deleted(
        &mut self,
        club_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.guard.check("mark_club_deleted")?;
        match self.guard.clubs.get_mut(&club_id) {
            Some(club) if club.deleted_at.is_none() => {
                club.deleted_at = Some(at);
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut tx = self;
        tx.guard.check("commit")?;
        tx.snapshot = None;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        drop(self);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn live_event(store: &InMemoryStore) -> Uuid {
        let event = Event {
            id: Uuid::new_v4(),
            club_id: Uuid::new_v4(),
            name: "Open day".to_string(),
            location: "Lobby".to_string(),
            start_time: Utc::now() + Duration::days(2),
            pass_required: true,
            deleted_at: None,
        };
        let id = event.id;
        store.insert_event(event).await;
        id
    }

    fn new_pass(event_id: Uuid, user_id: i64) -> NewPass {
        NewPass {
            event_id,
            user_id,
            requester: Requester::User(user_id),
            reason: "registration".to_string(),
            scheduled_at: Utc::now() - Duration::minutes(5),
        }
    }

    #[tokio::test]
    async fn test_create_pass_rejects_second_active_pass() {
        let store = InMemoryStore::new();
        let event_id = live_event(&store).await;

        assert!(store.create_pass(new_pass(event_id, 1)).await.unwrap().is_some());
        assert!(store.create_pass(new_pass(event_id, 1)).await.unwrap().is_none());
        assert!(store.create_pass(new_pass(event_id, 2)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_pass_allowed_after_cancel() {
        let store = InMemoryStore::new();
        let event_id = live_event(&store).await;
        store.create_pass(new_pass(event_id, 1)).await.unwrap();
        let cancelled = store
            .cancel_for_pair(event_id, 1, "user unregistered", Utc::now())
            .await
            .unwrap();
        assert_eq!(cancelled, 1);
        assert!(store.create_pass(new_pass(event_id, 1)).await.unwrap().is_some());
        assert_eq!(store.list_by_event(event_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_mark_sent_skips_non_pending() {
        let store = InMemoryStore::new();
        let event_id = live_event(&store).await;
        let a = store.create_pass(new_pass(event_id, 1)).await.unwrap().unwrap();
        let b = store.create_pass(new_pass(event_id, 2)).await.unwrap().unwrap();
        store
            .cancel_for_pair(event_id, 2, "user unregistered", Utc::now())
            .await
            .unwrap();

        let updated = store
            .mark_sent(&[a.id, b.id], Utc::now(), true, false)
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let b = store.get_pass(b.id).await.unwrap().unwrap();
        assert_eq!(b.status, PassStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_list_due_only_pending_and_past() {
        let store = InMemoryStore::new();
        let event_id = live_event(&store).await;
        store.create_pass(new_pass(event_id, 1)).await.unwrap();
        let mut future = new_pass(event_id, 2);
        future.scheduled_at = Utc::now() + Duration::hours(3);
        store.create_pass(future).await.unwrap();

        let due = store.list_due(Utc::now()).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].user_id, 1);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = InMemoryStore::new();
        store.fail_operation("list_due").await;
        assert!(matches!(
            store.list_due(Utc::now()).await,
            Err(StoreError::Database(_))
        ));
        store.clear_failures().await;
        assert!(store.list_due(Utc::now()).await.is_ok());
    }

    #[tokio::test]
    async fn test_transaction_dropped_without_commit_rolls_back() {
        let store = InMemoryStore::new();
        let event_id = live_event(&store).await;
        store.create_pass(new_pass(event_id, 1)).await.unwrap();

        {
            let mut tx = store.begin().await.unwrap();
            let n = tx
                .cancel_pending_passes(event_id, "parent event removed", Utc::now())
                .await
                .unwrap();
            assert_eq!(n, 1);
        }

        let passes = store.list_by_event(event_id).await.unwrap();
        assert_eq!(passes[0].status, PassStatus::Pending);
    }

    #[tokio::test]
    async fn test_transaction_commit_persists() {
        let store = InMemoryStore::new();
        let event_id = live_event(&store).await;
        store.create_pass(new_pass(event_id, 1)).await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.cancel_pending_passes(event_id, "parent event removed", Utc::now())
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let passes = store.list_by_event(event_id).await.unwrap();
        assert_eq!(passes[0].status, PassStatus::Cancelled);
        assert_eq!(passes[0].notes, "parent event removed");
    }

    #[tokio::test]
    async fn test_create_pass_requires_live_event() {
        let store = InMemoryStore::new();
        let missing = store.create_pass(new_pass(Uuid::new_v4(), 1)).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));

        let event_id = live_event(&store).await;
        let mut tx = store.begin().await.unwrap();
        tx.mark_event_deleted(event_id, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let deleted = store.create_pass(new_pass(event_id, 1)).await;
        assert!(matches!(deleted, Err(StoreError::NotFound(_))));
        assert!(store.all_passes().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_insert_racing_soft_delete_leaves_no_pending_pass() {
        let store = InMemoryStore::new();
        let event_id = live_event(&store).await;

        // The registration read the event while it was live; its insert
        // lands while the delete transaction is open.
        let mut tx = store.begin().await.unwrap();
        let racing = {
            let store = store.clone();
            tokio::spawn(async move { store.create_pass(new_pass(event_id, 1)).await })
        };
        tx.cancel_pending_passes(event_id, "parent event removed", Utc::now())
            .await
            .unwrap();
        tx.mark_event_deleted(event_id, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        assert!(matches!(racing.await.unwrap(), Err(StoreError::NotFound(_))));
        let pending = store
            .all_passes()
            .await
            .into_iter()
            .filter(|p| p.status == PassStatus::Pending)
            .count();
        assert_eq!(pending, 0);
    }
}
