//! Cascading soft-delete of events and clubs.
//!
//! What happens to an entity's dependents is declared once in a
//! [`CascadeRegistry`]. [`SoftDeleter::soft_delete`] is the only entry point
//! and runs the declared actions plus the parent's own `deleted_at` in a
//! single transaction.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use uuid::Uuid;

use crate::error::CascadeError;
use crate::store::{SoftDeleteStore, SoftDeleteTx};

/// Note appended to passes cancelled because their event went away.
pub const PARENT_REMOVED_NOTE: &str = "parent event removed";

/// Entity types that can be soft-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Event,
    Club,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Event => "Event",
            EntityKind::Club => "Club",
        }
    }
}

/// A single cleanup step run on the dependents of a deleted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupAction {
    /// Cancel the event's pending passes. Pass rows are kept.
    CancelPendingPasses,
    SoftDeleteParticipants,
    SoftDeleteNotifications,
    /// Soft-delete every live event of the club, cascading each one.
    SoftDeleteOwnedEvents,
    SoftDeleteClubOwners,
    SoftDeleteIgnoreMailings,
}

/// Declarative table of cleanup actions per entity type.
#[derive(Debug, Clone, Default)]
pub struct CascadeRegistry {
    actions: HashMap<EntityKind, Vec<CleanupAction>>,
}

impl CascadeRegistry {
    /// An empty registry: deleting only writes the parent's marker.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry used in production.
    pub fn standard() -> Self {
        Self::new()
            .register(
                EntityKind::Event,
                vec![
                    CleanupAction::CancelPendingPasses,
                    CleanupAction::SoftDeleteParticipants,
                    CleanupAction::SoftDeleteNotifications,
                ],
            )
            .register(
                EntityKind::Club,
                vec![
                    CleanupAction::SoftDeleteOwnedEvents,
                    CleanupAction::SoftDeleteClubOwners,
                    CleanupAction::SoftDeleteIgnoreMailings,
                ],
            )
    }

    /// Replaces the ordered action list for `kind`.
    pub fn register(mut self, kind: EntityKind, actions: Vec<CleanupAction>) -> Self {
        self.actions.insert(kind, actions);
        self
    }

    pub fn actions_for(&self, kind: EntityKind) -> &[CleanupAction] {
        self.actions.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// The entity to soft-delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoftDeleteTarget {
    Event(Uuid),
    Club(Uuid),
}

impl SoftDeleteTarget {
    pub fn kind(&self) -> EntityKind {
        match self {
            SoftDeleteTarget::Event(_) => EntityKind::Event,
            SoftDeleteTarget::Club(_) => EntityKind::Club,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            SoftDeleteTarget::Event(id) | SoftDeleteTarget::Club(id) => *id,
        }
    }
}

/// Rows affected by one soft-delete, summed over nested cascades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CascadeReport {
    pub entity: EntityKind,
    pub id: Uuid,
    pub deleted_at: DateTime<Utc>,
    pub affected: BTreeMap<CleanupAction, u64>,
    pub events_deleted: u64,
    pub clubs_deleted: u64,
}

impl CascadeReport {
    fn new(target: SoftDeleteTarget, deleted_at: DateTime<Utc>) -> Self {
        Self {
            entity: target.kind(),
            id: target.id(),
            deleted_at,
            affected: BTreeMap::new(),
            events_deleted: 0,
            clubs_deleted: 0,
        }
    }

    fn record(&mut self, action: CleanupAction, affected: u64) {
        *self.affected.entry(action).or_insert(0) += affected;
    }

    pub fn affected_by(&self, action: CleanupAction) -> u64 {
        self.affected.get(&action).copied().unwrap_or(0)
    }
}

/// Generic soft-delete entry point.
pub struct SoftDeleter {
    store: Arc<dyn SoftDeleteStore>,
    registry: CascadeRegistry,
}

impl SoftDeleter {
    pub fn new(store: Arc<dyn SoftDeleteStore>, registry: CascadeRegistry) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &CascadeRegistry {
        &self.registry
    }

    /// Soft-deletes `target` and its dependents atomically.
    pub async fn soft_delete(&self, target: SoftDeleteTarget) -> Result<CascadeReport, CascadeError> {
        let now = Utc::now();
        let mut report = CascadeReport::new(target, now);
        let mut tx = self.store.begin().await?;

        match self.apply(tx.as_mut(), target, now, &mut report).await {
            Ok(()) => {
                tx.commit().await?;
                tracing::info!(
                    entity = target.kind().as_str(),
                    id = %target.id(),
                    events_deleted = report.events_deleted,
                    passes_cancelled = report.affected_by(CleanupAction::CancelPendingPasses),
                    "Soft delete committed"
                );
                Ok(report)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!(error = %rollback_err, "Soft delete rollback failed");
                }
                tracing::warn!(
                    entity = target.kind().as_str(),
                    id = %target.id(),
                    error = %e,
                    "Soft delete rolled back"
                );
                Err(e)
            }
        }
    }

    fn apply<'a>(
        &'a self,
        tx: &'a mut dyn SoftDeleteTx,
        target: SoftDeleteTarget,
        now: DateTime<Utc>,
        report: &'a mut CascadeReport,
    ) -> BoxFuture<'a, Result<(), CascadeError>> {
        async move {
            let id = target.id();
            let live = match target {
                SoftDeleteTarget::Event(_) => tx.event_is_live(id).await?,
                SoftDeleteTarget::Club(_) => tx.club_is_live(id).await?,
            };
            if !live {
                return Err(CascadeError::NotFound {
                    entity: target.kind().as_str(),
                    id,
                });
            }

            for &action in self.registry.actions_for(target.kind()) {
                let affected = match action {
                    CleanupAction::CancelPendingPasses => {
                        tx.cancel_pending_passes(id, PARENT_REMOVED_NOTE, now).await?
                    }
                    CleanupAction::SoftDeleteParticipants => {
                        tx.soft_delete_participants(id, now).await?
                    }
                    CleanupAction::SoftDeleteNotifications => {
                        tx.soft_delete_notifications(id, now).await?
                    }
                    CleanupAction::SoftDeleteOwnedEvents => {
                        let events = tx.live_events_of_club(id).await?;
                        for event_id in &events {
                            self.apply(&mut *tx, SoftDeleteTarget::Event(*event_id), now, report)
                                .await?;
                        }
                        events.len() as u64
                    }
                    CleanupAction::SoftDeleteClubOwners => {
                        tx.soft_delete_club_owners(id, now).await?
                    }
                    CleanupAction::SoftDeleteIgnoreMailings => {
                        tx.soft_delete_ignore_mailings(id, now).await?
                    }
                };
                tracing::debug!(
                    entity = target.kind().as_str(),
                    id = %id,
                    action = ?action,
                    affected = affected,
                    "Cleanup action applied"
                );
                report.record(action, affected);
            }

            match target {
                SoftDeleteTarget::Event(_) => {
                    report.events_deleted += tx.mark_event_deleted(id, now).await?;
                }
                SoftDeleteTarget::Club(_) => {
                    report.clubs_deleted += tx.mark_club_deleted(id, now).await?;
                }
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Club, Event, NewPass, PassStatus, Requester};
    use crate::store::memory::DependentKind;
    use crate::store::{InMemoryStore, PassStore};

    fn event(club_id: Uuid) -> Event {
        Event {
            id: Uuid::new_v4(),
            club_id,
            name: "Open lecture".to_string(),
            location: "Auditorium 3".to_string(),
            start_time: Utc::now() + chrono::Duration::days(3),
            pass_required: true,
            deleted_at: None,
        }
    }

    async fn add_pass(store: &InMemoryStore, event_id: Uuid, user_id: i64) -> Uuid {
        store
            .create_pass(NewPass {
                event_id,
                user_id,
                requester: Requester::User(user_id),
                reason: "registration".to_string(),
                scheduled_at: Utc::now() + chrono::Duration::days(2),
            })
            .await
            .unwrap()
            .unwrap()
            .id
    }

    fn deleter(store: &InMemoryStore) -> SoftDeleter {
        SoftDeleter::new(Arc::new(store.clone()), CascadeRegistry::standard())
    }

    #[test]
    fn test_standard_registry_contents() {
        let registry = CascadeRegistry::standard();
        assert_eq!(
            registry.actions_for(EntityKind::Event),
            &[
                CleanupAction::CancelPendingPasses,
                CleanupAction::SoftDeleteParticipants,
                CleanupAction::SoftDeleteNotifications,
            ]
        );
        assert_eq!(
            registry.actions_for(EntityKind::Club)[0],
            CleanupAction::SoftDeleteOwnedEvents
        );
        assert!(CascadeRegistry::new().actions_for(EntityKind::Club).is_empty());
    }

    #[tokio::test]
    async fn test_event_soft_delete_cancels_pending_passes() {
        let store = InMemoryStore::new();
        let ev = event(Uuid::new_v4());
        store.insert_event(ev.clone()).await;
        let pending = add_pass(&store, ev.id, 1).await;
        let sent = add_pass(&store, ev.id, 2).await;
        store.mark_sent(&[sent], Utc::now(), true, true).await.unwrap();
        store.add_participant(ev.id, 1).await;
        store.add_dependent(DependentKind::Notification, ev.id).await;

        let report = deleter(&store)
            .soft_delete(SoftDeleteTarget::Event(ev.id))
            .await
            .unwrap();

        assert_eq!(report.affected_by(CleanupAction::CancelPendingPasses), 1);
        assert_eq!(report.affected_by(CleanupAction::SoftDeleteParticipants), 1);
        assert_eq!(report.events_deleted, 1);

        let pending = store.get_pass(pending).await.unwrap().unwrap();
        assert_eq!(pending.status, PassStatus::Cancelled);
        assert_eq!(pending.notes, PARENT_REMOVED_NOTE);
        let sent = store.get_pass(sent).await.unwrap().unwrap();
        assert_eq!(sent.status, PassStatus::Sent);

        assert!(store.raw_event(ev.id).await.unwrap().deleted_at.is_some());
        assert_eq!(store.live_dependents(DependentKind::Participant, ev.id).await, 0);
        assert_eq!(store.live_dependents(DependentKind::Notification, ev.id).await, 0);
    }

    #[tokio::test]
    async fn test_failure_mid_cascade_changes_nothing() {
        let store = InMemoryStore::new();
        let ev = event(Uuid::new_v4());
        store.insert_event(ev.clone()).await;
        let pass_id = add_pass(&store, ev.id, 1).await;
        store.add_participant(ev.id, 1).await;
        store.fail_operation("soft_delete_notifications").await;

        let err = deleter(&store)
            .soft_delete(SoftDeleteTarget::Event(ev.id))
            .await
            .unwrap_err();
        assert!(matches!(err, CascadeError::Store(_)));

        let pass = store.get_pass(pass_id).await.unwrap().unwrap();
        assert_eq!(pass.status, PassStatus::Pending);
        assert!(pass.notes.is_empty());
        assert!(store.raw_event(ev.id).await.unwrap().deleted_at.is_none());
        assert_eq!(store.live_dependents(DependentKind::Participant, ev.id).await, 1);
    }

    #[tokio::test]
    async fn test_failure_on_commit_changes_nothing() {
        let store = InMemoryStore::new();
        let ev = event(Uuid::new_v4());
        store.insert_event(ev.clone()).await;
        let pass_id = add_pass(&store, ev.id, 1).await;
        store.fail_operation("commit").await;

        assert!(deleter(&store)
            .soft_delete(SoftDeleteTarget::Event(ev.id))
            .await
            .is_err());
        let pass = store.get_pass(pass_id).await.unwrap().unwrap();
        assert_eq!(pass.status, PassStatus::Pending);
    }

    #[tokio::test]
    async fn test_club_soft_delete_cascades_to_events() {
        let store = InMemoryStore::new();
        let club = Club {
            id: Uuid::new_v4(),
            name: "Debate club".to_string(),
            deleted_at: None,
        };
        store.insert_club(club.clone()).await;
        let first = event(club.id);
        let second = event(club.id);
        store.insert_event(first.clone()).await;
        store.insert_event(second.clone()).await;
        let p1 = add_pass(&store, first.id, 1).await;
        let p2 = add_pass(&store, second.id, 1).await;
        store.add_dependent(DependentKind::ClubOwner, club.id).await;
        store.add_dependent(DependentKind::IgnoreMailing, club.id).await;

        let report = deleter(&store)
            .soft_delete(SoftDeleteTarget::Club(club.id))
            .await
            .unwrap();

        assert_eq!(report.affected_by(CleanupAction::SoftDeleteOwnedEvents), 2);
        assert_eq!(report.affected_by(CleanupAction::CancelPendingPasses), 2);
        assert_eq!(report.events_deleted, 2);
        assert_eq!(report.clubs_deleted, 1);

        for id in [p1, p2] {
            let pass = store.get_pass(id).await.unwrap().unwrap();
            assert_eq!(pass.status, PassStatus::Cancelled);
        }
        assert!(store.raw_club(club.id).await.unwrap().deleted_at.is_some());
        assert_eq!(store.live_dependents(DependentKind::ClubOwner, club.id).await, 0);
        assert_eq!(store.live_dependents(DependentKind::IgnoreMailing, club.id).await, 0);
    }

    #[tokio::test]
    async fn test_missing_or_deleted_entity_is_not_found() {
        let store = InMemoryStore::new();
        let ev = event(Uuid::new_v4());
        store.insert_event(ev.clone()).await;
        let deleter = deleter(&store);

        assert!(matches!(
            deleter.soft_delete(SoftDeleteTarget::Club(Uuid::new_v4())).await,
            Err(CascadeError::NotFound { entity: "Club", .. })
        ));

        deleter.soft_delete(SoftDeleteTarget::Event(ev.id)).await.unwrap();
        assert!(matches!(
            deleter.soft_delete(SoftDeleteTarget::Event(ev.id)).await,
            Err(CascadeError::NotFound { entity: "Event", .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_registry_only_marks_parent() {
        let store = InMemoryStore::new();
        let ev = event(Uuid::new_v4());
        store.insert_event(ev.clone()).await;
        let pass_id = add_pass(&store, ev.id, 1).await;

        let deleter = SoftDeleter::new(Arc::new(store.clone()), CascadeRegistry::new());
        let report = deleter.soft_delete(SoftDeleteTarget::Event(ev.id)).await.unwrap();

        assert!(report.affected.is_empty());
        assert_eq!(report.events_deleted, 1);
        let pass = store.get_pass(pass_id).await.unwrap().unwrap();
        assert_eq!(pass.status, PassStatus::Pending);
    }

    #[tokio::test]
    async fn test_removed_event_takes_no_new_pending_pass() {
        let store = InMemoryStore::new();
        let ev = event(Uuid::new_v4());
        store.insert_event(ev.clone()).await;
        add_pass(&store, ev.id, 1).await;

        deleter(&store)
            .soft_delete(SoftDeleteTarget::Event(ev.id))
            .await
            .unwrap();

        let late = store
            .create_pass(NewPass {
                event_id: ev.id,
                user_id: 2,
                requester: Requester::User(2),
                reason: "registration".to_string(),
                scheduled_at: Utc::now() + chrono::Duration::days(2),
            })
            .await;
        assert!(matches!(late, Err(crate::error::StoreError::NotFound(_))));
        assert!(store
            .all_passes()
            .await
            .iter()
            .all(|p| p.status == PassStatus::Cancelled));
    }
}
