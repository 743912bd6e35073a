//! Scheduled pass delivery tick.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::dispatch::{DispatchOutcome, MultiChannelDispatcher};
use super::report::{self, EventPasses};
use crate::error::DeliveryError;
use crate::models::{DeliveryBucket, User};
use crate::store::{DirectoryLookup, PassStore};

/// Default deadline for the outbound channels of one tick.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(180);

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSummary {
    pub bucket: String,
    pub ran_at: DateTime<Utc>,
    pub events: usize,
    pub passes_delivered: u64,
    /// Due passes left pending because their event no longer exists.
    pub passes_skipped: usize,
    pub outcome: DispatchOutcome,
}

/// Collects due passes, reports them and marks them sent.
pub struct PassDeliveryService {
    store: Arc<dyn PassStore>,
    directory: Arc<dyn DirectoryLookup>,
    dispatcher: MultiChannelDispatcher,
    timezone: Tz,
    delivery_timeout: Duration,
    tick_guard: Mutex<()>,
    last_tick: RwLock<Option<TickSummary>>,
}

impl PassDeliveryService {
    pub fn new(
        store: Arc<dyn PassStore>,
        directory: Arc<dyn DirectoryLookup>,
        dispatcher: MultiChannelDispatcher,
        timezone: Tz,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            store,
            directory,
            dispatcher,
            timezone,
            delivery_timeout,
            tick_guard: Mutex::new(()),
            last_tick: RwLock::new(None),
        }
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub async fn last_tick(&self) -> Option<TickSummary> {
        self.last_tick.read().await.clone()
    }

    /// Runs one delivery tick for `bucket`.
    ///
    /// Ticks are serialized: the guard is held from reading due passes until
    /// they are marked sent, so overlapping triggers never deliver a pass
    /// twice. A report is dispatched even when nothing is due.
    pub async fn run_tick(
        &self,
        bucket: &DeliveryBucket,
        now: DateTime<Utc>,
    ) -> Result<TickSummary, DeliveryError> {
        let _guard = self.tick_guard.lock().await;

        let due = self
            .store
            .list_due(now)
            .await
            .map_err(DeliveryError::LoadPasses)?;
        let due_count = due.len();

        let mut groups = report::group_by_event(due);
        let event_ids: BTreeSet<Uuid> = groups.keys().copied().collect();

        let mut batch = Vec::with_capacity(event_ids.len());
        let mut skipped = 0;
        for event_id in event_ids {
            let passes = groups.remove(&event_id).unwrap_or_default();
            let event = self
                .directory
                .find_event(event_id)
                .await
                .map_err(|source| DeliveryError::LoadEvent { event_id, source })?;
            match event {
                Some(event) => batch.push(EventPasses { event, passes }),
                None => {
                    tracing::warn!(
                        event_id = %event_id,
                        passes = passes.len(),
                        "Event not found, leaving its passes pending"
                    );
                    skipped += passes.len();
                }
            }
        }

        let user_ids: Vec<i64> = batch
            .iter()
            .flat_map(|g| g.passes.iter().map(|p| p.user_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let users: HashMap<i64, User> = if user_ids.is_empty() {
            HashMap::new()
        } else {
            self.directory
                .find_users(&user_ids)
                .await
                .map_err(DeliveryError::LoadUsers)?
                .into_iter()
                .map(|u| (u.id, u))
                .collect()
        };

        let pass_ids: Vec<Uuid> = batch
            .iter()
            .flat_map(|g| g.passes.iter().map(|p| p.id))
            .collect();

        let report = report::build(batch, &users, &self.timezone, now);
        tracing::info!(
            bucket = %bucket.name,
            due = due_count,
            events = report.event_count,
            passes = report.pass_count,
            "Dispatching pass report"
        );

        let outcome = self
            .dispatcher
            .dispatch(&report, &bucket.targets, self.delivery_timeout)
            .await;

        let delivered = if pass_ids.is_empty() {
            0
        } else {
            self.store
                .mark_sent(&pass_ids, Utc::now(), outcome.email_sent, outcome.telegram_sent)
                .await
                .map_err(DeliveryError::MarkSent)?
        };

        let summary = TickSummary {
            bucket: bucket.name.clone(),
            ran_at: now,
            events: report.event_count,
            passes_delivered: delivered,
            passes_skipped: skipped,
            outcome,
        };

        tracing::info!(
            bucket = %bucket.name,
            delivered = delivered,
            skipped = skipped,
            email_sent = outcome.email_sent,
            telegram_sent = outcome.telegram_sent,
            "Pass delivery tick finished"
        );

        *self.last_tick.write().await = Some(summary.clone());
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeliveryTargets, Event, NewPass, PassStatus, Requester, UserRole};
    use crate::services::dispatch::{MockDocumentSender, MockEmailSender};
    use crate::store::{InMemoryStore, SoftDeleteStore, SoftDeleteTx};
    use chrono::Duration as ChronoDuration;
    use chrono_tz::Europe::Moscow;
    use fake::faker::name::en::Name;
    use fake::Fake;

    struct Fixture {
        store: InMemoryStore,
        email: MockEmailSender,
        chat: MockDocumentSender,
        service: Arc<PassDeliveryService>,
        bucket: DeliveryBucket,
    }

    fn fixture_with(email: MockEmailSender, chat: MockDocumentSender) -> Fixture {
        let store = InMemoryStore::new();
        let shared = Arc::new(store.clone());
        let dispatcher =
            MultiChannelDispatcher::new(Arc::new(email.clone()), Arc::new(chat.clone()));
        let service = Arc::new(PassDeliveryService::new(
            shared.clone(),
            shared,
            dispatcher,
            Moscow,
            DEFAULT_DELIVERY_TIMEOUT,
        ));
        let bucket = DeliveryBucket::weekday(
            Moscow,
            DeliveryTargets {
                email_recipients: vec!["security@campus.example".to_string()],
                chat_id: Some("-1001".to_string()),
            },
        );
        Fixture {
            store,
            email,
            chat,
            service,
            bucket,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockEmailSender::new(), MockDocumentSender::new())
    }

    async fn seed_event(store: &InMemoryStore, name: &str, users: &[i64]) -> Event {
        let event = Event {
            id: Uuid::new_v4(),
            club_id: Uuid::new_v4(),
            name: name.to_string(),
            location: "Main hall".to_string(),
            start_time: Utc::now() + ChronoDuration::hours(20),
            pass_required: true,
            deleted_at: None,
        };
        store.insert_event(event.clone()).await;
        for &user_id in users {
            store
                .insert_user(User {
                    id: user_id,
                    fio: Name().fake(),
                    role: UserRole::ExternalUser,
                    email: None,
                })
                .await;
            store
                .create_pass(NewPass {
                    event_id: event.id,
                    user_id,
                    requester: Requester::User(user_id),
                    reason: "registration".to_string(),
                    scheduled_at: Utc::now() - ChronoDuration::minutes(1),
                })
                .await
                .unwrap();
        }
        event
    }

    fn csv_rows(bytes: &[u8]) -> usize {
        String::from_utf8(bytes.to_vec()).unwrap().lines().count() - 1
    }

    #[tokio::test]
    async fn test_empty_tick_sends_heartbeat() {
        let f = fixture();
        let summary = f.service.run_tick(&f.bucket, Utc::now()).await.unwrap();

        assert_eq!(summary.passes_delivered, 0);
        assert_eq!(summary.events, 0);
        let emails = f.email.sent();
        let docs = f.chat.sent();
        assert_eq!(emails.len(), 1);
        assert_eq!(docs.len(), 1);
        assert_eq!(emails[0].body_text, report::EMPTY_SUMMARY);
        let export = emails[0].attachment.as_ref().unwrap();
        assert_eq!(csv_rows(&export.bytes), 0);
        assert_eq!(csv_rows(&docs[0].document.bytes), 0);
    }

    #[tokio::test]
    async fn test_two_events_in_one_report() {
        let f = fixture();
        seed_event(&f.store, "Chess", &[1, 2]).await;
        seed_event(&f.store, "Robotics", &[3, 4, 5]).await;

        let summary = f.service.run_tick(&f.bucket, Utc::now()).await.unwrap();

        assert_eq!(summary.events, 2);
        assert_eq!(summary.passes_delivered, 5);
        let docs = f.chat.sent();
        assert_eq!(docs.len(), 1);
        assert_eq!(csv_rows(&docs[0].document.bytes), 5);
        assert!(docs[0].caption.contains("Chess"));
        assert!(docs[0].caption.contains("Robotics"));
        assert_eq!(
            f.email.sent()[0].subject,
            "Pass summary - 2 events (5 passes)"
        );

        for pass in f.store.all_passes().await {
            assert_eq!(pass.status, PassStatus::Sent);
            assert!(pass.email_sent && pass.telegram_sent);
            assert!(pass.sent_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_email_failure_is_recorded_per_pass() {
        let f = fixture_with(MockEmailSender::failing(), MockDocumentSender::new());
        seed_event(&f.store, "Chess", &[1, 2]).await;

        let summary = f.service.run_tick(&f.bucket, Utc::now()).await.unwrap();

        assert!(!summary.outcome.email_sent);
        assert!(summary.outcome.telegram_sent);
        for pass in f.store.all_passes().await {
            assert_eq!(pass.status, PassStatus::Sent);
            assert!(!pass.email_sent);
            assert!(pass.telegram_sent);
        }
    }

    #[tokio::test]
    async fn test_future_passes_are_not_due() {
        let f = fixture();
        let event = seed_event(&f.store, "Chess", &[]).await;
        f.store
            .create_pass(NewPass {
                event_id: event.id,
                user_id: 9,
                requester: Requester::Admin(1),
                reason: "speaker".to_string(),
                scheduled_at: Utc::now() + ChronoDuration::hours(2),
            })
            .await
            .unwrap();

        let summary = f.service.run_tick(&f.bucket, Utc::now()).await.unwrap();
        assert_eq!(summary.passes_delivered, 0);
        assert_eq!(f.store.all_passes().await[0].status, PassStatus::Pending);
    }

    #[tokio::test]
    async fn test_missing_event_leaves_passes_pending() {
        let f = fixture();
        seed_event(&f.store, "Chess", &[1]).await;
        // Removed without the cascade, so its pass is still pending
        let gone = seed_event(&f.store, "Cancelled talk", &[2]).await;
        let mut tx = f.store.begin().await.unwrap();
        tx.mark_event_deleted(gone.id, Utc::now()).await.unwrap();
        tx.commit().await.unwrap();

        let summary = f.service.run_tick(&f.bucket, Utc::now()).await.unwrap();

        assert_eq!(summary.passes_delivered, 1);
        assert_eq!(summary.passes_skipped, 1);
        let pending = f
            .store
            .all_passes()
            .await
            .into_iter()
            .filter(|p| p.status == PassStatus::Pending)
            .count();
        assert_eq!(pending, 1);
    }

    #[tokio::test]
    async fn test_store_failure_aborts_tick() {
        let f = fixture();
        seed_event(&f.store, "Chess", &[1]).await;
        f.store.fail_operation("list_due").await;

        let err = f.service.run_tick(&f.bucket, Utc::now()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::LoadPasses(_)));
        assert!(f.email.sent().is_empty());
        assert!(f.chat.sent().is_empty());
        assert!(f.service.last_tick().await.is_none());
    }

    #[tokio::test]
    async fn test_user_lookup_failure_aborts_tick() {
        let f = fixture();
        seed_event(&f.store, "Chess", &[1]).await;
        f.store.fail_operation("find_users").await;

        let err = f.service.run_tick(&f.bucket, Utc::now()).await.unwrap_err();
        assert!(matches!(err, DeliveryError::LoadUsers(_)));
        assert_eq!(f.store.all_passes().await[0].status, PassStatus::Pending);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_overlapping_ticks_deliver_each_pass_once() {
        let f = fixture();
        seed_event(&f.store, "Chess", &[1, 2, 3]).await;

        let weekend = DeliveryBucket::weekend(Moscow, f.bucket.targets.clone());
        let (a, b) = tokio::join!(
            f.service.run_tick(&f.bucket, Utc::now()),
            f.service.run_tick(&weekend, Utc::now())
        );

        let delivered = a.unwrap().passes_delivered + b.unwrap().passes_delivered;
        assert_eq!(delivered, 3);
        let rows: usize = f
            .chat
            .sent()
            .iter()
            .map(|d| csv_rows(&d.document.bytes))
            .sum();
        assert_eq!(rows, 3);
    }

    #[tokio::test]
    async fn test_last_tick_is_recorded() {
        let f = fixture();
        let now = Utc::now();
        f.service.run_tick(&f.bucket, now).await.unwrap();
        let last = f.service.last_tick().await.unwrap();
        assert_eq!(last.bucket, "weekday");
        assert_eq!(last.ran_at, now);
    }
}
