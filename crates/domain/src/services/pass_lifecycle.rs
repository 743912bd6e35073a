//! Pass creation, deduplication and cancellation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use shared::pagination::Page;
use shared::validation::{validate_reason, validate_user_ids};
use uuid::Uuid;

use super::scheduling::dispatch_time_utc;
use crate::error::{PassError, StoreError};
use crate::models::{Event, NewPass, Pass, PassStatistics, Requester, User, UserRole};
use crate::store::{DirectoryLookup, PassStore};

/// Reason recorded on passes created by registration.
pub const REGISTRATION_REASON: &str = "registration";

/// Note appended to passes cancelled by unregistration.
pub const UNREGISTRATION_NOTE: &str = "user unregistered";

/// Settings that shape pass creation.
#[derive(Debug, Clone)]
pub struct PassPolicy {
    /// Timezone in which dispatch times are computed.
    pub timezone: Tz,
    /// Roles that never need a pass.
    pub excluded_roles: Vec<UserRole>,
}

/// A single failed item of a batch request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    pub user_id: i64,
    pub error: String,
}

/// Result of a batch creation. Items fail independently.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub created: Vec<Pass>,
    pub errors: Vec<BatchItemError>,
}

/// Creates, deduplicates and cancels passes.
pub struct PassLifecycleService {
    store: Arc<dyn PassStore>,
    directory: Arc<dyn DirectoryLookup>,
    policy: PassPolicy,
}

impl PassLifecycleService {
    pub fn new(
        store: Arc<dyn PassStore>,
        directory: Arc<dyn DirectoryLookup>,
        policy: PassPolicy,
    ) -> Self {
        Self {
            store,
            directory,
            policy,
        }
    }

    pub fn policy(&self) -> &PassPolicy {
        &self.policy
    }

    /// Dispatch time for `event` under the configured timezone.
    pub fn scheduled_time_for(&self, event: &Event) -> DateTime<Utc> {
        dispatch_time_utc(event.start_time, &self.policy.timezone)
    }

    /// Creates a pass for a fresh registration.
    ///
    /// Returns `Ok(None)` when the event does not require a pass for this
    /// user or an active pass already exists.
    pub async fn create_on_registration(
        &self,
        event_id: Uuid,
        user_id: i64,
    ) -> Result<Option<Pass>, PassError> {
        let event = self.load_event(event_id).await?;
        let user = self.load_user(user_id).await?;

        if !event.is_pass_required_for(&user, &self.policy.excluded_roles) {
            tracing::debug!(
                event_id = %event_id,
                user_id = user_id,
                role = %user.role,
                "Pass not required for this registration"
            );
            return Ok(None);
        }

        if self.store.has_active_pass(event_id, user_id).await? {
            tracing::debug!(
                event_id = %event_id,
                user_id = user_id,
                "Active pass already exists"
            );
            return Ok(None);
        }

        let new_pass = NewPass {
            event_id,
            user_id,
            requester: Requester::User(user_id),
            reason: REGISTRATION_REASON.to_string(),
            scheduled_at: self.scheduled_time_for(&event),
        };

        match self
            .store
            .create_pass(new_pass)
            .await
            .map_err(|e| insert_error(event_id, e))?
        {
            Some(pass) => {
                tracing::info!(
                    pass_id = %pass.id,
                    event_id = %event_id,
                    user_id = user_id,
                    scheduled_at = %pass.scheduled_at,
                    "Pass created on registration"
                );
                Ok(Some(pass))
            }
            None => {
                tracing::debug!(
                    event_id = %event_id,
                    user_id = user_id,
                    "Concurrent registration already created the pass"
                );
                Ok(None)
            }
        }
    }

    /// Registration hook. Never fails; errors are logged.
    pub async fn handle_registration(&self, event_id: Uuid, user_id: i64) -> Option<Pass> {
        match self.create_on_registration(event_id, user_id).await {
            Ok(pass) => pass,
            Err(e) => {
                tracing::warn!(
                    event_id = %event_id,
                    user_id = user_id,
                    error = %e,
                    "Failed to create pass on registration"
                );
                None
            }
        }
    }

    /// Creates a manual pass on behalf of an administrator.
    pub async fn create_by_admin(
        &self,
        event_id: Uuid,
        user_id: i64,
        admin_id: i64,
        reason: &str,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<Pass, PassError> {
        self.create_requested(event_id, user_id, Requester::Admin(admin_id), reason, scheduled_at)
            .await
    }

    /// Creates an API pass on behalf of a club.
    pub async fn create_by_club(
        &self,
        event_id: Uuid,
        user_id: i64,
        club_id: Uuid,
        reason: &str,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<Pass, PassError> {
        self.create_requested(event_id, user_id, Requester::Club(club_id), reason, scheduled_at)
            .await
    }

    pub async fn create_passes_by_admin(
        &self,
        event_id: Uuid,
        user_ids: &[i64],
        admin_id: i64,
        reason: &str,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<BatchOutcome, PassError> {
        self.create_batch(event_id, user_ids, Requester::Admin(admin_id), reason, scheduled_at)
            .await
    }

    pub async fn create_passes_by_club(
        &self,
        event_id: Uuid,
        user_ids: &[i64],
        club_id: Uuid,
        reason: &str,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<BatchOutcome, PassError> {
        self.create_batch(event_id, user_ids, Requester::Club(club_id), reason, scheduled_at)
            .await
    }

    /// Creates passes for several users. Only request-level validation
    /// fails the whole call; per-user failures are collected.
    pub async fn create_batch(
        &self,
        event_id: Uuid,
        user_ids: &[i64],
        requester: Requester,
        reason: &str,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<BatchOutcome, PassError> {
        validate_user_ids(user_ids).map_err(validation_error)?;
        validate_reason(reason).map_err(validation_error)?;

        let mut outcome = BatchOutcome::default();
        for &user_id in user_ids {
            match self
                .create_requested(event_id, user_id, requester, reason, scheduled_at)
                .await
            {
                Ok(pass) => outcome.created.push(pass),
                Err(e) => outcome.errors.push(BatchItemError {
                    user_id,
                    error: e.to_string(),
                }),
            }
        }

        tracing::info!(
            event_id = %event_id,
            requester = %requester,
            created = outcome.created.len(),
            failed = outcome.errors.len(),
            "Batch pass creation finished"
        );
        Ok(outcome)
    }

    /// Cancels every pending pass for the pair. Zero cancellations is fine.
    pub async fn cancel_on_unregistration(
        &self,
        event_id: Uuid,
        user_id: i64,
    ) -> Result<u64, PassError> {
        let cancelled = self
            .store
            .cancel_for_pair(event_id, user_id, UNREGISTRATION_NOTE, Utc::now())
            .await?;
        if cancelled > 0 {
            tracing::info!(
                event_id = %event_id,
                user_id = user_id,
                cancelled = cancelled,
                "Passes cancelled on unregistration"
            );
        }
        Ok(cancelled)
    }

    /// Unregistration hook. Never fails; errors are logged.
    pub async fn handle_unregistration(&self, event_id: Uuid, user_id: i64) -> u64 {
        match self.cancel_on_unregistration(event_id, user_id).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(
                    event_id = %event_id,
                    user_id = user_id,
                    error = %e,
                    "Failed to cancel passes on unregistration"
                );
                0
            }
        }
    }

    pub async fn get_pass(&self, id: Uuid) -> Result<Pass, PassError> {
        self.store
            .get_pass(id)
            .await?
            .ok_or_else(|| PassError::pass_not_found(id))
    }

    pub async fn passes_for_event(&self, event_id: Uuid) -> Result<Vec<Pass>, PassError> {
        Ok(self.store.list_by_event(event_id).await?)
    }

    pub async fn passes_for_user(&self, user_id: i64, page: Page) -> Result<Vec<Pass>, PassError> {
        Ok(self.store.list_by_user(user_id, page).await?)
    }

    pub async fn passes_by_requester(
        &self,
        requester: Requester,
        page: Page,
    ) -> Result<Vec<Pass>, PassError> {
        Ok(self.store.list_by_requester(requester, page).await?)
    }

    pub async fn count_by_requester(&self, requester: Requester) -> Result<i64, PassError> {
        Ok(self.store.count_by_requester(requester).await?)
    }

    pub async fn active_pass(&self, event_id: Uuid, user_id: i64) -> Result<Option<Pass>, PassError> {
        Ok(self.store.get_active_pass(event_id, user_id).await?)
    }

    pub async fn event_statistics(&self, event_id: Uuid) -> Result<PassStatistics, PassError> {
        Ok(self.store.statistics_for_event(event_id).await?)
    }

    async fn create_requested(
        &self,
        event_id: Uuid,
        user_id: i64,
        requester: Requester,
        reason: &str,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<Pass, PassError> {
        if let Requester::User(_) = requester {
            return Err(PassError::Validation(
                "user passes are created through registration".to_string(),
            ));
        }
        validate_reason(reason).map_err(validation_error)?;

        let event = self.load_event(event_id).await?;
        self.load_user(user_id).await?;

        let duplicate = PassError::DuplicateActive { event_id, user_id };
        if self.store.has_active_pass(event_id, user_id).await? {
            return Err(duplicate);
        }

        let new_pass = NewPass {
            event_id,
            user_id,
            requester,
            reason: reason.to_string(),
            scheduled_at: scheduled_at.unwrap_or_else(|| self.scheduled_time_for(&event)),
        };

        let pass = self
            .store
            .create_pass(new_pass)
            .await
            .map_err(|e| insert_error(event_id, e))?
            .ok_or(duplicate)?;
        tracing::info!(
            pass_id = %pass.id,
            event_id = %event_id,
            user_id = user_id,
            requester = %requester,
            pass_type = %pass.pass_type,
            "Pass created on request"
        );
        Ok(pass)
    }

    async fn load_event(&self, event_id: Uuid) -> Result<Event, PassError> {
        self.directory
            .find_event(event_id)
            .await?
            .ok_or_else(|| PassError::event_not_found(event_id))
    }

    async fn load_user(&self, user_id: i64) -> Result<User, PassError> {
        self.directory
            .find_user(user_id)
            .await?
            .ok_or_else(|| PassError::user_not_found(user_id))
    }
}

/// The store refuses inserts for events removed after they were loaded.
fn insert_error(event_id: Uuid, err: StoreError) -> PassError {
    match err {
        StoreError::NotFound(_) => PassError::event_not_found(event_id),
        other => other.into(),
    }
}

fn validation_error(err: validator::ValidationError) -> PassError {
    PassError::Validation(
        err.message
            .map(|m| m.to_string())
            .unwrap_or_else(|| err.code.to_string()),
    )
}
