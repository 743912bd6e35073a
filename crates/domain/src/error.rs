//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

use crate::models::PassStatus;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("{0} not found")]
    NotFound(String),
}

/// Errors raised by pass lifecycle operations.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("An active pass already exists for user {user_id} on event {event_id}")]
    DuplicateActive { event_id: Uuid, user_id: i64 },

    #[error("Cannot move pass from {from} to {to}")]
    InvalidTransition { from: PassStatus, to: PassStatus },

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PassError {
    pub fn event_not_found(id: Uuid) -> Self {
        PassError::NotFound {
            entity: "Event",
            id: id.to_string(),
        }
    }

    pub fn user_not_found(id: i64) -> Self {
        PassError::NotFound {
            entity: "User",
            id: id.to_string(),
        }
    }

    pub fn pass_not_found(id: Uuid) -> Self {
        PassError::NotFound {
            entity: "Pass",
            id: id.to_string(),
        }
    }
}

/// Errors that abort a delivery tick.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Failed to load due passes: {0}")]
    LoadPasses(#[source] StoreError),

    #[error("Failed to load event {event_id}: {source}")]
    LoadEvent {
        event_id: Uuid,
        #[source]
        source: StoreError,
    },

    #[error("Failed to load users: {0}")]
    LoadUsers(#[source] StoreError),

    #[error("Failed to mark passes as sent: {0}")]
    MarkSent(#[source] StoreError),

    #[error("Failed to build report: {0}")]
    Report(String),
}

/// Failure of a single outbound channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Remote API rejected the request: {0}")]
    Rejected(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),
}

/// Errors raised by cascading soft-delete.
#[derive(Debug, Error)]
pub enum CascadeError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_error_messages() {
        let id = Uuid::nil();
        assert_eq!(
            PassError::event_not_found(id).to_string(),
            "Event 00000000-0000-0000-0000-000000000000 not found"
        );
        assert_eq!(PassError::user_not_found(7).to_string(), "User 7 not found");
        let err = PassError::InvalidTransition {
            from: PassStatus::Sent,
            to: PassStatus::Cancelled,
        };
        assert_eq!(err.to_string(), "Cannot move pass from sent to cancelled");
    }

    #[test]
    fn test_store_error_converts() {
        let err: PassError = StoreError::Database("connection reset".into()).into();
        assert!(matches!(err, PassError::Store(StoreError::Database(_))));
        assert_eq!(err.to_string(), "Database error: connection reset");
    }
}
