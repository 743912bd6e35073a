//! Read-only lookups into the club, event and user tables.

use async_trait::async_trait;
use domain::models::{Event, User};
use domain::store::DirectoryLookup;
use domain::StoreError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::{EventEntity, UserEntity};
use crate::error::store_error;
use crate::metrics::QueryTimer;

/// Repository for directory lookups.
#[derive(Clone)]
pub struct DirectoryRepository {
    pool: PgPool,
}

impl DirectoryRepository {
    /// Creates a new DirectoryRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_users(result: Result<Vec<UserEntity>, sqlx::Error>) -> Result<Vec<User>, StoreError> {
    result
        .map_err(store_error)?
        .into_iter()
        .map(User::try_from)
        .collect()
}

#[async_trait]
impl DirectoryLookup for DirectoryRepository {
    async fn find_event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        let timer = QueryTimer::new("find_event");
        let result = sqlx::query_as::<_, EventEntity>(
            r#"
            SELECT id, club_id, name, location, start_time, pass_required, deleted_at
            FROM events
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        Ok(result.map_err(store_error)?.map(Event::from))
    }

    async fn find_users(&self, ids: &[i64]) -> Result<Vec<User>, StoreError> {
        let timer = QueryTimer::new("find_users");
        let result = sqlx::query_as::<_, UserEntity>(
            r#"
            SELECT id, fio, role, email
            FROM users
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        into_users(result)
    }
}
