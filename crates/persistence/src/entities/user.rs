//! User entity (database row mapping).

use domain::models::{User, UserRole};
use domain::StoreError;
use sqlx::FromRow;

/// Database row mapping for the users table.
#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub id: i64,
    pub fio: String,
    pub role: String,
    pub email: Option<String>,
}

impl TryFrom<UserEntity> for User {
    type Error = StoreError;

    fn try_from(entity: UserEntity) -> Result<Self, Self::Error> {
        Ok(User {
            id: entity.id,
            fio: entity.fio,
            role: entity.role.parse::<UserRole>().map_err(StoreError::Database)?,
            email: entity.email,
        })
    }
}
