//! Mapping of database errors into domain storage errors.

use domain::StoreError;

/// Converts an sqlx error into a [`StoreError`].
pub fn store_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound("Row".into()),
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("23505") => StoreError::UniqueViolation(db_err.message().to_string()),
            Some("23503") => StoreError::NotFound(format!("Referenced row ({})", db_err.message())),
            _ => StoreError::Database(db_err.to_string()),
        },
        other => StoreError::Database(other.to_string()),
    }
}
