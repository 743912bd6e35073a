//! Common validation utilities.

use validator::{ValidateEmail, ValidationError};

/// Maximum length of a free-text pass reason or note.
pub const MAX_REASON_LENGTH: usize = 500;

/// Maximum number of users in one batch pass request.
pub const MAX_BATCH_USERS: usize = 500;

/// Validates that a configured recipient is a well-formed email address.
pub fn validate_email_recipient(address: &str) -> Result<(), ValidationError> {
    if address.validate_email() {
        Ok(())
    } else {
        let mut err = ValidationError::new("email_recipient");
        err.message = Some(format!("Invalid email recipient: {}", address).into());
        Err(err)
    }
}

/// Validates the length of a free-text reason.
pub fn validate_reason(reason: &str) -> Result<(), ValidationError> {
    if reason.chars().count() <= MAX_REASON_LENGTH {
        Ok(())
    } else {
        let mut err = ValidationError::new("reason_length");
        err.message = Some(format!("Reason must be at most {} characters", MAX_REASON_LENGTH).into());
        Err(err)
    }
}

/// Validates a batch of user IDs: non-empty, bounded, positive.
pub fn validate_user_ids(user_ids: &[i64]) -> Result<(), ValidationError> {
    if user_ids.is_empty() {
        let mut err = ValidationError::new("user_ids_empty");
        err.message = Some("At least one user ID is required".into());
        return Err(err);
    }
    if user_ids.len() > MAX_BATCH_USERS {
        let mut err = ValidationError::new("user_ids_too_many");
        err.message = Some(format!("At most {} user IDs per request", MAX_BATCH_USERS).into());
        return Err(err);
    }
    if user_ids.iter().any(|id| *id <= 0) {
        let mut err = ValidationError::new("user_ids_positive");
        err.message = Some("User IDs must be positive".into());
        return Err(err);
    }
    Ok(())
}

/// Validates a wall-clock trigger time.
pub fn validate_trigger_time(hour: u32, minute: u32) -> Result<(), ValidationError> {
    if hour < 24 && minute < 60 {
        Ok(())
    } else {
        let mut err = ValidationError::new("trigger_time");
        err.message = Some(format!("Invalid trigger time {:02}:{:02}", hour, minute).into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;

    #[test]
    fn test_validate_email_recipient() {
        assert!(validate_email_recipient("security@campus.example").is_ok());
        assert!(validate_email_recipient("not-an-email").is_err());
        assert!(validate_email_recipient("").is_err());
    }

    #[test]
    fn test_validate_email_recipient_fake_addresses() {
        for _ in 0..10 {
            let address: String = SafeEmail().fake();
            assert!(validate_email_recipient(&address).is_ok(), "{}", address);
        }
    }

    #[test]
    fn test_validate_email_recipient_error_message() {
        let err = validate_email_recipient("bad").unwrap_err();
        assert_eq!(err.message.unwrap(), "Invalid email recipient: bad");
    }

    #[test]
    fn test_validate_reason() {
        assert!(validate_reason("").is_ok());
        assert!(validate_reason(&"x".repeat(MAX_REASON_LENGTH)).is_ok());
        assert!(validate_reason(&"x".repeat(MAX_REASON_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_reason_counts_characters_not_bytes() {
        // Cyrillic characters take two bytes each
        assert!(validate_reason(&"я".repeat(MAX_REASON_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_user_ids() {
        assert!(validate_user_ids(&[1, 2, 3]).is_ok());
        assert!(validate_user_ids(&[]).is_err());
        assert!(validate_user_ids(&[1, 0]).is_err());
        assert!(validate_user_ids(&vec![1; MAX_BATCH_USERS + 1]).is_err());
    }

    #[test]
    fn test_validate_trigger_time() {
        assert!(validate_trigger_time(16, 0).is_ok());
        assert!(validate_trigger_time(23, 59).is_ok());
        assert!(validate_trigger_time(24, 0).is_err());
        assert!(validate_trigger_time(12, 60).is_err());
    }
}
