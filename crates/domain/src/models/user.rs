//! Chat user domain model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a chat user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Student,
    GrantUser,
    ExternalUser,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::GrantUser => "grant_user",
            UserRole::ExternalUser => "external_user",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" => Ok(UserRole::Student),
            "grant_user" => Ok(UserRole::GrantUser),
            "external_user" => Ok(UserRole::ExternalUser),
            _ => Err(format!("Invalid user role: {}", s)),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A chat user, identified by their chat ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    /// Full name as printed on the pass list.
    pub fio: String,
    pub role: UserRole,
    pub email: Option<String>,
}
