//! User model
//!
//! Help desk staff. Every user is an agent; admins can additionally manage
//! users and delete tickets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A help desk user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Login name (unique)
    pub name: String,
    /// Password hash (argon2, PHC string)
    #[serde(skip_serializing)]
    pub password: String,
    /// User type
    #[serde(rename = "type")]
    pub user_type: UserType,
}

impl User {
    /// Create a new user.
    ///
    /// The password must already be hashed, see `services::password::hash_password()`.
    pub fn new(name: String, password_hash: String, user_type: UserType) -> Self {
        Self {
            id: 0, // Will be set by the database
            name,
            password: password_hash,
            user_type,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }
}

/// User type, stored as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    Agent,
    Admin,
}

impl UserType {
    /// Integer stored in the `type` column
    pub fn as_i64(self) -> i64 {
        match self {
            UserType::Agent => 0,
            UserType::Admin => 1,
        }
    }
}

impl TryFrom<i64> for UserType {
    type Error = anyhow::Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(UserType::Agent),
            1 => Ok(UserType::Admin),
            _ => Err(anyhow::anyhow!("Invalid user type: {}", value)),
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserType::Agent => write!(f, "agent"),
            UserType::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for UserType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "agent" => Ok(UserType::Agent),
            "admin" => Ok(UserType::Admin),
            _ => Err(anyhow::anyhow!("Invalid user type: {}", s)),
        }
    }
}

/// Input for creating a new user (before password hashing)
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub name: String,
    /// Plaintext password (will be hashed)
    pub password: String,
    /// Defaults to agent
    #[serde(default, rename = "type")]
    pub user_type: Option<UserType>,
}
