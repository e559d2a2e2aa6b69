//! Durable user records created at the end of a successful signup.

mod memory;
mod postgres;

pub use memory::MemoryUserStore;
pub use postgres::PgUserStore;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Hr,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Employee => "employee",
            Self::Hr => "hr",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User record inserted once the signup code is verified.
#[derive(Clone, Debug)]
pub struct NewUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub credential: SecretString,
}

#[derive(Debug, thiserror::Error)]
pub enum UserStoreError {
    #[error("user with the same id or email already exists")]
    Conflict,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Whether a user already owns `id` or `email`.
    async fn exists(&self, id: &str, email: &str) -> Result<bool, UserStoreError>;

    /// Insert the user; a duplicate id or email yields [`UserStoreError::Conflict`].
    async fn insert(&self, user: &NewUser) -> Result<(), UserStoreError>;
}
