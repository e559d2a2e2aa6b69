use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{NewUser, UserStore, UserStoreError};

/// Process-local user table, keyed by id.
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, NewUser>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<NewUser> {
        self.users.lock().await.get(id).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn exists(&self, id: &str, email: &str) -> Result<bool, UserStoreError> {
        let users = self.users.lock().await;
        Ok(users.contains_key(id) || users.values().any(|user| user.email == email))
    }

    async fn insert(&self, user: &NewUser) -> Result<(), UserStoreError> {
        let mut users = self.users.lock().await;
        if users.contains_key(&user.id) || users.values().any(|u| u.email == user.email) {
            return Err(UserStoreError::Conflict);
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }
}
