//! Code store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{PendingCode, Verification};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid stored entry: {0}")]
    Corrupt(String),
}

/// What to do with an entry after a decision was taken on it.
#[derive(Clone, Debug)]
pub enum Write {
    Keep,
    Replace(PendingCode),
    Remove,
}

/// A verification outcome together with the write that must accompany it.
#[derive(Clone, Debug)]
pub struct Decision {
    pub outcome: Verification,
    pub write: Write,
}

/// Decision function run against the current entry while it is locked.
pub type Decide<'a> = dyn Fn(&PendingCode) -> Decision + Send + Sync + 'a;

/// Per-identity storage for pending codes.
///
/// Implementations must serialize [`CodeStore::update`] per identity: the
/// entry read, the decision and the resulting write happen as one unit.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Insert or replace the entry for `entry.identity`.
    async fn put(&self, entry: PendingCode) -> Result<(), StoreError>;

    async fn get(&self, identity: &str) -> Result<Option<PendingCode>, StoreError>;

    /// Remove the entry; returns whether one existed.
    async fn delete(&self, identity: &str) -> Result<bool, StoreError>;

    /// Atomically read the entry, run `decide` on it and apply the write.
    ///
    /// Returns `None` when no entry exists for `identity`.
    async fn update(
        &self,
        identity: &str,
        decide: &Decide<'_>,
    ) -> Result<Option<Verification>, StoreError>;

    /// Remove unconsumed entries issued before `expired_before` and consumed
    /// entries issued before `consumed_before`; returns how many.
    async fn purge(
        &self,
        expired_before: DateTime<Utc>,
        consumed_before: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
}
