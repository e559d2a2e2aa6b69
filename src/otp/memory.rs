//! In-memory code store.
//!
//! Entries are spread over a fixed number of shards, each guarded by its own
//! mutex. An identity always maps to the same shard, so holding the shard lock
//! serializes every operation on that identity while unrelated identities on
//! other shards proceed in parallel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::{BuildHasher, RandomState};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::store::{CodeStore, Decide, StoreError, Write};
use super::{PendingCode, Verification};

const DEFAULT_SHARDS: usize = 16;

#[derive(Debug)]
pub struct MemoryCodeStore {
    shards: Vec<Mutex<HashMap<String, PendingCode>>>,
    hasher: RandomState,
}

impl MemoryCodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    #[must_use]
    pub fn with_shards(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| Mutex::new(HashMap::new())).collect(),
            hasher: RandomState::new(),
        }
    }

    fn shard(&self, identity: &str) -> &Mutex<HashMap<String, PendingCode>> {
        let hash = self.hasher.hash_one(identity);
        // Shard count fits in u64 on every supported target.
        let index = hash % self.shards.len() as u64;
        &self.shards[usize::try_from(index).unwrap_or(0)]
    }
}

impl Default for MemoryCodeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeStore for MemoryCodeStore {
    #[instrument(skip(self, entry), fields(identity = %entry.identity))]
    async fn put(&self, entry: PendingCode) -> Result<(), StoreError> {
        let mut shard = self.shard(&entry.identity).lock().await;
        shard.insert(entry.identity.clone(), entry);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, identity: &str) -> Result<Option<PendingCode>, StoreError> {
        let shard = self.shard(identity).lock().await;
        Ok(shard.get(identity).cloned())
    }

    #[instrument(skip(self))]
    async fn delete(&self, identity: &str) -> Result<bool, StoreError> {
        let mut shard = self.shard(identity).lock().await;
        Ok(shard.remove(identity).is_some())
    }

    #[instrument(skip(self, decide))]
    async fn update(
        &self,
        identity: &str,
        decide: &Decide<'_>,
    ) -> Result<Option<Verification>, StoreError> {
        let mut shard = self.shard(identity).lock().await;
        let Some(entry) = shard.get(identity) else {
            return Ok(None);
        };

        let decision = decide(entry);
        match decision.write {
            Write::Keep => {}
            Write::Replace(updated) => {
                shard.insert(identity.to_string(), updated);
            }
            Write::Remove => {
                shard.remove(identity);
            }
        }

        Ok(Some(decision.outcome))
    }

    #[instrument(skip(self))]
    async fn purge(
        &self,
        expired_before: DateTime<Utc>,
        consumed_before: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut purged = 0;
        for shard in &self.shards {
            let mut shard = shard.lock().await;
            let before = shard.len();
            shard.retain(|_, entry| {
                let cutoff = if entry.consumed {
                    consumed_before
                } else {
                    expired_before
                };
                entry.issued_at >= cutoff
            });
            purged += before - shard.len();
        }
        debug!(purged, "purged expired codes");
        Ok(purged)
    }
}
