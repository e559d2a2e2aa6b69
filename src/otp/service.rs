use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::clock::{Clock, SystemClock};
use super::generator::generate_code;
use super::store::{CodeStore, StoreError};
use super::verifier::decide;
use super::{OtpPolicy, PendingCode, Rejection, Verification};

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("identity must not be empty")]
    EmptyIdentity,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Issues and verifies signup passcodes against a [`CodeStore`].
pub struct OtpService {
    store: Arc<dyn CodeStore>,
    clock: Arc<dyn Clock>,
    policy: OtpPolicy,
}

impl OtpService {
    #[must_use]
    pub fn new(store: Arc<dyn CodeStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            policy: OtpPolicy::new(),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    /// Current time as seen by the service clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Draw a fresh code for `identity`, replacing any previous one.
    ///
    /// The code is returned so the caller can hand it to a notifier; the
    /// service itself never delivers it.
    ///
    /// # Errors
    /// Returns an error if `identity` is empty or the store fails.
    #[instrument(skip(self))]
    pub async fn issue(&self, identity: &str) -> Result<SecretString, OtpError> {
        if identity.is_empty() {
            return Err(OtpError::EmptyIdentity);
        }

        let code = generate_code();
        let entry = PendingCode::fresh(identity, code.clone(), self.clock.now());
        self.store.put(entry).await?;

        debug!("issued code");
        Ok(code)
    }

    /// Check `submitted` against the stored code for `identity`.
    ///
    /// # Errors
    /// Returns an error only if the store fails; every rejection is a
    /// [`Verification::Rejected`] value.
    #[instrument(skip(self, submitted))]
    pub async fn verify(&self, identity: &str, submitted: &str) -> Result<Verification, OtpError> {
        let now = self.clock.now();
        let policy = self.policy;
        let decide_fn = move |entry: &PendingCode| decide(entry, submitted, now, &policy);

        let outcome = self
            .store
            .update(identity, &decide_fn)
            .await?
            .unwrap_or(Verification::Rejected(Rejection::NotFound));

        match outcome {
            Verification::Verified => info!("code verified"),
            Verification::Rejected(Rejection::TooManyAttempts) => {
                warn!("code exhausted after too many attempts");
            }
            Verification::Rejected(reason) => debug!(%reason, "code rejected"),
        }

        Ok(outcome)
    }

    /// Whether the live entry for `identity` has been consumed.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    #[instrument(skip(self))]
    pub async fn is_verified(&self, identity: &str) -> Result<bool, OtpError> {
        Ok(self
            .store
            .get(identity)
            .await?
            .is_some_and(|entry| entry.consumed))
    }

    /// Drop any entry for `identity`. Calling it for an unknown identity is a no-op.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    #[instrument(skip(self))]
    pub async fn discard(&self, identity: &str) -> Result<(), OtpError> {
        if self.store.delete(identity).await? {
            debug!("discarded code");
        }
        Ok(())
    }

    /// Remove unconsumed entries whose validity window has elapsed and
    /// consumed entries past their retention.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn purge_expired(&self) -> Result<usize, OtpError> {
        let now = self.clock.now();
        Ok(self
            .store
            .purge(now - self.policy.validity(), now - self.policy.retention())
            .await?)
    }
}
