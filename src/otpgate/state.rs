//! Shared state for the signup handlers.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::{sync::Mutex, task::JoinHandle, time::interval};
use tracing::{error, info};

use crate::notify::Notifier;
use crate::otp::{OtpError, OtpService};
use crate::users::{NewUser, Role, UserStore};

const SIGNUP_TTL_SECONDS: i64 = 60 * 60;

/// Signup data held between `start` and a successful `verify`.
#[derive(Clone, Debug)]
pub struct Registration {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub credential: SecretString,
    /// Last time a code was sent for this signup.
    pub touched_at: DateTime<Utc>,
}

impl From<Registration> for NewUser {
    fn from(registration: Registration) -> Self {
        Self {
            id: registration.id,
            email: registration.email,
            name: registration.name,
            role: registration.role,
            credential: registration.credential,
        }
    }
}

/// Pending registrations keyed by email; one per address.
#[derive(Debug, Default)]
pub struct Registrations {
    pending: Mutex<HashMap<String, Registration>>,
}

impl Registrations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `registration`, replacing any previous one for the same email.
    pub async fn insert(&self, registration: Registration) {
        self.pending
            .lock()
            .await
            .insert(registration.email.clone(), registration);
    }

    pub async fn get(&self, email: &str) -> Option<Registration> {
        self.pending.lock().await.get(email).cloned()
    }

    pub async fn remove(&self, email: &str) -> Option<Registration> {
        self.pending.lock().await.remove(email)
    }

    /// Mark the registration for `email` as active at `now`.
    pub async fn touch(&self, email: &str, now: DateTime<Utc>) {
        if let Some(registration) = self.pending.lock().await.get_mut(email) {
            registration.touched_at = now;
        }
    }

    /// Drop registrations untouched since before `cutoff`; returns their emails.
    pub async fn sweep(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        let mut pending = self.pending.lock().await;
        let stale: Vec<String> = pending
            .values()
            .filter(|registration| registration.touched_at < cutoff)
            .map(|registration| registration.email.clone())
            .collect();
        for email in &stale {
            pending.remove(email);
        }
        stale
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }
}

pub struct SignupState {
    otp: Arc<OtpService>,
    notifier: Arc<dyn Notifier>,
    users: Arc<dyn UserStore>,
    registrations: Registrations,
    signup_ttl: Duration,
}

impl SignupState {
    pub fn new(
        otp: Arc<OtpService>,
        notifier: Arc<dyn Notifier>,
        users: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            otp,
            notifier,
            users,
            registrations: Registrations::new(),
            signup_ttl: Duration::seconds(SIGNUP_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn otp(&self) -> &OtpService {
        &self.otp
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub(crate) fn users(&self) -> &dyn UserStore {
        self.users.as_ref()
    }

    pub(crate) fn registrations(&self) -> &Registrations {
        &self.registrations
    }

    /// How long a signup may sit idle before the janitor drops it.
    #[must_use]
    pub fn signup_ttl(&self) -> Duration {
        self.signup_ttl
    }

    /// Purge expired codes, then drop idle registrations and their codes.
    ///
    /// Returns `(codes, registrations)` removed.
    ///
    /// # Errors
    /// Returns an error if the code store fails.
    pub async fn purge_stale(&self) -> Result<(usize, usize), OtpError> {
        let codes = self.otp.purge_expired().await?;

        let cutoff = self.otp.now() - self.signup_ttl;
        let stale = self.registrations.sweep(cutoff).await;
        for email in &stale {
            self.otp.discard(email).await?;
        }

        Ok((codes, stale.len()))
    }
}

/// Spawn a background task that periodically purges expired codes and
/// abandoned signups.
pub fn spawn_janitor(state: Arc<SignupState>, every: std::time::Duration) -> JoinHandle<()> {
    let every = if every.is_zero() {
        std::time::Duration::from_secs(1)
    } else {
        every
    };

    tokio::spawn(async move {
        let mut ticker = interval(every);
        loop {
            ticker.tick().await;
            match state.purge_stale().await {
                Ok((0, 0)) => {}
                Ok((codes, registrations)) => {
                    info!(codes, registrations, "purged stale signup state");
                }
                Err(err) => error!("signup purge failed: {err}"),
            }
        }
    })
}
