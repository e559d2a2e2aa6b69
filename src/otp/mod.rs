//! One-time passcode core.
//!
//! Each identity (the email address being registered) owns at most one
//! [`PendingCode`]. [`OtpService`] is the entry point used by the signup flow:
//!
//! - `issue` draws a fresh code and replaces whatever was stored before.
//! - `verify` checks a submission, counting failures and enforcing expiry.
//! - `is_verified` reports whether the live entry was consumed.
//! - `discard` drops the entry once the caller is done with it.
//!
//! Storage is pluggable through [`CodeStore`]. The read-modify-write inside
//! `verify` always runs under the store's per-identity serialization
//! ([`CodeStore::update`]), so concurrent wrong guesses can never lose an
//! increment.

mod clock;
mod generator;
mod memory;
mod postgres;
mod service;
mod store;
mod verifier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use generator::generate_code;
pub use memory::MemoryCodeStore;
pub use postgres::PgCodeStore;
pub use service::{OtpError, OtpService};
pub use store::{CodeStore, Decide, Decision, StoreError, Write};

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;

const DEFAULT_VALIDITY_SECONDS: i64 = 10 * 60;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_RETENTION_SECONDS: i64 = 60 * 60;

/// Fixed passcode policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OtpPolicy {
    validity: Duration,
    max_attempts: u32,
    retention: Duration,
}

impl OtpPolicy {
    /// Default policy: codes live for 600 seconds, the third wrong guess
    /// exhausts them and a verified code is kept for an hour at most.
    #[must_use]
    pub fn new() -> Self {
        Self {
            validity: Duration::seconds(DEFAULT_VALIDITY_SECONDS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retention: Duration::seconds(DEFAULT_RETENTION_SECONDS),
        }
    }

    #[must_use]
    pub fn validity(&self) -> Duration {
        self.validity
    }

    #[must_use]
    pub fn validity_seconds(&self) -> u64 {
        u64::try_from(self.validity.num_seconds()).unwrap_or(0)
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// How long a consumed entry outlives its issuance before it is dropped.
    #[must_use]
    pub fn retention(&self) -> Duration {
        self.retention
    }
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// The stored state for one identity.
#[derive(Clone, Debug)]
pub struct PendingCode {
    pub identity: String,
    pub code: SecretString,
    pub issued_at: DateTime<Utc>,
    pub consumed: bool,
    pub attempt_count: u32,
}

impl PendingCode {
    /// A fresh, unconsumed entry with no failed attempts.
    #[must_use]
    pub fn fresh(identity: &str, code: SecretString, issued_at: DateTime<Utc>) -> Self {
        Self {
            identity: identity.to_string(),
            code,
            issued_at,
            consumed: false,
            attempt_count: 0,
        }
    }

    /// True once more than `validity` has elapsed since issuance.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, validity: Duration) -> bool {
        now.signed_duration_since(self.issued_at) > validity
    }
}

/// Outcome of a verification attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Rejected(Rejection),
}

impl Verification {
    #[must_use]
    pub const fn is_verified(self) -> bool {
        matches!(self, Self::Verified)
    }
}

/// Why a submitted code was not accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// Nothing issued for this identity, or already discarded.
    #[error("no active code")]
    NotFound,
    /// The validity window (or the retention of a verified entry) elapsed;
    /// the entry was purged.
    #[error("code expired")]
    Expired,
    /// Wrong code, `remaining` guesses left before the entry is purged.
    #[error("code mismatch, {remaining} attempts remaining")]
    Mismatch { remaining: u32 },
    /// The attempt ceiling was reached; the entry was purged.
    #[error("too many failed attempts")]
    TooManyAttempts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults() {
        let policy = OtpPolicy::default();
        assert_eq!(policy.validity(), Duration::seconds(600));
        assert_eq!(policy.validity_seconds(), 600);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.retention(), Duration::seconds(3600));
    }

    #[test]
    fn pending_code_expiry_is_strictly_after_window() {
        let issued_at = Utc::now();
        let entry = PendingCode::fresh(
            "alice@example.com",
            SecretString::from("123456".to_string()),
            issued_at,
        );
        let validity = Duration::seconds(600);
        assert!(!entry.is_expired(issued_at, validity));
        assert!(!entry.is_expired(issued_at + validity, validity));
        assert!(entry.is_expired(issued_at + validity + Duration::seconds(1), validity));
    }

    #[test]
    fn rejection_messages() {
        assert_eq!(
            Rejection::Mismatch { remaining: 2 }.to_string(),
            "code mismatch, 2 attempts remaining"
        );
        assert_eq!(Rejection::NotFound.to_string(), "no active code");
        assert!(!Verification::Rejected(Rejection::Expired).is_verified());
        assert!(Verification::Verified.is_verified());
    }
}
