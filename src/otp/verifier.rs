//! Verification state machine.
//!
//! `NONE -> ISSUED -> {VERIFIED, EXPIRED, EXHAUSTED}`. `ISSUED` loops on a
//! mismatch until the attempt ceiling or the validity window is hit. The
//! absent case (`NONE`) is answered by the store before this runs.

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;

use super::store::{Decision, Write};
use super::{OtpPolicy, PendingCode, Rejection, Verification};

/// Decide the outcome of submitting `submitted` against `entry` at `now`.
pub(super) fn decide(
    entry: &PendingCode,
    submitted: &str,
    now: DateTime<Utc>,
    policy: &OtpPolicy,
) -> Decision {
    let matches = codes_match(entry.code.expose_secret(), submitted);

    // Consumed entries stay put until discarded or past retention.
    if entry.consumed {
        if entry.is_expired(now, policy.retention()) {
            return Decision {
                outcome: Verification::Rejected(Rejection::Expired),
                write: Write::Remove,
            };
        }

        let outcome = if matches {
            Verification::Verified
        } else {
            Verification::Rejected(Rejection::Mismatch {
                remaining: policy.max_attempts().saturating_sub(entry.attempt_count),
            })
        };
        return Decision {
            outcome,
            write: Write::Keep,
        };
    }

    if entry.is_expired(now, policy.validity()) {
        return Decision {
            outcome: Verification::Rejected(Rejection::Expired),
            write: Write::Remove,
        };
    }

    if !matches {
        let attempts = entry.attempt_count.saturating_add(1);
        if attempts >= policy.max_attempts() {
            return Decision {
                outcome: Verification::Rejected(Rejection::TooManyAttempts),
                write: Write::Remove,
            };
        }

        let mut updated = entry.clone();
        updated.attempt_count = attempts;
        return Decision {
            outcome: Verification::Rejected(Rejection::Mismatch {
                remaining: policy.max_attempts() - attempts,
            }),
            write: Write::Replace(updated),
        };
    }

    let mut updated = entry.clone();
    updated.consumed = true;
    Decision {
        outcome: Verification::Verified,
        write: Write::Replace(updated),
    }
}

fn codes_match(stored: &str, submitted: &str) -> bool {
    stored.as_bytes().ct_eq(submitted.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use secrecy::SecretString;

    fn entry(issued_at: DateTime<Utc>) -> PendingCode {
        PendingCode::fresh(
            "carol@example.com",
            SecretString::from("482913".to_string()),
            issued_at,
        )
    }

    #[test]
    fn correct_code_consumes_entry() {
        let now = Utc::now();
        let decision = decide(&entry(now), "482913", now, &OtpPolicy::new());
        assert_eq!(decision.outcome, Verification::Verified);
        match decision.write {
            Write::Replace(updated) => {
                assert!(updated.consumed);
                assert_eq!(updated.attempt_count, 0);
            }
            other => panic!("unexpected write: {other:?}"),
        }
    }

    #[test]
    fn wrong_code_counts_attempt() {
        let now = Utc::now();
        let decision = decide(&entry(now), "000000", now, &OtpPolicy::new());
        assert_eq!(
            decision.outcome,
            Verification::Rejected(Rejection::Mismatch { remaining: 2 })
        );
        match decision.write {
            Write::Replace(updated) => {
                assert!(!updated.consumed);
                assert_eq!(updated.attempt_count, 1);
            }
            other => panic!("unexpected write: {other:?}"),
        }
    }

    #[test]
    fn third_wrong_code_exhausts() {
        let now = Utc::now();
        let mut current = entry(now);
        current.attempt_count = 2;
        let decision = decide(&current, "000000", now, &OtpPolicy::new());
        assert_eq!(
            decision.outcome,
            Verification::Rejected(Rejection::TooManyAttempts)
        );
        assert!(matches!(decision.write, Write::Remove));
    }

    #[test]
    fn expired_entry_is_removed_even_with_correct_code() {
        let issued_at = Utc::now();
        let now = issued_at + Duration::seconds(601);
        let decision = decide(&entry(issued_at), "482913", now, &OtpPolicy::new());
        assert_eq!(decision.outcome, Verification::Rejected(Rejection::Expired));
        assert!(matches!(decision.write, Write::Remove));
    }

    #[test]
    fn boundary_of_window_is_still_valid() {
        let issued_at = Utc::now();
        let now = issued_at + Duration::seconds(600);
        let decision = decide(&entry(issued_at), "482913", now, &OtpPolicy::new());
        assert_eq!(decision.outcome, Verification::Verified);
    }

    #[test]
    fn leading_zeros_are_not_normalized() {
        let now = Utc::now();
        let current = PendingCode::fresh(
            "dave@example.com",
            SecretString::from("100200".to_string()),
            now,
        );
        let decision = decide(&current, "0100200", now, &OtpPolicy::new());
        assert!(!decision.outcome.is_verified());
    }

    #[test]
    fn consumed_entry_is_never_mutated() {
        let issued_at = Utc::now();
        let mut current = entry(issued_at);
        current.consumed = true;
        current.attempt_count = 1;
        let later = issued_at + Duration::seconds(1800);

        let decision = decide(&current, "482913", later, &OtpPolicy::new());
        assert_eq!(decision.outcome, Verification::Verified);
        assert!(matches!(decision.write, Write::Keep));

        let decision = decide(&current, "999999", later, &OtpPolicy::new());
        assert_eq!(
            decision.outcome,
            Verification::Rejected(Rejection::Mismatch { remaining: 2 })
        );
        assert!(matches!(decision.write, Write::Keep));
    }

    #[test]
    fn consumed_entry_past_retention_is_removed() {
        let issued_at = Utc::now();
        let mut current = entry(issued_at);
        current.consumed = true;
        let policy = OtpPolicy::new();

        let at_limit = issued_at + policy.retention();
        let decision = decide(&current, "482913", at_limit, &policy);
        assert_eq!(decision.outcome, Verification::Verified);

        let past = at_limit + Duration::seconds(1);
        let decision = decide(&current, "482913", past, &policy);
        assert_eq!(decision.outcome, Verification::Rejected(Rejection::Expired));
        assert!(matches!(decision.write, Write::Remove));
    }
}
