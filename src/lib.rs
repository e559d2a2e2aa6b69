//! # Otpgate (signup one-time passcodes)
//!
//! `otpgate` guards account creation with a short-lived numeric code sent to
//! the address being registered. The crate is split in two layers:
//!
//! - [`otp`]: the passcode core. It issues codes, verifies submissions and
//!   tracks per-address state in a [`otp::CodeStore`].
//! - [`otpgate`]: the HTTP signup flow built on top of the core, plus the
//!   collaborators it needs ([`notify`] for delivery, [`users`] for the final
//!   account record).
//!
//! ## Passcode Policy
//!
//! - **Validity:** a code is accepted for 600 seconds after issuance.
//! - **Attempts:** the third wrong guess purges the code; the user must ask for
//!   a new one.
//! - **Resend:** issuing again for the same address replaces the previous code
//!   and resets the attempt counter.
//!
//! Verification outcomes are returned as values ([`otp::Verification`]); the
//! core never renders user-facing messages.

pub mod cli;
pub mod notify;
pub mod otp;
pub mod otpgate;
pub mod users;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
