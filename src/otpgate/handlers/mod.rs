//! HTTP handlers for the signup flow and shared input validation.

pub mod health;
pub mod signup;
pub mod types;

use regex::Regex;

/// Lightweight email sanity check used before issuing a code.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Password inputs are expected to be a client-side digest (64 hex chars).
pub fn valid_password(password: &str) -> bool {
    Regex::new(r"^[0-9a-fA-F]{64}$").is_ok_and(|re| re.is_match(password))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(valid_email("quinn@example.com"));
        assert!(valid_email("Quinn.Smith+hr@corp.example.org"));
        assert!(!valid_email("quinn@example"));
        assert!(!valid_email("quinn example.com"));
        assert!(!valid_email(""));
    }

    #[test]
    fn test_valid_password() {
        assert!(valid_password(&"a1".repeat(32)));
        assert!(!valid_password("short"));
        assert!(!valid_password(&"z".repeat(64)));
    }
}
