//! Passcode generation.

use rand::Rng;
use secrecy::SecretString;

const CODE_MIN: u32 = 100_000;
const CODE_MAX: u32 = 999_999;

/// Generate a 6-digit numeric code drawn uniformly from `100000..=999999`.
#[must_use]
pub fn generate_code() -> SecretString {
    let code: u32 = rand::thread_rng().gen_range(CODE_MIN..=CODE_MAX);
    SecretString::from(format!("{code:06}"))
}
