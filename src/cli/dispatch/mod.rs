use crate::cli::{
    actions::{server::Args, Action},
    commands::notifier::{ARG_NOTIFIER_TOKEN, ARG_NOTIFIER_URL},
};
use anyhow::Result;
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .map(|dsn| SecretString::from(dsn.clone()));
    let notifier_url = matches.get_one::<String>(ARG_NOTIFIER_URL).cloned();
    let notifier_token = matches
        .get_one::<String>(ARG_NOTIFIER_TOKEN)
        .map(|token| SecretString::from(token.clone()));
    let janitor_interval = matches
        .get_one::<u64>("janitor-interval")
        .copied()
        .unwrap_or(60);

    Ok(Action::Server(Args {
        port,
        dsn,
        notifier_url,
        notifier_token,
        janitor_interval,
    }))
}
