use crate::{
    notify::{HttpNotifier, LogNotifier, Notifier},
    otp::{CodeStore, MemoryCodeStore, OtpService, PgCodeStore},
    otpgate::{self, spawn_janitor, SignupState},
    users::{MemoryUserStore, PgUserStore, UserStore},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<SecretString>,
    pub notifier_url: Option<String>,
    pub notifier_token: Option<SecretString>,
    pub janitor_interval: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the notifier is misconfigured, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let pool = match &args.dsn {
        Some(dsn) => Some(
            PgPoolOptions::new()
                .min_connections(1)
                .max_connections(5)
                .max_lifetime(Duration::from_secs(60 * 2))
                .test_before_acquire(true)
                .connect(dsn.expose_secret())
                .await
                .context("Failed to connect to database")?,
        ),
        None => {
            warn!("No database configured, signup state is kept in memory");
            None
        }
    };

    let (codes, users) = stores(pool.as_ref());

    let otp = Arc::new(OtpService::new(codes));
    let validity_minutes = otp.policy().validity_seconds() / 60;

    let notifier: Arc<dyn Notifier> = match args.notifier_url {
        Some(url) => Arc::new(
            HttpNotifier::new(&url, args.notifier_token, validity_minutes)
                .context("Invalid notifier configuration")?,
        ),
        None => {
            warn!("No notifier configured, signup codes are written to the log");
            Arc::new(LogNotifier::new(validity_minutes))
        }
    };

    let state = Arc::new(SignupState::new(otp, notifier, users));
    let janitor = spawn_janitor(state.clone(), Duration::from_secs(args.janitor_interval));

    let result = otpgate::new(args.port, state, pool).await;

    janitor.abort();
    result
}

fn stores(pool: Option<&PgPool>) -> (Arc<dyn CodeStore>, Arc<dyn UserStore>) {
    match pool {
        Some(pool) => (
            Arc::new(PgCodeStore::new(pool.clone())),
            Arc::new(PgUserStore::new(pool.clone())),
        ),
        None => (
            Arc::new(MemoryCodeStore::new()),
            Arc::new(MemoryUserStore::new()),
        ),
    }
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        (
            "dsn",
            args.dsn
                .as_ref()
                .map_or_else(|| "memory".to_string(), |dsn| redact_dsn(dsn.expose_secret())),
        ),
        (
            "notifier",
            args.notifier_url
                .clone()
                .unwrap_or_else(|| "log".to_string()),
        ),
        (
            "notifier_token_set",
            args.notifier_token.is_some().to_string(),
        ),
        ("janitor_interval", format!("{}s", args.janitor_interval)),
    ];
    log_entries("Startup configuration", &entries);
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "otpgate {} - {}\n\n{title}:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}
