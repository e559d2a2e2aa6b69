use clap::{Arg, Command};

pub const ARG_NOTIFIER_URL: &str = "notifier-url";
pub const ARG_NOTIFIER_TOKEN: &str = "notifier-token";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_NOTIFIER_URL)
                .long("notifier-url")
                .help("Mail relay endpoint that receives signup codes")
                .long_help(
                    "Mail relay endpoint that receives signup codes as JSON. When unset, codes are written to the log instead of being sent.",
                )
                .env("OTPGATE_NOTIFIER_URL"),
        )
        .arg(
            Arg::new(ARG_NOTIFIER_TOKEN)
                .long("notifier-token")
                .help("Bearer token for the mail relay")
                .env("OTPGATE_NOTIFIER_TOKEN")
                .hide_env_values(true)
                .requires(ARG_NOTIFIER_URL),
        )
}
