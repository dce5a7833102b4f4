use crate::mail::SmtpConfig;
use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USERNAME: &str = "smtp-username";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";
pub const ARG_SMTP_FROM: &str = "smtp-from";

pub struct Options {
    /// `None` when no relay host is configured.
    pub smtp: Option<SmtpConfig>,
}

impl Options {
    /// # Errors
    /// Returns an error if only one half of the SMTP credentials is set.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let Some(host) = matches.get_one::<String>(ARG_SMTP_HOST).cloned() else {
            return Ok(Self { smtp: None });
        };

        let username = matches.get_one::<String>(ARG_SMTP_USERNAME).cloned();
        let password = matches
            .get_one::<String>(ARG_SMTP_PASSWORD)
            .cloned()
            .map(SecretString::from);
        if username.is_some() != password.is_some() {
            anyhow::bail!("--smtp-username and --smtp-password must be set together");
        }

        Ok(Self {
            smtp: Some(SmtpConfig {
                host,
                port: matches.get_one::<u16>(ARG_SMTP_PORT).copied().unwrap_or(587),
                username,
                password,
                from: matches
                    .get_one::<String>(ARG_SMTP_FROM)
                    .cloned()
                    .unwrap_or_else(|| "no-reply@marquee.local".to_string()),
            }),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host; codes are only logged when unset")
                .env("MARQUEE_SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP relay port")
                .env("MARQUEE_SMTP_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SMTP_USERNAME)
                .long(ARG_SMTP_USERNAME)
                .help("SMTP username")
                .env("MARQUEE_SMTP_USERNAME"),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP password")
                .env("MARQUEE_SMTP_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SMTP_FROM)
                .long(ARG_SMTP_FROM)
                .help("Sender address for verification mail")
                .env("MARQUEE_SMTP_FROM")
                .default_value("no-reply@marquee.local"),
        )
}
