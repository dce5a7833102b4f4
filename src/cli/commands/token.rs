use crate::registration::{MAX_SIGNUP_TTL_SECONDS, token::MAX_TTL_SECONDS};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_TOKEN_SECRET: &str = "token-secret";
pub const ARG_TOKEN_TTL: &str = "token-ttl";
pub const ARG_SIGNUP_TTL: &str = "signup-ttl";

pub struct Options {
    pub secret: SecretString,
    pub ttl_seconds: i64,
    pub signup_ttl_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if the signing secret is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let secret = matches
            .get_one::<String>(ARG_TOKEN_SECRET)
            .cloned()
            .context("missing required argument: --token-secret")?;
        Ok(Self {
            secret: SecretString::from(secret),
            ttl_seconds: matches
                .get_one::<i64>(ARG_TOKEN_TTL)
                .copied()
                .unwrap_or(86_400),
            signup_ttl_seconds: matches
                .get_one::<u64>(ARG_SIGNUP_TTL)
                .copied()
                .unwrap_or(crate::registration::DEFAULT_SIGNUP_TTL_SECONDS),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOKEN_SECRET)
                .long(ARG_TOKEN_SECRET)
                .help("HS256 signing key for access tokens, at least 32 bytes")
                .env("MARQUEE_TOKEN_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL)
                .long(ARG_TOKEN_TTL)
                .help("Access token lifetime in seconds")
                .env("MARQUEE_TOKEN_TTL")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_TTL_SECONDS)),
        )
        .arg(
            Arg::new(ARG_SIGNUP_TTL)
                .long(ARG_SIGNUP_TTL)
                .help("Pending signup lifetime in seconds")
                .env("MARQUEE_SIGNUP_TTL")
                .default_value("600")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_SIGNUP_TTL_SECONDS)),
        )
}
