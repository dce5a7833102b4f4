//! Maps parsed arguments to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{mail, store, token};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let store_opts = store::Options::parse(matches);
    let token_opts = token::Options::parse(matches)?;
    let mail_opts = mail::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        redis_url: store_opts.redis_url,
        frontend_base_url: store_opts.frontend_base_url,
        token_secret: token_opts.secret,
        token_ttl_seconds: token_opts.ttl_seconds,
        signup_ttl_seconds: token_opts.signup_ttl_seconds,
        smtp: mail_opts.smtp,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn matches(args: &[&str]) -> clap::ArgMatches {
        let mut argv = vec![
            "marquee",
            "--dsn",
            "postgres://user@localhost:5432/marquee",
            "--token-secret",
            "0123456789abcdef0123456789abcdef",
        ];
        argv.extend_from_slice(args);
        crate::cli::commands::new().get_matches_from(argv)
    }

    fn with_clean_env<F: FnOnce()>(f: F) {
        temp_env::with_vars(
            [
                ("MARQUEE_REDIS_URL", None::<&str>),
                ("MARQUEE_FRONTEND_BASE_URL", None),
                ("MARQUEE_SMTP_HOST", None),
                ("MARQUEE_SMTP_USERNAME", None),
                ("MARQUEE_SMTP_PASSWORD", None),
                ("MARQUEE_SMTP_FROM", None),
                ("MARQUEE_PORT", None),
                ("MARQUEE_LOG_FORMAT", None),
            ],
            f,
        );
    }

    #[test]
    fn defaults_produce_server_action() {
        with_clean_env(|| {
            let Action::Server(args) = handler(&matches(&[])).unwrap();
            assert_eq!(args.port, 8080);
            assert_eq!(args.dsn, "postgres://user@localhost:5432/marquee");
            assert_eq!(
                args.token_secret.expose_secret(),
                "0123456789abcdef0123456789abcdef"
            );
            assert_eq!(args.token_ttl_seconds, 86_400);
            assert_eq!(args.signup_ttl_seconds, 600);
            assert!(args.redis_url.is_none());
            assert!(args.frontend_base_url.is_none());
            assert!(args.smtp.is_none());
        });
    }

    #[test]
    fn smtp_options_are_collected() {
        with_clean_env(|| {
            let Action::Server(args) = handler(&matches(&[
                "--smtp-host",
                "smtp.marquee.dev",
                "--smtp-port",
                "2525",
                "--smtp-username",
                "mailer",
                "--smtp-password",
                "hunter22",
            ]))
            .unwrap();
            let smtp = args.smtp.unwrap();
            assert_eq!(smtp.host, "smtp.marquee.dev");
            assert_eq!(smtp.port, 2525);
            assert_eq!(smtp.username.as_deref(), Some("mailer"));
            assert_eq!(
                smtp.password.as_ref().map(|password| password.expose_secret()),
                Some("hunter22")
            );
            assert_eq!(smtp.from, "no-reply@marquee.local");
        });
    }

    #[test]
    fn smtp_username_without_password_is_rejected() {
        with_clean_env(|| {
            let result = handler(&matches(&[
                "--smtp-host",
                "smtp.marquee.dev",
                "--smtp-username",
                "mailer",
            ]));
            assert!(result.is_err());
        });
    }
}
