use crate::cli::telemetry::LogFormat;
use clap::{Arg, ArgMatches, Command, builder::ValueParser};

pub const ARG_VERBOSITY: &str = "verbosity";
pub const ARG_LOG_FORMAT: &str = "log-format";

#[must_use]
pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

#[must_use]
pub fn log_format(matches: &ArgMatches) -> LogFormat {
    matches
        .get_one::<LogFormat>(ARG_LOG_FORMAT)
        .copied()
        .unwrap_or_default()
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_VERBOSITY)
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("MARQUEE_LOG_LEVEL")
                .global(true)
                .action(clap::ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .arg(
            Arg::new(ARG_LOG_FORMAT)
                .long(ARG_LOG_FORMAT)
                .help("Log output: pretty or json")
                .env("MARQUEE_LOG_FORMAT")
                .default_value("pretty")
                .global(true)
                .value_parser(|value: &str| value.parse::<LogFormat>()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ArgMatches {
        temp_env::with_vars(
            [
                ("MARQUEE_LOG_LEVEL", None::<&str>),
                ("MARQUEE_LOG_FORMAT", None),
            ],
            || with_args(Command::new("marquee")).get_matches_from(args),
        )
    }

    #[test]
    fn log_format_defaults_to_pretty() {
        assert_eq!(log_format(&parse(&["marquee"])), LogFormat::Pretty);
        assert_eq!(
            log_format(&parse(&["marquee", "--log-format", "json"])),
            LogFormat::Json
        );
    }

    #[test]
    fn verbosity_counts_flags() {
        let matches = parse(&["marquee", "-vvv"]);
        assert_eq!(matches.get_one::<u8>(ARG_VERBOSITY).copied(), Some(3));
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        let result = temp_env::with_var("MARQUEE_LOG_FORMAT", None::<&str>, || {
            with_args(Command::new("marquee"))
                .try_get_matches_from(["marquee", "--log-format", "xml"])
        });
        assert!(result.is_err());
    }
}
