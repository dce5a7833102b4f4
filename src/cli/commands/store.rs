use clap::{Arg, ArgMatches, Command};

pub const ARG_REDIS_URL: &str = "redis-url";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

pub struct Options {
    pub redis_url: Option<String>,
    pub frontend_base_url: Option<String>,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            redis_url: matches.get_one::<String>(ARG_REDIS_URL).cloned(),
            frontend_base_url: matches.get_one::<String>(ARG_FRONTEND_BASE_URL).cloned(),
        }
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REDIS_URL)
                .long(ARG_REDIS_URL)
                .help("Redis URL for pending signups; an in-process store is used when unset")
                .env("MARQUEE_REDIS_URL"),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL allowed as CORS origin")
                .env("MARQUEE_FRONTEND_BASE_URL"),
        )
}
