//! CLI error type and argument parsers shared by the commands.

use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use octo_client::{ClientError, ErrorKind};
use url::Url;

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<ClientError> for CliError {
    fn from(err: ClientError) -> Self {
        match err.kind() {
            ErrorKind::Usage => Self::Validation(err.to_string()),
            _ => Self::failure(err),
        }
    }
}

/// Parse the server URL provided to the CLI.
pub(crate) fn parse_url(input: &str) -> Result<Url, String> {
    input
        .parse::<Url>()
        .map_err(|err| format!("invalid URL '{input}': {err}"))
}

/// Parse a timespan given as `[d.]hh:mm[:ss[.fff]]` or as a whole number of seconds.
pub(crate) fn parse_timespan(input: &str) -> Result<Duration, String> {
    let trimmed = input.trim();
    let invalid = || format!("invalid timespan '{input}': expected hh:mm:ss or seconds");

    if !trimmed.contains(':') {
        return trimmed
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| invalid());
    }

    let (days, clock) = match trimmed.split_once('.') {
        Some((days, clock)) if clock.contains(':') => {
            (days.parse::<u64>().map_err(|_| invalid())?, clock)
        }
        _ => (0, trimmed),
    };

    let parts: Vec<&str> = clock.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [hours, minutes] => (*hours, *minutes, "0"),
        [hours, minutes, seconds] => (*hours, *minutes, *seconds),
        _ => return Err(invalid()),
    };

    let hours = hours.parse::<u64>().map_err(|_| invalid())?;
    let minutes = minutes.parse::<u64>().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    let seconds = seconds.parse::<f64>().map_err(|_| invalid())?;
    if !(0.0..60.0).contains(&seconds) {
        return Err(invalid());
    }

    let whole = days
        .checked_mul(86_400)
        .and_then(|secs| secs.checked_add(hours * 3_600 + minutes * 60))
        .ok_or_else(invalid)?;
    Duration::from_secs(whole)
        .checked_add(Duration::from_secs_f64(seconds))
        .ok_or_else(invalid)
}
