use tracing_subscriber::filter::ParseError;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::ServeError;

/// Filter for a configured level or directive list such as `info,livefork=debug`.
pub fn parse_filter(level: &str) -> Result<EnvFilter, ParseError> {
    EnvFilter::try_new(level)
}

/// Install the global fmt subscriber. `RUST_LOG`, when set, overrides `level`.
pub fn init(level: &str) -> Result<(), ServeError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => parse_filter(level)?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish()
        .try_init()?;
    Ok(())
}
