//! Errors raised while building a logger.

use thiserror::Error;

/// Failure to construct or install a subscriber.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LogError {
    /// The configured `EnvFilter` directive string did not parse.
    #[error("invalid log filter {directive:?}: {source}")]
    Filter {
        /// The offending directive string.
        directive: String,
        /// The underlying parse error.
        source: tracing_subscriber::filter::ParseError,
    },
    /// A global subscriber was already installed.
    #[error("a global subscriber is already set: {0}")]
    AlreadyInit(String),
}
