//! Structured logging setup for Flowcraft.
//!
//! An `EnvFilter`-driven `tracing-subscriber` built from a small,
//! presettable [`Config`], grounded on the teacher's `log` crate
//! (`examples/vanyastaff-nebula/crates/log`) but trimmed to the
//! filter/format concerns this workspace needs: no file rotation,
//! Sentry, or OpenTelemetry export, since none of those crates are
//! part of this workspace's dependency stack.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod builder;
pub mod config;
pub mod error;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, Format};
pub use error::LogError;

/// Install a subscriber built from [`Config::from_env`].
///
/// # Errors
///
/// See [`LoggerBuilder::build`].
pub fn init() -> Result<LoggerGuard, LogError> {
    LoggerBuilder::from_config(Config::from_env()).build()
}

/// Re-exports of the most commonly used types.
pub mod prelude {
    pub use crate::{Config, Format, LogError, LoggerBuilder, LoggerGuard};
}
