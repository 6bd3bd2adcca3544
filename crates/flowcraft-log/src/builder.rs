//! Builds and installs the process-global `tracing` subscriber,
//! grounded on the teacher's `LoggerBuilder`/`LoggerGuard` shape
//! (`examples/vanyastaff-nebula/crates/log/src/builder/mod.rs`), trimmed
//! to the filter/format concerns this workspace actually needs.

use tracing_subscriber::EnvFilter;

use crate::config::{Config, Format};
use crate::error::LogError;

/// Held for the lifetime of the process to keep the subscriber alive.
///
/// The teacher's guard also flushes a non-blocking file appender and a
/// Sentry client; neither exists at this crate's reduced scope, so the
/// guard carries no state, but callers should still keep it bound
/// rather than let it drop immediately.
#[derive(Debug)]
pub struct LoggerGuard {
    _private: (),
}

/// Builds a subscriber from a [`Config`] and installs it as the
/// process-global default.
#[derive(Debug, Clone)]
pub struct LoggerBuilder {
    config: Config,
}

impl LoggerBuilder {
    /// Start building from `config`.
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Install the subscriber, returning a guard to keep it alive.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::Filter`] if the configured level string is
    /// not a valid `EnvFilter` directive, or [`LogError::AlreadyInit`]
    /// if a global subscriber is already installed.
    pub fn build(self) -> Result<LoggerGuard, LogError> {
        let filter = EnvFilter::try_new(&self.config.level).map_err(|source| LogError::Filter {
            directive: self.config.level.clone(),
            source,
        })?;

        let init_result = match self.config.format {
            Format::Pretty => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(self.config.ansi)
                .pretty()
                .try_init(),
            Format::Compact => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(self.config.ansi)
                .compact()
                .try_init(),
            Format::Json => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .json()
                .try_init(),
        };
        init_result.map_err(|source| LogError::AlreadyInit(source.to_string()))?;

        Ok(LoggerGuard { _private: () })
    }
}
