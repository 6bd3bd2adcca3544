//! Logger configuration and environment/preset construction, grounded
//! on the teacher's `config::presets` module.

/// Output rendering for the log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line, human-oriented output, meant for a local terminal.
    Pretty,
    /// Single-line, human-oriented output.
    Compact,
    /// One JSON object per line, meant for a log aggregator.
    Json,
}

/// What to build a subscriber from.
#[derive(Debug, Clone)]
pub struct Config {
    /// An `EnvFilter` directive string, e.g. `"info"` or
    /// `"flowcraft_engine=debug,flowcraft_adapter=trace"`.
    pub level: String,
    /// The output rendering.
    pub format: Format,
    /// Whether to emit ANSI color codes (ignored for [`Format::Json`]).
    pub ansi: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self { level: "info".to_owned(), format: Format::Compact, ansi: true }
    }
}

impl Config {
    /// Build a configuration from `FLOWCRAFT_LOG`, falling back to
    /// `RUST_LOG`, then the default level.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(level) = std::env::var("FLOWCRAFT_LOG") {
            config.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            config.level = level;
        }
        if let Ok(format) = std::env::var("FLOWCRAFT_LOG_FORMAT") {
            config.format = match format.to_lowercase().as_str() {
                "pretty" => Format::Pretty,
                "json" => Format::Json,
                _ => Format::Compact,
            };
        }
        config
    }

    /// Verbose, colorized, human-oriented output for local development.
    #[must_use]
    pub fn development() -> Self {
        Self { level: "debug".to_owned(), format: Format::Pretty, ansi: true }
    }

    /// Quiet, uncolored JSON output for a production log aggregator.
    #[must_use]
    pub fn production() -> Self {
        Self { level: "info".to_owned(), format: Format::Json, ansi: false }
    }

    /// Deterministic, uncolored output for test harnesses.
    #[must_use]
    pub fn test() -> Self {
        Self { level: "trace".to_owned(), format: Format::Compact, ansi: false }
    }
}
