//! Structured logging setup.

use tracing_subscriber::{
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Include the event target (module path)
    pub with_target: bool,
    /// Write to stderr instead of stdout
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: false,
            stderr: false,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default filter directive
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Enable or disable JSON output
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    /// Enable or disable event targets
    #[must_use]
    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Write to stderr, keeping stdout for command output
    #[must_use]
    pub fn with_stderr(mut self, stderr: bool) -> Self {
        self.stderr = stderr;
        self
    }

    fn writer(&self) -> BoxMakeWriter {
        if self.stderr {
            BoxMakeWriter::new(std::io::stderr)
        } else {
            BoxMakeWriter::new(std::io::stdout)
        }
    }
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Subscriber installation failed
    #[error("Failed to initialize logging: {0}")]
    Init(String),
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(config.with_target)
                    .with_writer(config.writer()),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(config.with_target)
                    .with_writer(config.writer()),
            )
            .try_init()
    };

    result.map_err(|e| LoggingError::Init(e.to_string()))
}
