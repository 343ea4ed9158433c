//! Controller settings.
//!
//! Settings are read from an optional TOML, YAML or JSON file and then
//! overridden by `AIGW_*` environment variables.

use gateway_telemetry::{LoggingConfig, RhaiEvaluatorConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use validator::Validate;

use crate::error::{ConfigError, ConfigResult};

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "AIGW_";

/// Control plane settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ControllerSettings {
    /// Directory (or single file) holding declarative documents.
    pub config_dir: PathBuf,
    /// Gateway whose filter configuration is compiled; all gateways when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    /// Reload when documents change on disk.
    pub watch: bool,
    /// Quiet period before a reload after the last file event.
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,
    /// Logging.
    #[validate(nested)]
    pub log: LogSettings,
    /// Cost expression sandbox.
    #[validate(nested)]
    pub expression: ExpressionSettings,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("config"),
            gateway: None,
            watch: false,
            debounce: Duration::from_millis(500),
            log: LogSettings::default(),
            expression: ExpressionSettings::default(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    #[validate(length(min = 1, message = "log level must not be empty"))]
    pub level: String,
    /// Emit JSON lines.
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Expression sandbox settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ExpressionSettings {
    /// Compile cost expressions during validation.
    pub check_on_validate: bool,
    /// Operation budget per evaluation.
    #[validate(range(min = 1, max = 10_000_000, message = "must be between 1 and 10000000"))]
    pub max_operations: u64,
}

impl Default for ExpressionSettings {
    fn default() -> Self {
        Self {
            check_on_validate: true,
            max_operations: RhaiEvaluatorConfig::default().max_operations,
        }
    }
}

impl ControllerSettings {
    /// Read settings from a file; the format follows the extension.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&content).map_err(|e| ConfigError::parse(path, e)),
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| ConfigError::parse(path, e))
            }
            Some("json") => serde_json::from_str(&content).map_err(|e| ConfigError::parse(path, e)),
            _ => Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Load settings: file (if any), then process environment, then validate.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate_settings()?;
        Ok(settings)
    }

    /// Apply `AIGW_*` overrides from a variable lookup.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(dir) = var("CONFIG_DIR") {
            self.config_dir = PathBuf::from(dir);
        }
        if let Some(gateway) = var("GATEWAY") {
            self.gateway = Some(gateway).filter(|g| !g.is_empty());
        }
        if let Some(watch) = var("WATCH") {
            self.watch = parse_bool("WATCH", &watch)?;
        }
        if let Some(debounce) = var("DEBOUNCE") {
            self.debounce = humantime_serde::re::humantime::parse_duration(&debounce)
                .map_err(|e| ConfigError::Settings(format!("{ENV_PREFIX}DEBOUNCE: {e}")))?;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(json) = var("LOG_JSON") {
            self.log.json = parse_bool("LOG_JSON", &json)?;
        }
        if let Some(ops) = var("EXPRESSION_MAX_OPERATIONS") {
            self.expression.max_operations = ops.parse().map_err(|e| {
                ConfigError::Settings(format!("{ENV_PREFIX}EXPRESSION_MAX_OPERATIONS: {e}"))
            })?;
        }
        Ok(())
    }

    /// Check field constraints.
    pub fn validate_settings(&self) -> ConfigResult<()> {
        self.validate()
            .map_err(|e| ConfigError::Settings(e.to_string().replace('\n', "; ")))
    }

    /// Logging configuration for the telemetry crate.
    #[must_use]
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::new()
            .with_level(&self.log.level)
            .with_json(self.log.json)
    }

    /// Sandbox configuration for the cost expression evaluator.
    #[must_use]
    pub fn evaluator_config(&self) -> RhaiEvaluatorConfig {
        RhaiEvaluatorConfig::default().with_max_operations(self.expression.max_operations)
    }
}

fn parse_bool(name: &str, value: &str) -> ConfigResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Settings(format!(
            "{ENV_PREFIX}{name}: expected a boolean, got {other:?}"
        ))),
    }
}
