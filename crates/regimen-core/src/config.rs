//! Configuration loading and typed config structures for the Regimen engine.
//!
//! The configuration lives in `regimen-config.yaml` next to the binary.
//! Every field has a default, so an empty file (or no file at all) yields a
//! working engine.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Environment variable overriding [`PathsConfig::script`].
pub const SCRIPT_ENV: &str = "REGIMEN_SCRIPT";
/// Environment variable overriding [`PathsConfig::session`].
pub const SESSION_ENV: &str = "REGIMEN_SESSION";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is outside its valid range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration, mirroring `regimen-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Scheduler cadences and selector tuning.
    #[serde(default)]
    pub engine: EngineSettings,

    /// File locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file, then apply environment
    /// overrides:
    /// - `REGIMEN_SCRIPT` overrides `paths.script`
    /// - `REGIMEN_SESSION` overrides `paths.session`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.paths.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        config.engine.validate()?;
        Ok(config)
    }
}

/// Scheduler cadences and selector tuning.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineSettings {
    /// Real-time milliseconds between ticks.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Simulated seconds between assignment deadline checks.
    #[serde(default = "default_assignment_check_secs")]
    pub assignment_check_secs: i64,

    /// Simulated seconds between flag expiry sweeps.
    #[serde(default = "default_flag_check_secs")]
    pub flag_check_secs: i64,

    /// Save the session every N ticks. 0 disables autosave.
    #[serde(default = "default_autosave_every_ticks")]
    pub autosave_every_ticks: u64,

    /// Severity multiplier applied on each declined punishment.
    #[serde(default = "default_decline_factor")]
    pub decline_factor: f64,

    /// Random seed. Unset means seeded from the OS.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            assignment_check_secs: default_assignment_check_secs(),
            flag_check_secs: default_flag_check_secs(),
            autosave_every_ticks: default_autosave_every_ticks(),
            decline_factor: default_decline_factor(),
            seed: None,
        }
    }
}

impl EngineSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "engine.tick_interval_ms",
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.assignment_check_secs < 0 {
            return Err(ConfigError::Invalid {
                field: "engine.assignment_check_secs",
                reason: "must not be negative".to_owned(),
            });
        }
        if self.flag_check_secs < 0 {
            return Err(ConfigError::Invalid {
                field: "engine.flag_check_secs",
                reason: "must not be negative".to_owned(),
            });
        }
        if !self.decline_factor.is_finite() || self.decline_factor < 1.0 {
            return Err(ConfigError::Invalid {
                field: "engine.decline_factor",
                reason: format!("{} is not a finite factor >= 1", self.decline_factor),
            });
        }
        Ok(())
    }
}

/// File locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PathsConfig {
    /// Compiled script to load.
    #[serde(default = "default_script_path")]
    pub script: PathBuf,

    /// Session file to restore from and save to.
    #[serde(default = "default_session_path")]
    pub session: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            script: default_script_path(),
            session: default_session_path(),
        }
    }
}

impl PathsConfig {
    /// Apply `REGIMEN_SCRIPT` / `REGIMEN_SESSION` from the process
    /// environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup(SCRIPT_ENV).filter(|v| !v.is_empty()) {
            self.script = PathBuf::from(val);
        }
        if let Some(val) = lookup(SESSION_ENV).filter(|v| !v.is_empty()) {
            self.session = PathBuf::from(val);
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const fn default_tick_interval_ms() -> u64 {
    1_000
}

const fn default_assignment_check_secs() -> i64 {
    60
}

const fn default_flag_check_secs() -> i64 {
    30
}

const fn default_autosave_every_ticks() -> u64 {
    60
}

const fn default_decline_factor() -> f64 {
    1.2
}

fn default_script_path() -> PathBuf {
    PathBuf::from("script.yaml")
}

fn default_session_path() -> PathBuf {
    PathBuf::from("session.json")
}

fn default_log_level() -> String {
    "info".to_owned()
}
