use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default location of the schema under test, relative to the working directory
pub const DEFAULT_SCHEMA_PATH: &str = "Settings.xsd";

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Harness configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Path of the schema under test
    pub schema_path: PathBuf,
    /// Surface warning-level validation events instead of dropping them
    pub report_warnings: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            schema_path: PathBuf::from(DEFAULT_SCHEMA_PATH),
            report_warnings: true,
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: defaults -> file -> environment
    pub fn load_config(config_file: Option<&Path>) -> Result<HarnessConfig> {
        Self::load_config_with(&SystemEnvProvider, config_file)
    }

    /// Load configuration using a custom environment provider
    pub fn load_config_with(
        env: &impl EnvProvider,
        config_file: Option<&Path>,
    ) -> Result<HarnessConfig> {
        let config = match config_file {
            Some(path) => Self::load_from_file(path)?,
            None => HarnessConfig::default(),
        };

        let config = Self::apply_environment_overrides_with(env, config)?;
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a TOML file; missing keys keep their defaults
    pub fn load_from_file(path: &Path) -> Result<HarnessConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: HarnessConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment variable overrides using the system environment
    pub fn apply_environment_overrides(config: HarnessConfig) -> Result<HarnessConfig> {
        Self::apply_environment_overrides_with(&SystemEnvProvider, config)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: HarnessConfig,
    ) -> Result<HarnessConfig> {
        if let Some(schema_path) = env.get("SETTINGS_SCHEMA_PATH") {
            config.schema_path = PathBuf::from(schema_path);
        }

        if let Some(report_warnings) = env.get("SETTINGS_SCHEMA_REPORT_WARNINGS") {
            config.report_warnings = report_warnings.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid SETTINGS_SCHEMA_REPORT_WARNINGS value: {}",
                    report_warnings
                ))
            })?;
        }

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate_config(config: &HarnessConfig) -> Result<()> {
        if config.schema_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "Schema path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
