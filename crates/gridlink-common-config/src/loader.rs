//! Configuration file loading and parsing.

use crate::env::{vars, EnvError, Environment};
use crate::types::GridlinkConfig;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    ValidationError { message: String },

    #[error("environment variable not found: {var}")]
    EnvVarNotFound { var: String },

    #[error(
        "the {var} variable is not set and the {} directory cannot be found; cannot find the CA certificate path to authenticate the server",
        default.display()
    )]
    CaCertPathNotFound { var: String, default: PathBuf },

    #[error(transparent)]
    Env(#[from] EnvError),
}

/// Configuration loader.
pub struct ConfigLoader {
    base_path: PathBuf,
}

impl ConfigLoader {
    /// Create a loader for the given project directory.
    pub fn new(project_dir: impl AsRef<Path>) -> Self {
        Self {
            base_path: project_dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the project config file.
    pub fn config_path(&self) -> PathBuf {
        self.base_path.join(".gridlink/config.yaml")
    }

    /// Load configuration from `.gridlink/config.yaml`, or defaults when absent.
    pub fn load(&self) -> Result<GridlinkConfig, ConfigError> {
        let config_path = self.config_path();

        if !config_path.exists() {
            return Ok(GridlinkConfig::default());
        }

        self.load_file(&config_path)
    }

    /// Load the file named by `GRIDLINK_CONFIG_PATH`, falling back to [`Self::load`].
    ///
    /// `.env` files in the project directory are read first, so they can set
    /// both `GRIDLINK_CONFIG_PATH` and the variables the file expands.
    pub fn load_from_env(&self) -> Result<GridlinkConfig, ConfigError> {
        Environment::init_in(&self.base_path)?;

        match Environment::get(vars::GRIDLINK_CONFIG_PATH) {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.exists() {
                    return Err(ConfigError::NotFound { path });
                }
                self.load_file(&path)
            }
            None => self.load(),
        }
    }

    /// Load and validate an explicit config file.
    pub fn load_file(&self, path: &Path) -> Result<GridlinkConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let expanded = self.expand_env_vars(&contents)?;

        let config: GridlinkConfig =
            serde_yaml::from_str(&expanded).map_err(|e| ConfigError::ParseError {
                line: e.location().map(|l| l.line()),
                message: e.to_string(),
            })?;

        self.validate(&config)?;
        Ok(config)
    }

    /// Expand environment variables in the form `${VAR}` or `${VAR:-default}`.
    fn expand_env_vars(&self, content: &str) -> Result<String, ConfigError> {
        let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").map_err(|e| {
            ConfigError::ParseError {
                line: None,
                message: e.to_string(),
            }
        })?;
        let mut result = content.to_string();

        for cap in re.captures_iter(content) {
            let full_match = &cap[0];
            let var_name = &cap[1];
            let default = cap.get(2).map(|m| m.as_str());

            let value = match std::env::var(var_name) {
                Ok(v) => v,
                Err(_) => match default {
                    Some(d) => d.to_string(),
                    None => {
                        return Err(ConfigError::EnvVarNotFound {
                            var: var_name.to_string(),
                        })
                    }
                },
            };

            result = result.replace(full_match, &value);
        }

        Ok(result)
    }

    /// Validate configuration values.
    pub fn validate(&self, config: &GridlinkConfig) -> Result<(), ConfigError> {
        if config.server.host.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "server.host must not be empty".to_string(),
            });
        }

        if config.server.instance.contains('/') || config.server.instance.is_empty() {
            return Err(ConfigError::ValidationError {
                message: "server.instance must be a single non-empty path segment".to_string(),
            });
        }

        let backoff = &config.transport.backoff;
        if backoff.jitter_secs > 0 && backoff.jitter_secs >= backoff.step_secs {
            return Err(ConfigError::ValidationError {
                message: "transport.backoff.jitter_secs must be smaller than step_secs".to_string(),
            });
        }

        if config.transport.connect_timeout_secs == 0 || config.transport.request_timeout_secs == 0
        {
            return Err(ConfigError::ValidationError {
                message: "transport timeouts must be greater than 0".to_string(),
            });
        }

        if parse_validity(&config.credential.proxy_validity).is_none() {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "credential.proxy_validity must be HH:MM, got {:?}",
                    config.credential.proxy_validity
                ),
            });
        }

        Ok(())
    }

    /// Save configuration to file.
    pub fn save(&self, config: &GridlinkConfig) -> Result<(), ConfigError> {
        let config_dir = self.base_path.join(".gridlink");
        std::fs::create_dir_all(&config_dir)?;

        let yaml = serde_yaml::to_string(config).map_err(|e| ConfigError::ParseError {
            line: None,
            message: e.to_string(),
        })?;

        std::fs::write(self.config_path(), yaml)?;
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new(std::env::current_dir().unwrap_or_default())
    }
}

/// Parse an `HH:MM` validity window into seconds.
///
/// Returns `None` for malformed values and for hour counts too large to
/// express in seconds.
pub fn parse_validity(value: &str) -> Option<u64> {
    let (hours, minutes) = value.split_once(':')?;
    let hours: u64 = hours.trim().parse().ok()?;
    let minutes: u64 = minutes.trim().parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    hours.checked_mul(3600)?.checked_add(minutes * 60)
}
