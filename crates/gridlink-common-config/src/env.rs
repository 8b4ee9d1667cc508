//! Environment variable handling.

use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::loader::ConfigError;

/// Environment variable errors.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("failed to load .env file: {0}")]
    DotenvError(#[from] dotenvy::Error),
}

/// Environment variable names.
pub mod vars {
    // Grid security
    pub const X509_CERT_DIR: &str = "X509_CERT_DIR";
    pub const X509_USER_PROXY: &str = "X509_USER_PROXY";

    // Configuration
    pub const GRIDLINK_CONFIG_PATH: &str = "GRIDLINK_CONFIG_PATH";
    pub const GRIDLINK_LOG_LEVEL: &str = "GRIDLINK_LOG_LEVEL";
    pub const GRIDLINK_ENV: &str = "GRIDLINK_ENV";

    // Development
    pub const RUST_LOG: &str = "RUST_LOG";
}

/// CA directory used when `X509_CERT_DIR` is not set.
pub const DEFAULT_CA_CERT_DIR: &str = "/etc/grid-security/certificates/";

/// Environment configuration.
pub struct Environment {
    _guard: (),
}

impl Environment {
    /// Initialize environment from .env files in the current directory.
    pub fn init() -> Result<Self, EnvError> {
        Self::init_in(Path::new("."))
    }

    /// Initialize environment from .env files in `dir`.
    ///
    /// Variables already set are never overridden, so the most specific
    /// file is read first: `.env.{GRIDLINK_ENV}`, `.env.local`, `.env`.
    pub fn init_in(dir: &Path) -> Result<Self, EnvError> {
        if let Ok(env) = env::var(vars::GRIDLINK_ENV) {
            load_dotenv(&dir.join(format!(".env.{}", env)))?;
        }
        load_dotenv(&dir.join(".env.local"))?;
        load_dotenv(&dir.join(".env"))?;

        Ok(Self { _guard: () })
    }

    /// Get an optional string variable.
    pub fn get(var: &str) -> Option<String> {
        env::var(var).ok()
    }
}

fn load_dotenv(path: &Path) -> Result<(), EnvError> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Locate the CA trust directory used to authenticate the server.
///
/// Looks at `env_value` (the `X509_CERT_DIR` setting) first, then `default_dir`.
pub fn resolve_ca_cert_dir_from(
    env_value: Option<String>,
    default_dir: &Path,
) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = env_value.filter(|v| !v.is_empty()) {
        let dir = PathBuf::from(dir);
        if dir.is_dir() {
            return Ok(dir);
        }
    }

    if default_dir.is_dir() {
        return Ok(default_dir.to_path_buf());
    }

    Err(ConfigError::CaCertPathNotFound {
        var: vars::X509_CERT_DIR.to_string(),
        default: default_dir.to_path_buf(),
    })
}

/// Proxy file named by `X509_USER_PROXY`, if any.
pub fn user_proxy_path() -> Option<PathBuf> {
    Environment::get(vars::X509_USER_PROXY)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_ca_dir_prefers_environment() {
        let from_env = tempdir().unwrap();
        let fallback = tempdir().unwrap();

        let resolved = resolve_ca_cert_dir_from(
            Some(from_env.path().display().to_string()),
            fallback.path(),
        )
        .unwrap();
        assert_eq!(resolved, from_env.path());
    }

    #[test]
    fn test_ca_dir_falls_back_to_default() {
        let fallback = tempdir().unwrap();

        let resolved = resolve_ca_cert_dir_from(None, fallback.path()).unwrap();
        assert_eq!(resolved, fallback.path());

        let resolved = resolve_ca_cert_dir_from(Some(String::new()), fallback.path()).unwrap();
        assert_eq!(resolved, fallback.path());
    }

    #[test]
    fn test_ca_dir_unset_and_default_missing() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("no-such-certificates");

        let err = resolve_ca_cert_dir_from(None, &missing).unwrap_err();
        match err {
            ConfigError::CaCertPathNotFound { var, default } => {
                assert_eq!(var, vars::X509_CERT_DIR);
                assert_eq!(default, missing);
            }
            other => panic!("Expected CaCertPathNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_ca_dir_env_pointing_nowhere_uses_default() {
        let fallback = tempdir().unwrap();
        let resolved =
            resolve_ca_cert_dir_from(Some("/definitely/not/here".to_string()), fallback.path())
                .unwrap();
        assert_eq!(resolved, fallback.path());
    }

    #[test]
    fn test_environment_init() {
        let result = Environment::init();
        assert!(result.is_ok());
    }

    #[test]
    fn test_init_in_reads_dotenv_without_overriding() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join(".env"),
            "GRIDLINK_TEST_DOTENV_A=from-env\nGRIDLINK_TEST_DOTENV_B=from-env\n",
        )
        .unwrap();
        fs::write(dir.path().join(".env.local"), "GRIDLINK_TEST_DOTENV_B=from-local\n").unwrap();

        Environment::init_in(dir.path()).unwrap();
        assert_eq!(Environment::get("GRIDLINK_TEST_DOTENV_A").as_deref(), Some("from-env"));
        assert_eq!(Environment::get("GRIDLINK_TEST_DOTENV_B").as_deref(), Some("from-local"));

        env::remove_var("GRIDLINK_TEST_DOTENV_A");
        env::remove_var("GRIDLINK_TEST_DOTENV_B");
    }

    #[test]
    fn test_init_in_rejects_malformed_dotenv() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".env"), "GRIDLINK_TEST_DOTENV_BAD has no equals sign\n").unwrap();

        let err = Environment::init_in(dir.path()).err().unwrap();
        assert!(matches!(err, EnvError::DotenvError(_)));
    }
}
