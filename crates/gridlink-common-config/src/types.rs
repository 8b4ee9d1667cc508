//! Configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GridlinkConfig {
    /// Remote REST service.
    pub server: ServerConfig,
    /// Transport and retry settings.
    pub transport: TransportSettings,
    /// Proxy credential settings.
    pub credential: CredentialConfig,
}

/// Remote service location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host name, optionally with `:port`.
    pub host: String,
    /// First path segment of every API path.
    pub service: String,
    /// Deployment instance (`prod`, `preprod`, `dev`, ...).
    pub instance: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            service: "crabserver".to_string(),
            instance: "prod".to_string(),
        }
    }
}

/// Transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    /// Client certificate (PEM). Falls back to `X509_USER_PROXY`.
    pub client_cert: Option<PathBuf>,
    /// Client private key (PEM). Falls back to the certificate path.
    pub client_key: Option<PathBuf>,
    /// CA trust directory. Falls back to `X509_CERT_DIR`, then the grid default.
    pub ca_cert_dir: Option<PathBuf>,
    /// Name part of the `User-Agent` header.
    pub user_agent: String,
    /// Version part of the `User-Agent` header.
    pub version: String,
    /// Retry budget for overload statuses.
    pub max_retries: u32,
    /// TCP/TLS connect timeout (seconds).
    pub connect_timeout_secs: u64,
    /// Whole-request timeout (seconds).
    pub request_timeout_secs: u64,
    /// Backoff between attempts.
    pub backoff: BackoffConfig,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            client_cert: None,
            client_key: None,
            ca_cert_dir: None,
            user_agent: "gridlink".to_string(),
            version: "0.0.0".to_string(),
            max_retries: 0,
            connect_timeout_secs: 30,
            request_timeout_secs: 300,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Backoff between attempts: `step * (attempt + 1) ± jitter`, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Base delay added per attempt.
    pub step_secs: u64,
    /// Maximum symmetric random offset.
    pub jitter_secs: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            step_secs: 20,
            jitter_secs: 10,
        }
    }
}

/// Proxy and delegation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialConfig {
    /// Virtual organisation.
    pub vo: String,
    /// VOMS group, e.g. `itcms` or `/cms/itcms`; a leading VO is stripped.
    pub group: Option<String>,
    /// VOMS role; empty means no role.
    pub role: Option<String>,
    /// Delegation (MyProxy) server host.
    pub myproxy_server: Option<String>,
    /// DN of the service allowed to retrieve the delegated proxy.
    pub server_dn: Option<String>,
    /// Local proxy validity, `HH:MM`.
    pub proxy_validity: String,
    /// Delegated proxy validity in days.
    pub myproxy_validity_days: u32,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            vo: "cms".to_string(),
            group: None,
            role: None,
            myproxy_server: None,
            server_dn: None,
            proxy_validity: "24:00".to_string(),
            myproxy_validity_days: 7,
        }
    }
}
