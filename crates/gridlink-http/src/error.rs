//! REST errors.

use gridlink_common_config::ConfigError;
use std::path::PathBuf;

/// Errors surfaced by the transport and the retry controller.
///
/// Every terminal request error carries the URL and the encoded payload so
/// the failure can be diagnosed without the caller's context.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to read {what} from {}: {source}", path.display())]
    ReadPem {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid {what} in {}: {message}", path.display())]
    InvalidPem {
        what: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("no CA certificate could be loaded from {}", dir.display())]
    NoCaCertificates { dir: PathBuf },

    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("fatal error trying to connect to {url} using {data:?} after {attempts} attempt(s): {detail}")]
    Transport {
        url: String,
        data: String,
        detail: String,
        attempts: u32,
    },

    #[error("fatal error trying to connect to {url} using {data:?}: HTTP {status} after {attempts} attempt(s): {detail}")]
    Server {
        url: String,
        data: String,
        status: u16,
        detail: String,
        attempts: u32,
    },

    #[error("fatal error reading data from {url} using {data:?}: {source}")]
    Decode {
        url: String,
        data: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RestError {
    /// HTTP status of a fatal server response.
    pub fn status(&self) -> Option<u16> {
        match self {
            RestError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Number of attempts made before giving up, if a request was sent.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            RestError::Transport { attempts, .. } | RestError::Server { attempts, .. } => {
                Some(*attempts)
            }
            _ => None,
        }
    }

    /// Raised before any network call was made.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RestError::Config(_)
                | RestError::ReadPem { .. }
                | RestError::InvalidPem { .. }
                | RestError::NoCaCertificates { .. }
                | RestError::ClientBuild(_)
        )
    }
}
