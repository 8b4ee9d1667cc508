//! Transport executor: one authenticated network attempt per call.

use async_trait::async_trait;
use bytes::Bytes;
use gridlink_common_config::{
    resolve_ca_cert_dir_from, user_proxy_path, vars, BackoffConfig, ConfigError, Environment,
    TransportSettings, DEFAULT_CA_CERT_DIR,
};
use reqwest::{Certificate, Client, ClientBuilder, Identity};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::RestError;
use crate::request::PreparedRequest;

/// Longest body excerpt kept in an error text.
const ERROR_BODY_LIMIT: usize = 512;

/// Session-wide transport settings, immutable once built.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Host name, optionally with `:port`.
    pub host: String,
    pub client_cert_path: PathBuf,
    pub client_key_path: PathBuf,
    pub ca_cert_dir_path: PathBuf,
    pub user_agent_name: String,
    pub user_agent_version: String,
    /// Retry budget for overload statuses; at least two retries always happen.
    pub max_retries: u32,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub backoff: BackoffConfig,
}

impl TransportConfig {
    /// Start building a config for `host`.
    pub fn builder(host: impl Into<String>) -> TransportConfigBuilder {
        TransportConfigBuilder::new(host)
    }

    /// Resolve a config from the file settings and the grid environment.
    ///
    /// The client certificate falls back to `X509_USER_PROXY` and the key to
    /// the certificate file (a proxy holds both). The CA directory falls
    /// back to `X509_CERT_DIR`, then the grid default.
    pub fn from_settings(host: &str, settings: &TransportSettings) -> Result<Self, ConfigError> {
        Self::from_settings_with(
            host,
            settings,
            Environment::get(vars::X509_CERT_DIR),
            Path::new(DEFAULT_CA_CERT_DIR),
        )
    }

    /// Same as [`Self::from_settings`] with the CA lookup inputs supplied by
    /// the caller: the `X509_CERT_DIR` value and the default trust directory.
    pub fn from_settings_with(
        host: &str,
        settings: &TransportSettings,
        ca_cert_dir_env: Option<String>,
        default_ca_cert_dir: &Path,
    ) -> Result<Self, ConfigError> {
        let client_cert_path = settings
            .client_cert
            .clone()
            .or_else(user_proxy_path)
            .ok_or_else(|| ConfigError::ValidationError {
                message: "no client certificate configured and X509_USER_PROXY is not set"
                    .to_string(),
            })?;
        let client_key_path = settings
            .client_key
            .clone()
            .unwrap_or_else(|| client_cert_path.clone());

        let ca_cert_dir_path = match &settings.ca_cert_dir {
            Some(dir) if dir.is_dir() => dir.clone(),
            Some(dir) => {
                return Err(ConfigError::ValidationError {
                    message: format!("ca_cert_dir {} is not a directory", dir.display()),
                })
            }
            None => resolve_ca_cert_dir_from(ca_cert_dir_env, default_ca_cert_dir)?,
        };

        Ok(Self {
            host: host.to_string(),
            client_cert_path,
            client_key_path,
            ca_cert_dir_path,
            user_agent_name: settings.user_agent.clone(),
            user_agent_version: settings.version.clone(),
            max_retries: settings.max_retries,
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
            backoff: settings.backoff,
        })
    }

    /// `User-Agent` header value, `{name}/{version}`.
    pub fn user_agent(&self) -> String {
        format!("{}/{}", self.user_agent_name, self.user_agent_version)
    }
}

/// Builder for [`TransportConfig`], mostly used by tests and embedders.
#[derive(Debug, Clone)]
pub struct TransportConfigBuilder {
    config: TransportConfig,
}

impl TransportConfigBuilder {
    fn new(host: impl Into<String>) -> Self {
        let defaults = TransportSettings::default();
        Self {
            config: TransportConfig {
                host: host.into(),
                client_cert_path: PathBuf::new(),
                client_key_path: PathBuf::new(),
                ca_cert_dir_path: PathBuf::new(),
                user_agent_name: defaults.user_agent,
                user_agent_version: defaults.version,
                max_retries: defaults.max_retries,
                connect_timeout: Duration::from_secs(defaults.connect_timeout_secs),
                request_timeout: Duration::from_secs(defaults.request_timeout_secs),
                backoff: defaults.backoff,
            },
        }
    }

    pub fn client_identity(mut self, cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        self.config.client_cert_path = cert.into();
        self.config.client_key_path = key.into();
        self
    }

    pub fn ca_cert_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.ca_cert_dir_path = dir.into();
        self
    }

    pub fn user_agent(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.config.user_agent_name = name.into();
        self.config.user_agent_version = version.into();
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.config.connect_timeout = connect;
        self.config.request_timeout = request;
        self
    }

    pub fn backoff(mut self, backoff: BackoffConfig) -> Self {
        self.config.backoff = backoff;
        self
    }

    pub fn build(self) -> TransportConfig {
        self.config
    }
}

/// Result of a single network attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    /// HTTP status; `None` when the transport itself failed.
    pub status: Option<u16>,
    pub body: Bytes,
    /// Transport error text, set only when no status was produced.
    pub error: Option<String>,
}

impl AttemptOutcome {
    /// A response was received.
    pub fn response(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status: Some(status),
            body: body.into(),
            error: None,
        }
    }

    /// The transport failed before a status was available.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: None,
            body: Bytes::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Some(200)
    }

    /// Human-readable description of what went wrong in this attempt.
    pub fn error_text(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }
        let body = String::from_utf8_lossy(&self.body);
        let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
        match self.status {
            Some(status) if excerpt.is_empty() => {
                format!("the requested URL returned error: {status}")
            }
            Some(status) => format!("the requested URL returned error: {status}: {excerpt}"),
            None => "no response".to_string(),
        }
    }
}

/// Executes exactly one network round trip per call. No retries.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: &PreparedRequest) -> AttemptOutcome;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn execute(&self, request: &PreparedRequest) -> AttemptOutcome {
        (**self).execute(request).await
    }
}

/// Mutual-TLS transport on top of `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a client presenting the configured identity and trusting only
    /// the configured CA directory.
    pub fn new(config: &TransportConfig) -> Result<Self, RestError> {
        let identity = load_identity(&config.client_cert_path, &config.client_key_path)?;
        let roots = load_ca_certificates(&config.ca_cert_dir_path)?;

        let mut builder = ClientBuilder::new()
            .use_rustls_tls()
            .tls_built_in_root_certs(false)
            .identity(identity)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout);

        for root in roots {
            builder = builder.add_root_certificate(root);
        }

        let client = builder.build().map_err(RestError::ClientBuild)?;
        Ok(Self { client })
    }

    /// Wrap an already configured client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Get the inner reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: &PreparedRequest) -> AttemptOutcome {
        let mut builder = self
            .client
            .request(request.method.into(), request.url.as_str());

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return AttemptOutcome::failed(error_chain(&e)),
        };

        let status = response.status().as_u16();
        tracing::debug!(status, url = %request.url, "response received");

        match response.bytes().await {
            Ok(body) => AttemptOutcome::response(status, body),
            Err(e) => AttemptOutcome::failed(format!(
                "HTTP {status} but reading the body failed: {}",
                error_chain(&e)
            )),
        }
    }
}

/// Read the client certificate and key into a single PEM identity.
fn load_identity(cert_path: &Path, key_path: &Path) -> Result<Identity, RestError> {
    let mut pem = read_pem("client certificate", cert_path)?;
    if key_path != cert_path {
        pem.push(b'\n');
        pem.extend(read_pem("client key", key_path)?);
    }
    Identity::from_pem(&pem).map_err(|e| RestError::InvalidPem {
        what: "client identity",
        path: cert_path.to_path_buf(),
        message: e.to_string(),
    })
}

fn read_pem(what: &'static str, path: &Path) -> Result<Vec<u8>, RestError> {
    std::fs::read(path).map_err(|source| RestError::ReadPem {
        what,
        path: path.to_path_buf(),
        source,
    })
}

/// Load every certificate file of a CA trust directory.
///
/// Accepts `*.pem`, `*.crt` and OpenSSL hash links (`*.0`, `*.1`, ...).
/// A file counts only when it holds at least one PEM certificate block;
/// anything else is skipped.
pub fn load_ca_certificates(dir: &Path) -> Result<Vec<Certificate>, RestError> {
    let entries = std::fs::read_dir(dir).map_err(|source| RestError::ReadPem {
        what: "CA directory",
        path: dir.to_path_buf(),
        source,
    })?;

    let mut certificates = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !is_ca_file(&path) || !path.is_file() {
            continue;
        }
        match read_certificates(&path) {
            Ok(found) if found.is_empty() => {
                tracing::debug!(path = %path.display(), "skipping CA file without certificates")
            }
            Ok(found) => certificates.extend(found),
            Err(e) => tracing::debug!(path = %path.display(), error = %e, "skipping CA file"),
        }
    }

    if certificates.is_empty() {
        return Err(RestError::NoCaCertificates {
            dir: dir.to_path_buf(),
        });
    }
    tracing::debug!(count = certificates.len(), dir = %dir.display(), "loaded CA certificates");
    Ok(certificates)
}

/// Certificates of one PEM file, one per `CERTIFICATE` block.
fn read_certificates(path: &Path) -> Result<Vec<Certificate>, RestError> {
    let file = std::fs::File::open(path).map_err(|source| RestError::ReadPem {
        what: "CA certificate",
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = BufReader::new(file);

    let blocks = rustls_pemfile::certs(&mut reader).map_err(|e| RestError::InvalidPem {
        what: "CA certificate",
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    blocks
        .iter()
        .map(|der| {
            Certificate::from_der(der).map_err(|e| RestError::InvalidPem {
                what: "CA certificate",
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        })
        .collect()
}

pub(crate) fn is_ca_file(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some("pem") | Some("crt") => true,
        Some(ext) => !ext.is_empty() && ext.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Render an error with its whole source chain.
pub(crate) fn error_chain(error: &dyn std::error::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_builder_defaults() {
        let config = TransportConfig::builder("cmsweb.cern.ch").build();
        assert_eq!(config.host, "cmsweb.cern.ch");
        assert_eq!(config.user_agent(), "gridlink/0.0.0");
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.backoff, BackoffConfig::default());
        assert_eq!(config.request_timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_from_settings_uses_explicit_paths() {
        let ca = tempdir().unwrap();
        let settings = TransportSettings {
            client_cert: Some(PathBuf::from("/tmp/usercert.pem")),
            client_key: Some(PathBuf::from("/tmp/userkey.pem")),
            ca_cert_dir: Some(ca.path().to_path_buf()),
            max_retries: 4,
            ..TransportSettings::default()
        };

        let config = TransportConfig::from_settings("localhost", &settings).unwrap();
        assert_eq!(config.client_cert_path, PathBuf::from("/tmp/usercert.pem"));
        assert_eq!(config.client_key_path, PathBuf::from("/tmp/userkey.pem"));
        assert_eq!(config.ca_cert_dir_path, ca.path());
        assert_eq!(config.max_retries, 4);
    }

    #[test]
    fn test_from_settings_key_defaults_to_cert() {
        let ca = tempdir().unwrap();
        let settings = TransportSettings {
            client_cert: Some(PathBuf::from("/tmp/x509up_u1000")),
            ca_cert_dir: Some(ca.path().to_path_buf()),
            ..TransportSettings::default()
        };

        let config = TransportConfig::from_settings("localhost", &settings).unwrap();
        assert_eq!(config.client_key_path, config.client_cert_path);
    }

    #[test]
    fn test_from_settings_rejects_missing_ca_dir() {
        let settings = TransportSettings {
            client_cert: Some(PathBuf::from("/tmp/x509up_u1000")),
            ca_cert_dir: Some(PathBuf::from("/no/such/ca/dir")),
            ..TransportSettings::default()
        };

        let err = TransportConfig::from_settings("localhost", &settings).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn test_outcome_error_text() {
        let failed = AttemptOutcome::failed("connection refused");
        assert_eq!(failed.status, None);
        assert_eq!(failed.error_text(), "connection refused");

        let empty = AttemptOutcome::response(404, "");
        assert_eq!(empty.error_text(), "the requested URL returned error: 404");

        let with_body = AttemptOutcome::response(503, "DatabaseUnavailable");
        assert!(with_body.error_text().ends_with("503: DatabaseUnavailable"));
        assert!(!with_body.is_success());
        assert!(AttemptOutcome::response(200, "{}").is_success());
    }

    #[test]
    fn test_outcome_error_text_truncates_body() {
        let outcome = AttemptOutcome::response(500, "x".repeat(10_000));
        assert!(outcome.error_text().len() < 600);
    }

    #[test]
    fn test_is_ca_file() {
        assert!(is_ca_file(Path::new("/certs/CERN-Root-2.pem")));
        assert!(is_ca_file(Path::new("/certs/ca.crt")));
        assert!(is_ca_file(Path::new("/certs/1d879c6c.0")));
        assert!(is_ca_file(Path::new("/certs/1d879c6c.12")));
        assert!(!is_ca_file(Path::new("/certs/1d879c6c.r0")));
        assert!(!is_ca_file(Path::new("/certs/CERN-Root-2.signing_policy")));
        assert!(!is_ca_file(Path::new("/certs/CERN-Root-2.namespaces")));
        assert!(!is_ca_file(Path::new("/certs/README")));
    }

    #[test]
    fn test_missing_identity_is_reported_with_path() {
        let ca = tempdir().unwrap();
        let config = TransportConfig::builder("localhost")
            .client_identity("/no/such/usercert.pem", "/no/such/userkey.pem")
            .ca_cert_dir(ca.path())
            .build();

        match ReqwestTransport::new(&config).unwrap_err() {
            RestError::ReadPem { what, path, .. } => {
                assert_eq!(what, "client certificate");
                assert_eq!(path, PathBuf::from("/no/such/usercert.pem"));
            }
            other => panic!("Expected ReadPem, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_ca_dir_is_rejected() {
        let ca = tempdir().unwrap();
        fs::write(ca.path().join("README"), "not a certificate").unwrap();

        let err = load_ca_certificates(ca.path()).unwrap_err();
        assert!(matches!(err, RestError::NoCaCertificates { .. }));
    }

    #[test]
    fn test_garbage_pem_files_are_not_counted() {
        let ca = tempdir().unwrap();
        fs::write(ca.path().join("foo.pem"), "this is not a certificate\n").unwrap();
        fs::write(ca.path().join("1d879c6c.0"), "").unwrap();

        let err = load_ca_certificates(ca.path()).unwrap_err();
        match err {
            RestError::NoCaCertificates { dir } => assert_eq!(dir, ca.path()),
            other => panic!("Expected NoCaCertificates, got {other:?}"),
        }
    }

    #[test]
    fn test_from_settings_without_any_ca_dir() {
        let empty = tempdir().unwrap();
        let missing = empty.path().join("certificates");
        let settings = TransportSettings {
            client_cert: Some(PathBuf::from("/tmp/x509up_u1000")),
            ..TransportSettings::default()
        };

        let err = TransportConfig::from_settings_with("localhost", &settings, None, &missing)
            .unwrap_err();
        match err {
            ConfigError::CaCertPathNotFound { var, default } => {
                assert_eq!(var, "X509_CERT_DIR");
                assert_eq!(default, missing);
            }
            other => panic!("Expected CaCertPathNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_from_settings_uses_cert_dir_variable() {
        let from_env = tempdir().unwrap();
        let settings = TransportSettings {
            client_cert: Some(PathBuf::from("/tmp/x509up_u1000")),
            ..TransportSettings::default()
        };

        let config = TransportConfig::from_settings_with(
            "localhost",
            &settings,
            Some(from_env.path().display().to_string()),
            Path::new("/no/such/grid-security/certificates"),
        )
        .unwrap();
        assert_eq!(config.ca_cert_dir_path, from_env.path());
    }

    #[test]
    fn test_error_chain_includes_sources() {
        #[derive(Debug, thiserror::Error)]
        #[error("outer")]
        struct Outer(#[source] std::io::Error);

        let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "inner"));
        assert_eq!(error_chain(&err), "outer: inner");
    }
}
