use gridlink_common_config::GridlinkConfig;
use std::path::Path;
use gridlink_http::{
    Payload, ReqwestTransport, RestError, RestResponse, RetryingClient, Transport, TransportConfig,
};

/// REST client bound to one service instance.
#[derive(Debug, Clone)]
pub struct RestClient<T = ReqwestTransport> {
    client: RetryingClient<T>,
    service: String,
    instance: String,
}

impl RestClient<ReqwestTransport> {
    /// Build a mutual-TLS client from a loaded configuration.
    pub fn from_config(config: &GridlinkConfig) -> Result<Self, RestError> {
        let transport = TransportConfig::from_settings(&config.server.host, &config.transport)?;
        Self::from_transport_config(config, transport)
    }

    /// Like [`Self::from_config`], resolving the CA directory from the given
    /// `X509_CERT_DIR` value and default directory instead of the process.
    pub fn from_config_with(
        config: &GridlinkConfig,
        ca_cert_dir_env: Option<String>,
        default_ca_cert_dir: &Path,
    ) -> Result<Self, RestError> {
        let transport = TransportConfig::from_settings_with(
            &config.server.host,
            &config.transport,
            ca_cert_dir_env,
            default_ca_cert_dir,
        )?;
        Self::from_transport_config(config, transport)
    }

    fn from_transport_config(
        config: &GridlinkConfig,
        transport: TransportConfig,
    ) -> Result<Self, RestError> {
        let client = RetryingClient::new(transport)?;
        tracing::debug!(
            host = %config.server.host,
            service = %config.server.service,
            instance = %config.server.instance,
            "REST client ready"
        );
        Ok(Self::new(client, &config.server.service, &config.server.instance))
    }
}

impl<T: Transport> RestClient<T> {
    pub fn new(client: RetryingClient<T>, service: &str, instance: &str) -> Self {
        Self {
            client,
            service: trim_segment(service),
            instance: trim_segment(instance),
        }
    }

    /// Point subsequent calls at another deployment instance.
    pub fn set_instance(&mut self, instance: &str) {
        self.instance = trim_segment(instance);
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Path prefix shared by every endpoint, `/{service}/{instance}/`.
    pub fn uri(&self) -> String {
        format!("/{}/{}/", self.service, self.instance)
    }

    pub fn host(&self) -> &str {
        &self.client.config().host
    }

    pub async fn get(&self, api: &str, data: impl Into<Payload>) -> Result<RestResponse, RestError> {
        self.client.get(&self.endpoint(api), data).await
    }

    pub async fn post(&self, api: &str, data: impl Into<Payload>) -> Result<RestResponse, RestError> {
        self.client.post(&self.endpoint(api), data).await
    }

    pub async fn put(&self, api: &str, data: impl Into<Payload>) -> Result<RestResponse, RestError> {
        self.client.put(&self.endpoint(api), data).await
    }

    pub async fn delete(&self, api: &str, data: impl Into<Payload>) -> Result<RestResponse, RestError> {
        self.client.delete(&self.endpoint(api), data).await
    }

    fn endpoint(&self, api: &str) -> String {
        format!("{}{}", self.uri(), api.trim_start_matches('/'))
    }
}

fn trim_segment(segment: &str) -> String {
    segment.trim().trim_matches('/').to_string()
}
