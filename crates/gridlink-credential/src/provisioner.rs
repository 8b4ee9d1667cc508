//! Keeps the local proxy and the delegated credential valid.

use gridlink_common_config::{parse_validity, ConfigError, CredentialConfig};
use gridlink_common_log::spans::{credential_span, instrument_future, record_error};
use std::time::Duration;

use crate::error::CredentialError;
use crate::store::{DelegationService, ProxyAttributes, ProxyStore, NULL_ROLE};

const SECONDS_PER_DAY: u64 = 24 * 3600;

/// What the provisioner asks for when it regenerates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionerSettings {
    pub group: Option<String>,
    pub role: Option<String>,
    pub proxy_validity: Duration,
    pub delegation_validity: Duration,
}

impl Default for ProvisionerSettings {
    fn default() -> Self {
        Self {
            group: None,
            role: None,
            proxy_validity: Duration::from_secs(SECONDS_PER_DAY),
            delegation_validity: Duration::from_secs(7 * SECONDS_PER_DAY),
        }
    }
}

impl ProvisionerSettings {
    pub fn from_config(config: &CredentialConfig) -> Result<Self, ConfigError> {
        let proxy_secs =
            parse_validity(&config.proxy_validity).ok_or_else(|| ConfigError::ValidationError {
                message: format!(
                    "credential.proxy_validity must be HH:MM, got {:?}",
                    config.proxy_validity
                ),
            })?;
        Ok(Self {
            group: config.group.as_deref().map(|g| group_below_vo(g, &config.vo)),
            role: config.role.clone(),
            proxy_validity: Duration::from_secs(proxy_secs),
            delegation_validity: Duration::from_secs(
                u64::from(config.myproxy_validity_days) * SECONDS_PER_DAY,
            ),
        })
    }

    /// Attributes the proxy should carry. An empty role means no role.
    pub fn wanted_attributes(&self) -> ProxyAttributes {
        let role = match self.role.as_deref() {
            None | Some("") => NULL_ROLE,
            Some(role) => role,
        };
        ProxyAttributes::new(self.group.clone().unwrap_or_default(), role)
    }

    fn checks_attributes(&self) -> bool {
        self.group.is_some() && self.role.is_some()
    }
}

/// Group path relative to `vo`, the form the proxy attributes report.
///
/// `/cms/itcms`, `cms/itcms/` and `itcms` all give `itcms`; `/cms` gives
/// the empty group.
fn group_below_vo(group: &str, vo: &str) -> String {
    let group = group.trim().trim_matches('/');
    let below = match group.strip_prefix(vo) {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => rest,
        _ => group,
    };
    below.trim_matches('/').to_string()
}

/// Ensures credentials are fresh before REST calls.
#[derive(Debug)]
pub struct CredentialProvisioner<S, D> {
    store: S,
    delegation: D,
    settings: ProvisionerSettings,
    proxy_changed: bool,
}

impl<S: ProxyStore, D: DelegationService> CredentialProvisioner<S, D> {
    pub fn new(store: S, delegation: D, settings: ProvisionerSettings) -> Self {
        Self {
            store,
            delegation,
            settings,
            proxy_changed: false,
        }
    }

    /// Whether the proxy attributes changed during this session.
    pub fn proxy_changed(&self) -> bool {
        self.proxy_changed
    }

    pub fn settings(&self) -> &ProvisionerSettings {
        &self.settings
    }

    /// Make sure a proxy with at least `threshold` left and the configured
    /// attributes exists, creating one if needed. Returns the proxy subject.
    pub async fn ensure_proxy(&mut self, threshold: Duration) -> Result<String, CredentialError> {
        let span = credential_span("proxy");
        let result = instrument_future(self.ensure_proxy_inner(threshold), span.clone()).await;
        if let Err(e) = &result {
            let _entered = span.enter();
            record_error(e);
        }
        result
    }

    async fn ensure_proxy_inner(&mut self, threshold: Duration) -> Result<String, CredentialError> {
        let remaining = self.store.remaining_validity().await?;
        tracing::debug!(remaining_secs = remaining.as_secs(), "proxy time left");

        let wanted = self.settings.wanted_attributes();
        let expired = is_expired(remaining, threshold);

        if !expired && self.settings.checks_attributes() {
            let current = self.store.current_attributes().await?;
            if current != wanted {
                tracing::info!(%current, %wanted, "proxy attributes changed");
                self.proxy_changed = true;
            }
        }

        if expired || self.proxy_changed {
            tracing::debug!(
                validity = %crate::voms::format_validity(self.settings.proxy_validity),
                "creating proxy"
            );
            self.store
                .regenerate(self.settings.proxy_validity, &wanted)
                .await?;
            let remaining = self.store.remaining_validity().await?;
            if remaining.is_zero() {
                return Err(CredentialError::Creation);
            }
            tracing::debug!(remaining_secs = remaining.as_secs(), "proxy created");
        }

        self.store.subject().await
    }

    /// Make sure the delegation server holds a credential with at least
    /// `threshold` left, delegating again when the local proxy changed.
    pub async fn ensure_delegation(&self, threshold: Duration) -> Result<(), CredentialError> {
        let span = credential_span("delegation");
        let result = instrument_future(self.ensure_delegation_inner(threshold), span.clone()).await;
        if let Err(e) = &result {
            let _entered = span.enter();
            record_error(e);
        }
        result
    }

    async fn ensure_delegation_inner(&self, threshold: Duration) -> Result<(), CredentialError> {
        let remaining = self.delegation.remaining_validity().await?;
        tracing::debug!(remaining_secs = remaining.as_secs(), "delegated credential time left");

        if is_expired(remaining, threshold) || self.proxy_changed {
            tracing::debug!(
                days = self.settings.delegation_validity.as_secs() / SECONDS_PER_DAY,
                "delegating proxy"
            );
            self.delegation
                .delegate(self.settings.delegation_validity)
                .await?;
            let remaining = self.delegation.remaining_validity().await?;
            if remaining.is_zero() {
                return Err(CredentialError::Delegation);
            }
            tracing::debug!(remaining_secs = remaining.as_secs(), "proxy delegated");
        }

        Ok(())
    }
}

/// A credential with nothing left is expired whatever the threshold.
fn is_expired(remaining: Duration, threshold: Duration) -> bool {
    remaining.is_zero() || remaining < threshold
}
