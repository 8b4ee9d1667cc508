//! Credential store interfaces.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::error::CredentialError;

/// Role value of a proxy carrying no role.
pub const NULL_ROLE: &str = "NULL";

/// VOMS group and role of a proxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyAttributes {
    /// Group below the VO, empty for the VO itself.
    pub group: String,
    pub role: String,
}

impl ProxyAttributes {
    pub fn new(group: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            role: role.into(),
        }
    }
}

impl fmt::Display for ProxyAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group={:?} role={:?}", self.group, self.role)
    }
}

/// The local proxy certificate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProxyStore: Send + Sync {
    /// Time left on the proxy; zero when it is missing or expired.
    async fn remaining_validity(&self) -> Result<Duration, CredentialError>;

    async fn current_attributes(&self) -> Result<ProxyAttributes, CredentialError>;

    /// Create a fresh proxy valid for `validity`.
    async fn regenerate(
        &self,
        validity: Duration,
        attributes: &ProxyAttributes,
    ) -> Result<(), CredentialError>;

    /// Distinguished name of the proxy owner.
    async fn subject(&self) -> Result<String, CredentialError>;
}

/// The remote delegation server holding a long-lived credential.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DelegationService: Send + Sync {
    async fn remaining_validity(&self) -> Result<Duration, CredentialError>;

    async fn delegate(&self, validity: Duration) -> Result<(), CredentialError>;
}
