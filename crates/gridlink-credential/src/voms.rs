//! VOMS proxy store driven by the `voms-proxy-*` tools.

use async_trait::async_trait;
use gridlink_common_config::{user_proxy_path, CredentialConfig};
use std::path::PathBuf;
use std::time::Duration;

use crate::command::Tool;
use crate::error::CredentialError;
use crate::store::{ProxyAttributes, ProxyStore, NULL_ROLE};

const PROXY_INFO: &str = "voms-proxy-info";
const PROXY_INIT: &str = "voms-proxy-init";

/// Proxy store backed by `voms-proxy-info` and `voms-proxy-init`.
#[derive(Debug, Clone)]
pub struct VomsCommandStore {
    vo: String,
    /// Proxy file; the tools' default location when unset.
    proxy_path: Option<PathBuf>,
}

impl VomsCommandStore {
    pub fn new(vo: impl Into<String>, proxy_path: Option<PathBuf>) -> Self {
        Self {
            vo: vo.into(),
            proxy_path,
        }
    }

    /// Store for the configured VO, using `X509_USER_PROXY` when set.
    pub fn from_config(config: &CredentialConfig) -> Self {
        Self::new(&config.vo, user_proxy_path())
    }

    fn info(&self, flag: &str) -> Tool<'_> {
        let mut tool = Tool::new(PROXY_INFO);
        if let Some(path) = &self.proxy_path {
            tool = tool.arg("-file").arg(path.display().to_string());
        }
        tool.arg(flag)
    }
}

#[async_trait]
impl ProxyStore for VomsCommandStore {
    async fn remaining_validity(&self) -> Result<Duration, CredentialError> {
        let output = self.info("-timeleft").run().await?;
        if !output.success {
            tracing::debug!(stderr = %output.stderr.trim(), "no usable proxy");
            return Ok(Duration::ZERO);
        }
        parse_timeleft(&output.stdout)
            .map(Duration::from_secs)
            .ok_or_else(|| CredentialError::Parse {
                program: PROXY_INFO,
                what: "time left",
                output: output.stdout,
            })
    }

    async fn current_attributes(&self) -> Result<ProxyAttributes, CredentialError> {
        let output = self.info("-fqan").run().await?;
        if !output.success {
            // plain grid proxy without VOMS extension
            return Ok(ProxyAttributes::default());
        }
        Ok(parse_fqan(&output.stdout, &self.vo))
    }

    async fn regenerate(
        &self,
        validity: Duration,
        attributes: &ProxyAttributes,
    ) -> Result<(), CredentialError> {
        let mut tool = Tool::new(PROXY_INIT)
            .arg("-voms")
            .arg(voms_argument(&self.vo, attributes))
            .arg("-valid")
            .arg(format_validity(validity))
            .arg("-rfc");
        if let Some(path) = &self.proxy_path {
            tool = tool.arg("-out").arg(path.display().to_string());
        }
        tool.interactive().run().await?.require_success(PROXY_INIT)?;
        Ok(())
    }

    async fn subject(&self) -> Result<String, CredentialError> {
        let output = self.info("-identity").run().await?.require_success(PROXY_INFO)?;
        parse_subject(&output.stdout).ok_or_else(|| CredentialError::Parse {
            program: PROXY_INFO,
            what: "subject",
            output: output.stdout,
        })
    }
}

/// Seconds from `voms-proxy-info -timeleft`; negative values clamp to zero.
pub fn parse_timeleft(output: &str) -> Option<u64> {
    let line = output.lines().map(str::trim).filter(|l| !l.is_empty()).last()?;
    let secs: i64 = line.parse().ok()?;
    Some(secs.max(0) as u64)
}

/// Group and role from the primary FQAN, `/vo[/group...][/Role=r][/Capability=c]`.
///
/// No FQAN, or one for another VO, yields empty attributes.
pub fn parse_fqan(output: &str, vo: &str) -> ProxyAttributes {
    let Some(fqan) = output.lines().map(str::trim).find(|l| l.starts_with('/')) else {
        return ProxyAttributes::default();
    };

    let mut segments = fqan.trim_start_matches('/').split('/');
    if segments.next() != Some(vo) {
        return ProxyAttributes::default();
    }

    let mut group = Vec::new();
    let mut role = NULL_ROLE.to_string();
    for segment in segments {
        if let Some(r) = segment.strip_prefix("Role=") {
            role = r.to_string();
        } else if segment.starts_with("Capability=") {
            continue;
        } else {
            group.push(segment);
        }
    }

    ProxyAttributes::new(group.join("/"), role)
}

/// `-voms` argument requesting `attributes` from `vo`.
pub fn voms_argument(vo: &str, attributes: &ProxyAttributes) -> String {
    let mut fqan = String::new();
    if !attributes.group.is_empty() {
        fqan.push_str(&format!("/{vo}/{}", attributes.group.trim_matches('/')));
    }
    if !attributes.role.is_empty() && attributes.role != NULL_ROLE {
        if fqan.is_empty() {
            fqan.push_str(&format!("/{vo}"));
        }
        fqan.push_str(&format!("/Role={}", attributes.role));
    }

    if fqan.is_empty() {
        vo.to_string()
    } else {
        format!("{vo}:{fqan}")
    }
}

/// Render a validity window as `HH:MM`.
pub fn format_validity(validity: Duration) -> String {
    let minutes = validity.as_secs() / 60;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Last non-empty line of an identity query, which must be a DN.
pub fn parse_subject(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .filter(|l| l.starts_with('/'))
        .map(str::to_string)
}
