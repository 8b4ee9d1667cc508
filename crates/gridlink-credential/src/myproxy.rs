//! Delegation through a MyProxy server.

use async_trait::async_trait;
use gridlink_common_config::{user_proxy_path, ConfigError, CredentialConfig};
use std::path::PathBuf;
use std::time::Duration;

use crate::command::Tool;
use crate::error::CredentialError;
use crate::store::DelegationService;

const MYPROXY_INFO: &str = "myproxy-info";
const MYPROXY_INIT: &str = "myproxy-init";

/// Delegation service backed by `myproxy-info` and `myproxy-init`.
///
/// The credential is stored under the proxy's DN and, when a server DN is
/// configured, only that service may retrieve it.
#[derive(Debug, Clone)]
pub struct MyProxyCommandService {
    server: String,
    server_dn: Option<String>,
    proxy_path: Option<PathBuf>,
}

impl MyProxyCommandService {
    pub fn new(server: impl Into<String>, server_dn: Option<String>, proxy_path: Option<PathBuf>) -> Self {
        Self {
            server: server.into(),
            server_dn,
            proxy_path,
        }
    }

    pub fn from_config(config: &CredentialConfig) -> Result<Self, ConfigError> {
        let server = config
            .myproxy_server
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ConfigError::ValidationError {
                message: "credential.myproxy_server is required for delegation".to_string(),
            })?;
        Ok(Self::new(server, config.server_dn.clone(), user_proxy_path()))
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn tool(&self, program: &'static str) -> Tool<'_> {
        Tool::new(program)
            .arg("-d")
            .arg("-s")
            .arg(self.server.clone())
            .proxy(self.proxy_path.as_deref())
    }
}

#[async_trait]
impl DelegationService for MyProxyCommandService {
    async fn remaining_validity(&self) -> Result<Duration, CredentialError> {
        let output = self.tool(MYPROXY_INFO).run().await?;
        if !output.success {
            tracing::debug!(server = %self.server, stderr = %output.stderr.trim(), "no delegated credential");
            return Ok(Duration::ZERO);
        }
        parse_myproxy_timeleft(&output.stdout).ok_or_else(|| CredentialError::Parse {
            program: MYPROXY_INFO,
            what: "time left",
            output: output.stdout,
        })
    }

    async fn delegate(&self, validity: Duration) -> Result<(), CredentialError> {
        let hours = validity.as_secs().div_ceil(3600).max(1);
        let mut tool = self.tool(MYPROXY_INIT).arg("-n").arg("-c").arg(hours.to_string());
        if let Some(dn) = &self.server_dn {
            tool = tool.arg("-x").arg("-R").arg(dn.clone());
        }
        tool.run().await?.require_success(MYPROXY_INIT)?;
        Ok(())
    }
}

/// Time left from `myproxy-info`, whose output carries `timeleft: 167.9 hours`.
pub fn parse_myproxy_timeleft(output: &str) -> Option<Duration> {
    let value = output
        .lines()
        .find_map(|line| line.trim().strip_prefix("timeleft:"))?;
    let hours: f64 = value.split_whitespace().next()?.parse().ok()?;
    if !hours.is_finite() {
        return None;
    }
    Some(Duration::from_secs((hours.max(0.0) * 3600.0) as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_OUTPUT: &str = "\
username: /DC=ch/DC=cern/OU=Users/CN=jdoe
owner: /DC=ch/DC=cern/OU=Users/CN=jdoe/CN=proxy
  retrieval policy: /DC=ch/DC=cern/OU=computers/CN=vocms.cern.ch
  timeleft: 167.5 hours (7.0 days)
";

    #[test]
    fn test_parse_timeleft() {
        assert_eq!(
            parse_myproxy_timeleft(INFO_OUTPUT),
            Some(Duration::from_secs(167 * 3600 + 1800))
        );
        assert_eq!(
            parse_myproxy_timeleft("timeleft: 0 hours\n"),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_myproxy_timeleft("username: x\n"), None);
        assert_eq!(parse_myproxy_timeleft("timeleft: soon\n"), None);
    }

    #[test]
    fn test_from_config_requires_server() {
        let config = CredentialConfig::default();
        assert!(matches!(
            MyProxyCommandService::from_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));

        let config = CredentialConfig {
            myproxy_server: Some("myproxy.cern.ch".to_string()),
            server_dn: Some("/DC=ch/DC=cern/OU=computers/CN=vocms.cern.ch".to_string()),
            ..CredentialConfig::default()
        };
        let service = MyProxyCommandService::from_config(&config).unwrap();
        assert_eq!(service.server(), "myproxy.cern.ch");
    }
}
