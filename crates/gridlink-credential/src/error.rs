//! Credential errors.

use gridlink_common_config::ConfigError;

/// Errors raised while preparing credentials. No request is attempted after one.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("problems creating proxy: no validity left after regeneration")]
    Creation,

    #[error("problems delegating proxy: no validity left on the delegation server")]
    Delegation,

    #[error("{program} failed: {detail}")]
    Command { program: String, detail: String },

    #[error("cannot parse {what} from {program} output: {output:?}")]
    Parse {
        program: &'static str,
        what: &'static str,
        output: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = CredentialError::Command {
            program: "voms-proxy-init".to_string(),
            detail: "exit status 1: Could not find a valid proxy".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "voms-proxy-init failed: exit status 1: Could not find a valid proxy"
        );
        assert!(CredentialError::Creation.to_string().contains("creating proxy"));
    }
}
