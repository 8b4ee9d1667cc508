//! Grid command-line tool execution.

use gridlink_common_log::spans::Timer;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::CredentialError;

/// Captured result of one tool invocation.
#[derive(Debug, Clone)]
pub(crate) struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Turn a non-zero exit into a [`CredentialError::Command`].
    pub fn require_success(self, program: &str) -> Result<Self, CredentialError> {
        if self.success {
            return Ok(self);
        }
        let status = self
            .code
            .map_or_else(|| "killed by signal".to_string(), |c| format!("exit status {c}"));
        Err(CredentialError::Command {
            program: program.to_string(),
            detail: format!("{status}: {}", self.stderr.trim()),
        })
    }
}

/// Invocation of a grid tool.
#[derive(Debug)]
pub(crate) struct Tool<'a> {
    program: &'a str,
    args: Vec<String>,
    proxy: Option<&'a Path>,
    interactive: bool,
}

impl<'a> Tool<'a> {
    pub fn new(program: &'a str) -> Self {
        Self {
            program,
            args: Vec::new(),
            proxy: None,
            interactive: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Point the tool at a proxy file through `X509_USER_PROXY`.
    pub fn proxy(mut self, path: Option<&'a Path>) -> Self {
        self.proxy = path;
        self
    }

    /// Let the tool prompt on the terminal (key passphrase).
    pub fn interactive(mut self) -> Self {
        self.interactive = true;
        self
    }

    pub async fn run(self) -> Result<CommandOutput, CredentialError> {
        tracing::debug!(program = self.program, args = ?self.args, "running grid tool");
        let timer = Timer::start("grid_tool");

        let mut cmd = Command::new(self.program);
        cmd.args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if self.interactive {
            cmd.stdin(Stdio::inherit());
        } else {
            cmd.stdin(Stdio::null());
        }
        if let Some(path) = self.proxy {
            cmd.env("X509_USER_PROXY", path);
        }

        let output = cmd.output().await.map_err(|e| CredentialError::Command {
            program: self.program.to_string(),
            detail: e.to_string(),
        })?;
        timer.finish();

        let result = CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        tracing::debug!(program = self.program, code = ?result.code, "grid tool finished");
        Ok(result)
    }
}
