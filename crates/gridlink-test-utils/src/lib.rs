//! Test utilities for Gridlink crates.

use async_trait::async_trait;
use gridlink_common_config::BackoffConfig;
use gridlink_http::{AttemptOutcome, PreparedRequest, ReqwestTransport, Transport, TransportConfig};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

/// Creates a temporary directory that is cleaned up on drop.
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Creates a temporary file with given content.
pub fn temp_file(name: &str, content: &str) -> (TempDir, PathBuf) {
    let dir = temp_dir();
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write temp file");
    (dir, path)
}

/// Transport config for `host` that retries without sleeping.
pub fn fast_config(host: impl Into<String>) -> TransportConfig {
    TransportConfig::builder(host)
        .user_agent("gridlink-test", "1.0")
        .backoff(BackoffConfig {
            step_secs: 0,
            jitter_secs: 0,
        })
        .build()
}

/// Transport replaying a fixed list of outcomes and recording every request.
///
/// Once the script runs out, the fallback outcome is returned forever.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<AttemptOutcome>>,
    fallback: AttemptOutcome,
    seen: Mutex<Vec<PreparedRequest>>,
}

impl ScriptedTransport {
    pub fn new(outcomes: impl IntoIterator<Item = AttemptOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            fallback: AttemptOutcome::failed("scripted transport exhausted"),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Statuses with empty bodies, then `final_status` with `final_body`.
    pub fn statuses_then(statuses: &[u16], final_status: u16, final_body: &str) -> Self {
        let mut outcomes: Vec<_> = statuses
            .iter()
            .map(|&s| AttemptOutcome::response(s, ""))
            .collect();
        outcomes.push(AttemptOutcome::response(final_status, final_body.to_string()));
        Self::new(outcomes)
    }

    /// Return `outcome` for every attempt.
    pub fn always(outcome: AttemptOutcome) -> Self {
        Self::new(Vec::new()).with_fallback(outcome)
    }

    pub fn with_fallback(mut self, outcome: AttemptOutcome) -> Self {
        self.fallback = outcome;
        self
    }

    /// Number of attempts executed so far.
    pub fn attempts(&self) -> usize {
        self.seen.lock().map(|seen| seen.len()).unwrap_or_default()
    }

    /// Every request seen, in order.
    pub fn requests(&self) -> Vec<PreparedRequest> {
        self.seen.lock().map(|seen| seen.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &PreparedRequest) -> AttemptOutcome {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(request.clone());
        }
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Sends requests over plain HTTP so they can reach a local mock server.
#[derive(Debug, Clone)]
pub struct Downgrade<T>(pub T);

impl Downgrade<ReqwestTransport> {
    /// Plain reqwest client without client certificates.
    pub fn plain() -> Self {
        Downgrade(ReqwestTransport::with_client(reqwest::Client::new()))
    }
}

#[async_trait]
impl<T: Transport> Transport for Downgrade<T> {
    async fn execute(&self, request: &PreparedRequest) -> AttemptOutcome {
        let mut request = request.clone();
        if let Some(rest) = request.url.strip_prefix("https://") {
            request.url = format!("http://{rest}");
        }
        self.0.execute(&request).await
    }
}

/// Assert that a Result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

/// Assert that a Result is Err and return the error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
            Err(e) => e,
        }
    };
}
