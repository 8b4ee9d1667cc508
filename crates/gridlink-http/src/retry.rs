//! Retry controller: bounded attempts with jittered backoff.
//!
//! A request gets `max(2, max_retries) + 1` attempts. After a failed attempt
//! `i` it is retried when `i < 2` (whatever the status) or when the status is
//! one of the overload statuses and `i < max_retries`. A 200 whose body is not
//! valid JSON is fatal at once.

use gridlink_common_config::BackoffConfig;
use gridlink_common_log::spans::request_span;
use rand::Rng;
use std::time::Duration;
use tracing::Instrument;

use crate::error::RestError;
use crate::request::{Payload, PreparedRequest, RequestSpec, Verb};
use crate::response::RestResponse;
use crate::transport::{AttemptOutcome, ReqwestTransport, Transport, TransportConfig};

/// Statuses that signal transient server overload.
///
/// 429 throttling, 500 internal error, 502 frontend with overloaded
/// backends, 503 database unavailable.
pub const RETRYABLE_STATUSES: [u16; 4] = [429, 500, 502, 503];

/// Attempts that are retried regardless of the outcome.
pub const GRACE_ATTEMPTS: u32 = 2;

pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Number of retries after the first attempt.
pub fn retry_limit(max_retries: u32) -> u32 {
    max_retries.max(GRACE_ATTEMPTS)
}

/// Decide whether failed attempt `attempt` (0-based) is followed by another.
///
/// `status` is `None` when the transport failed without a response.
pub fn should_retry(attempt: u32, status: Option<u16>, max_retries: u32) -> bool {
    let in_grace_window = attempt < GRACE_ATTEMPTS;
    let overload_within_budget =
        status.is_some_and(is_retryable_status) && attempt < max_retries;
    in_grace_window || overload_within_budget
}

/// Delay before the attempt following `attempt`.
///
/// `step * (attempt + 1)` plus a uniform whole-second offset in
/// `[-jitter, +jitter]`. Never below one second unless `step` is zero.
pub fn backoff_delay<R: Rng + ?Sized>(policy: &BackoffConfig, attempt: u32, rng: &mut R) -> Duration {
    let base = policy.step_secs.saturating_mul(u64::from(attempt) + 1);
    if base == 0 {
        return Duration::ZERO;
    }
    let jitter = policy.jitter_secs.min(i64::MAX as u64) as i64;
    let offset = if jitter > 0 {
        rng.gen_range(-jitter..=jitter)
    } else {
        0
    };
    let secs = (base as i64).saturating_add(offset).max(1);
    Duration::from_secs(secs as u64)
}

/// REST client wrapping a [`Transport`] in the retry loop.
#[derive(Debug, Clone)]
pub struct RetryingClient<T = ReqwestTransport> {
    config: TransportConfig,
    transport: T,
}

impl RetryingClient<ReqwestTransport> {
    /// Build the mutual-TLS transport from `config`.
    pub fn new(config: TransportConfig) -> Result<Self, RestError> {
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self { config, transport })
    }
}

impl<T: Transport> RetryingClient<T> {
    pub fn with_transport(config: TransportConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn get(&self, uri: &str, data: impl Into<Payload>) -> Result<RestResponse, RestError> {
        self.request(&RequestSpec::new(Verb::Get, uri, data)).await
    }

    pub async fn post(&self, uri: &str, data: impl Into<Payload>) -> Result<RestResponse, RestError> {
        self.request(&RequestSpec::new(Verb::Post, uri, data)).await
    }

    pub async fn put(&self, uri: &str, data: impl Into<Payload>) -> Result<RestResponse, RestError> {
        self.request(&RequestSpec::new(Verb::Put, uri, data)).await
    }

    pub async fn delete(&self, uri: &str, data: impl Into<Payload>) -> Result<RestResponse, RestError> {
        self.request(&RequestSpec::new(Verb::Delete, uri, data)).await
    }

    /// Run `spec` until it succeeds or a failure is classified as fatal.
    pub async fn request(&self, spec: &RequestSpec) -> Result<RestResponse, RestError> {
        let prepared = PreparedRequest::new(spec, &self.config);
        let span = request_span(spec.verb.as_str(), &prepared.url);
        self.run(spec, &prepared).instrument(span).await
    }

    async fn run(&self, spec: &RequestSpec, prepared: &PreparedRequest) -> Result<RestResponse, RestError> {
        let limit = retry_limit(self.config.max_retries);
        let mut attempt: u32 = 0;

        loop {
            tracing::debug!(
                attempt,
                verb = %prepared.method,
                url = %prepared.url,
                data = %spec.body,
                "executing request"
            );
            let outcome = self.transport.execute(prepared).await;
            tracing::Span::current().record("attempts", attempt + 1);

            if outcome.is_success() {
                return RestResponse::decode(200, &outcome.body).map_err(|source| {
                    tracing::warn!(url = %prepared.url, error = %source, "undecodable success body");
                    RestError::Decode {
                        url: prepared.url.clone(),
                        data: spec.body.clone(),
                        source,
                    }
                });
            }

            if attempt < limit && should_retry(attempt, outcome.status, self.config.max_retries) {
                let delay = backoff_delay(&self.config.backoff, attempt, &mut rand::thread_rng());
                tracing::debug!(
                    attempt,
                    status = ?outcome.status,
                    sleep_secs = delay.as_secs(),
                    error = %outcome.error_text(),
                    "sleeping after HTTP error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            tracing::warn!(
                attempts = attempt + 1,
                status = ?outcome.status,
                url = %prepared.url,
                "giving up on request"
            );
            return Err(fatal(spec, prepared, outcome, attempt + 1));
        }
    }
}

fn fatal(spec: &RequestSpec, prepared: &PreparedRequest, outcome: AttemptOutcome, attempts: u32) -> RestError {
    let detail = outcome.error_text();
    match outcome.status {
        Some(status) => RestError::Server {
            url: prepared.url.clone(),
            data: spec.body.clone(),
            status,
            detail,
            attempts,
        },
        None => RestError::Transport {
            url: prepared.url.clone(),
            data: spec.body.clone(),
            detail,
            attempts,
        },
    }
}
