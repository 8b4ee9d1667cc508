//! Mutual-TLS REST transport and retry controller for Gridlink.

pub mod error;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;

pub use error::RestError;
pub use request::{headers, normalize_host, quote_path, Payload, PreparedRequest, RequestSpec, Verb};
pub use response::{RestResponse, PLACEHOLDER_REASON};
pub use retry::{backoff_delay, is_retryable_status, retry_limit, should_retry, RetryingClient, RETRYABLE_STATUSES};
pub use transport::{
    load_ca_certificates, AttemptOutcome, ReqwestTransport, Transport, TransportConfig,
    TransportConfigBuilder,
};
