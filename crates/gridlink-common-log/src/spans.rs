//! Request and credential tracing spans.

use std::future::Future;
use tracing::{info_span, Instrument, Span};

/// Span covering one logical REST request and all of its attempts.
pub fn request_span(verb: &str, url: &str) -> Span {
    info_span!("rest_request", verb = %verb, url = %url, attempts = tracing::field::Empty)
}

/// Span covering a credential operation (`proxy`, `delegation`).
pub fn credential_span(operation: &str) -> Span {
    info_span!("credential", op = %operation, error = tracing::field::Empty)
}

/// Instrument a future with a span.
pub fn instrument_future<F: Future>(future: F, span: Span) -> impl Future<Output = F::Output> {
    future.instrument(span)
}

/// Record an error on the current span.
pub fn record_error(error: &dyn std::error::Error) {
    Span::current().record("error", tracing::field::display(error));
}

/// Timing utility for operations.
pub struct Timer {
    start: std::time::Instant,
    operation: &'static str,
}

impl Timer {
    /// Start a new timer.
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: std::time::Instant::now(),
            operation,
        }
    }

    /// Complete the timer and record duration.
    pub fn finish(self) -> std::time::Duration {
        let duration = self.start.elapsed();
        tracing::debug!(
            operation = %self.operation,
            duration_ms = %duration.as_millis(),
            "operation completed"
        );
        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::EnvFilter;

    fn with_subscriber<F>(f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let subscriber = tracing_subscriber::fmt()
            .with_test_writer()
            .with_env_filter(EnvFilter::new("trace"))
            .finish();

        tracing::subscriber::with_default(subscriber, f);
    }

    #[test]
    fn test_request_span_records_attempts() {
        with_subscriber(|| {
            let span = request_span("GET", "https://cmsweb.cern.ch:8443/crabserver/prod/task");
            let _guard = span.enter();
            span.record("attempts", 3);
            tracing::info!("request finished");
        });
    }

    #[test]
    fn test_nested_credential_span() {
        with_subscriber(|| {
            let outer = credential_span("proxy");
            let _g1 = outer.enter();
            let inner = credential_span("delegation");
            let _g2 = inner.enter();

            let error = std::io::Error::new(std::io::ErrorKind::NotFound, "voms-proxy-info missing");
            record_error(&error);
        });
    }

    #[tokio::test]
    async fn test_context_propagation_across_async() {
        let span = request_span("POST", "https://localhost/crabserver/prod/workflow");
        let value = instrument_future(
            async {
                tracing::info!("inside request");
                instrument_future(async { 7 }, credential_span("proxy")).await
            },
            span,
        )
        .await;
        assert_eq!(value, 7);
    }

    #[test]
    fn test_timer_reports_elapsed() {
        let timer = Timer::start("test_operation");
        std::thread::sleep(std::time::Duration::from_millis(10));
        let elapsed = timer.finish();
        assert!(elapsed >= std::time::Duration::from_millis(10));
    }
}
