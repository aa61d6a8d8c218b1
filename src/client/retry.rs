//! Retry pipeline with linear backoff

use std::time::Duration;

use http::StatusCode;
use tracing::debug;

use crate::client::transport::Transport;
use crate::error::{AttemptErrors, OutboundError, Result, TransportError};
use crate::models::{HttpRequest, HttpResponse};

/// Wait before retry number `attempt` (1-based): 40ms per attempt.
pub fn backoff(attempt: u32) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(10 * ((attempt as u64) << 2))
}

/// Retry configuration for one client
#[derive(Clone)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Statuses that trigger another attempt
    pub retryable_status: fn(StatusCode) -> bool,
    pub backoff: fn(u32) -> Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            retryable_status: |status| status.is_server_error(),
            backoff,
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Dispatch `request`, retrying transient failures.
    ///
    /// Each attempt is bounded by `timeout`. Cancellation of the request's
    /// token aborts the in-flight attempt or pending wait and no further
    /// attempt is started. A retryable status that survives the whole budget
    /// is returned as a response.
    pub async fn execute(
        &self,
        transport: &dyn Transport,
        request: &HttpRequest,
        timeout: Duration,
    ) -> Result<HttpResponse> {
        let cancel = request.cancellation();
        let mut failures = AttemptErrors::new(request.method().clone(), request.url().as_str());

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let wait = (self.backoff)(attempt);
                debug!(attempt, wait_ms = wait.as_millis() as u64, "Backing off before retry");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(OutboundError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }

            if cancel.is_cancelled() {
                return Err(OutboundError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(OutboundError::Cancelled),
                outcome = tokio::time::timeout(timeout, transport.execute(request)) => outcome,
            };

            let last_attempt = attempt == self.max_retries;
            match outcome {
                Err(_) => failures.push(TransportError::Timeout),
                Ok(Err(e)) if !e.is_retryable() => {
                    failures.push(e);
                    return Err(failures.into());
                }
                Ok(Err(e)) => failures.push(e),
                Ok(Ok(response)) if (self.retryable_status)(response.status()) && !last_attempt => {
                    debug!(
                        attempt,
                        status = response.status().as_u16(),
                        "Retryable status received"
                    );
                }
                Ok(Ok(response)) => return Ok(response),
            }
        }

        Err(failures.into())
    }
}
