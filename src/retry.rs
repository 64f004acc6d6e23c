//! Retry decorator over a [`Transport`].
//!
//! Retries connect/timeout/request failures and 429/5xx responses with
//! jittered exponential backoff. Attempts are sequential. The whole loop,
//! in-flight request and backoff sleeps included, races the caller's
//! cancellation token and deadline.

use std::sync::Arc;

use reqwest::StatusCode;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
#[cfg(feature = "tracing")]
use tracing::Instrument;

use crate::{
    errors::{RetryMetadata, TransportError, TransportErrorKind},
    http::{ApiResponse, CallOptions, RetryConfig, Transport},
    request::ApiRequest,
};

#[derive(Clone)]
pub struct RetryingTransport {
    inner: Arc<dyn Transport>,
    policy: RetryConfig,
}

impl RetryingTransport {
    pub fn new(inner: Arc<dyn Transport>, policy: RetryConfig) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryConfig {
        &self.policy
    }

    /// Execute `request`, retrying transient failures.
    ///
    /// Returns the final response whatever its status once retries are
    /// exhausted or the status is not retryable. Errors are transport
    /// failures, including `Cancelled` when `options` trips first.
    pub async fn execute(
        &self,
        request: &ApiRequest,
        options: &CallOptions,
    ) -> Result<ApiResponse, TransportError> {
        let policy = options.retry.as_ref().unwrap_or(&self.policy);
        let deadline = options.effective_deadline(Instant::now());
        let mut state = RetryState::new();

        let outcome = {
            let attempts = self.attempt_loop(request, policy, &mut state);
            tokio::select! {
                biased;
                _ = cancelled(options.cancel.as_ref()) => {
                    Err(TransportError::cancelled("call cancelled by caller"))
                }
                _ = expired(deadline) => {
                    Err(TransportError::cancelled("call deadline elapsed"))
                }
                result = attempts => result,
            }
        };

        #[cfg(feature = "tracing")]
        if let Err(err) = &outcome {
            if err.kind == TransportErrorKind::Cancelled {
                tracing::debug!(path = %request.path, attempts = state.attempts, "request aborted: {}", err.message);
            }
        }

        outcome.map_err(|err| err.with_retries(state.metadata()))
    }

    async fn attempt_loop(
        &self,
        request: &ApiRequest,
        policy: &RetryConfig,
        state: &mut RetryState,
    ) -> Result<ApiResponse, TransportError> {
        let max_attempts = policy.max_attempts.max(1);
        #[cfg(feature = "tracing")]
        let start = Instant::now();

        for attempt in 1..=max_attempts {
            state.record_attempt(attempt);
            let send = self.inner.execute(request);
            #[cfg(feature = "tracing")]
            let send = send.instrument(tracing::debug_span!(
                "eventsapi.http",
                method = %request.method,
                path = %request.path,
                attempt,
                max_attempts
            ));

            match send.await {
                Ok(mut resp) => {
                    let status = resp.status;
                    if status != StatusCode::OK {
                        state.record_status(status);
                    }
                    if policy.should_retry_status(status) && attempt < max_attempts {
                        let delay = policy.delay_after_status(attempt, &resp.headers);
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            status = %status,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "retryable status; backing off"
                        );
                        sleep(delay).await;
                        continue;
                    }

                    #[cfg(feature = "tracing")]
                    if status.is_success() {
                        tracing::debug!(
                            status = %status,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "request completed"
                        );
                    } else {
                        tracing::warn!(status = %status, attempt, "request failed; returning status");
                    }
                    resp.retries = state.metadata();
                    return Ok(resp);
                }
                Err(err) => {
                    state.record_error(&err);
                    if policy.should_retry_error(&err) && attempt < max_attempts {
                        let delay = policy.backoff_delay(attempt);
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            attempt,
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "transport error; backing off"
                        );
                        sleep(delay).await;
                        continue;
                    }

                    #[cfg(feature = "tracing")]
                    tracing::warn!(attempt, error = %err, "transport error");
                    return Err(err);
                }
            }
        }

        Err(TransportError::new(
            TransportErrorKind::Other,
            "request failed",
        ))
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn expired(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[derive(Default)]
pub(crate) struct RetryState {
    attempts: u32,
    last_status: Option<u16>,
    last_error: Option<String>,
}

impl RetryState {
    fn new() -> Self {
        Self::default()
    }

    fn record_attempt(&mut self, attempt: u32) {
        self.attempts = attempt;
    }

    fn record_status(&mut self, status: StatusCode) {
        self.last_status = Some(status.as_u16());
    }

    fn record_error(&mut self, err: &TransportError) {
        self.last_error = Some(err.to_string());
    }

    fn metadata(&self) -> Option<RetryMetadata> {
        if self.attempts <= 1 {
            None
        } else {
            Some(RetryMetadata {
                attempts: self.attempts,
                last_status: self.last_status,
                last_error: self.last_error.clone(),
            })
        }
    }
}
