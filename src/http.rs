use std::{future::Future, pin::Pin, time::Duration};

use reqwest::{
    header::{HeaderMap, RETRY_AFTER},
    StatusCode,
};
use tokio_util::sync::CancellationToken;

use crate::{
    errors::{Error, RetryMetadata, StatusError, TransportError},
    request::ApiRequest,
};

/// Boxed future returned by [`Transport`] implementations.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Executes one HTTP exchange. Implementations never retry.
pub trait Transport: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> BoxFuture<'a, Result<ApiResponse, TransportError>>;
}

/// Per-call options: cancellation, deadline and retry override.
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    pub cancel: Option<CancellationToken>,
    pub deadline: Option<tokio::time::Instant>,
    pub timeout: Option<Duration>,
    pub retry: Option<RetryConfig>,
}

impl CallOptions {
    /// Abort the call as soon as `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Abort the call once `deadline` passes.
    pub fn with_deadline(mut self, deadline: tokio::time::Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Bound the whole call, retries included, to `timeout` from its start.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the retry policy for this call.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Disable retries for this call.
    pub fn disable_retry(mut self) -> Self {
        self.retry = Some(RetryConfig::disabled());
        self
    }

    /// Earliest of the explicit deadline and `start + timeout`. A timeout too
    /// large to represent as an instant imposes no deadline.
    pub(crate) fn effective_deadline(
        &self,
        start: tokio::time::Instant,
    ) -> Option<tokio::time::Instant> {
        let relative = self.timeout.and_then(|timeout| start.checked_add(timeout));
        match (self.deadline, relative) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Retry/backoff configuration (defaults use 3 attempts + jittered exponential backoff).
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryConfig {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Whether the given status code should trigger a retry.
    pub fn should_retry_status(&self, status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    /// Whether the given transport error should trigger a retry.
    pub fn should_retry_error(&self, err: &TransportError) -> bool {
        err.is_transient()
    }

    /// Jittered exponential backoff for the given attempt (1-indexed).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = if attempt == 0 {
            0
        } else {
            (attempt - 1).min(10)
        };
        let base = self.base_backoff.saturating_mul(2u32.saturating_pow(exp));
        let capped = std::cmp::min(base, self.max_backoff);
        let jitter = 0.5 + fastrand::f64(); // 0.5x .. 1.5x
        let seconds = (capped.as_secs_f64() * jitter).min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(seconds)
    }

    /// Delay before the next attempt, honouring a server `Retry-After` hint.
    pub(crate) fn delay_after_status(&self, attempt: u32, headers: &HeaderMap) -> Duration {
        match retry_after(headers) {
            Some(hint) => hint.min(self.max_backoff),
            None => self.backoff_delay(attempt),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(300),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// A fully-read HTTP response. The connection has been released by the time
/// this value exists.
#[derive(Clone, Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// Set by the retry layer when more than one attempt was made.
    pub retries: Option<RetryMetadata>,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            retries: None,
        }
    }

    /// Status code plus its canonical reason phrase, e.g. `401 Unauthorized`.
    /// Codes with no registered reason render as the bare number. The
    /// server's own reason phrase is not preserved.
    pub fn status_line(&self) -> String {
        match self.status.canonical_reason() {
            Some(reason) => format!("{} {}", self.status.as_u16(), reason),
            None => self.status.as_u16().to_string(),
        }
    }

    pub(crate) fn into_status_error(self) -> StatusError {
        let status_line = self.status_line();
        let body = String::from_utf8_lossy(&self.body).into_owned();
        StatusError {
            status: self.status.as_u16(),
            status_line,
            raw_body: (!body.trim().is_empty()).then_some(body),
            retries: self.retries,
        }
    }
}

fn client_build_error(err: reqwest::Error) -> Error {
    Error::Config(format!("failed to build http client: {err}"))
}

/// [`Transport`] over a pooled `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTransport {
    pub fn new(http: reqwest::Client, request_timeout: Duration) -> Self {
        Self {
            http,
            request_timeout,
        }
    }

    /// Build a pooled client with the given connect timeout. A builder failure
    /// is a configuration problem and is never retried.
    pub fn build_client(
        connect_timeout: Duration,
        insecure_skip_verify: bool,
    ) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder().connect_timeout(connect_timeout);
        if insecure_skip_verify {
            #[cfg(feature = "tracing")]
            tracing::warn!("TLS certificate verification is disabled");
            builder = builder.danger_accept_invalid_certs(true);
        }
        builder.build().map_err(client_build_error)
    }

    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut builder = self
            .http
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone())
            .timeout(self.request_timeout);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.bytes().await?;
        Ok(ApiResponse {
            status,
            headers,
            body: body.to_vec(),
            retries: None,
        })
    }
}

impl Transport for HttpTransport {
    fn execute<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> BoxFuture<'a, Result<ApiResponse, TransportError>> {
        Box::pin(self.send(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn backoff_respects_max_and_jitter() {
        let retry = RetryConfig {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(1),
        };

        let delay = retry.backoff_delay(5);
        assert!(delay <= Duration::from_secs(1));
        assert!(delay >= Duration::from_millis(250));
    }

    #[test]
    fn first_backoff_stays_near_base() {
        let retry = RetryConfig {
            max_attempts: 3,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        };
        for _ in 0..20 {
            let delay = retry.backoff_delay(1);
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(150));
        }
    }

    #[test]
    fn retryable_statuses() {
        let retry = RetryConfig::default();
        assert!(retry.should_retry_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(retry.should_retry_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(retry.should_retry_status(StatusCode::BAD_GATEWAY));
        assert!(!retry.should_retry_status(StatusCode::UNAUTHORIZED));
        assert!(!retry.should_retry_status(StatusCode::FORBIDDEN));
        assert!(!retry.should_retry_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn retry_after_hint_is_capped() {
        let retry = RetryConfig {
            max_attempts: 3,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(2),
        };
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("1"));
        assert_eq!(retry.delay_after_status(1, &headers), Duration::from_secs(1));

        headers.insert(RETRY_AFTER, HeaderValue::from_static("120"));
        assert_eq!(retry.delay_after_status(1, &headers), Duration::from_secs(2));

        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert!(retry.delay_after_status(1, &headers) <= Duration::from_millis(15));
    }

    #[test]
    fn call_options_disable_retry_sets_single_attempt() {
        let opts = CallOptions::default().disable_retry();
        assert_eq!(opts.retry.unwrap().max_attempts, 1);
    }

    #[test]
    fn effective_deadline_takes_earliest() {
        let start = tokio::time::Instant::now();
        let explicit = start + Duration::from_secs(10);
        let opts = CallOptions::default()
            .with_deadline(explicit)
            .with_timeout(Duration::from_secs(1));
        assert_eq!(
            opts.effective_deadline(start),
            Some(start + Duration::from_secs(1))
        );
        assert_eq!(CallOptions::default().effective_deadline(start), None);
    }

    #[test]
    fn unrepresentable_timeout_means_no_deadline() {
        let start = tokio::time::Instant::now();
        let unbounded = CallOptions::default().with_timeout(Duration::MAX);
        assert_eq!(unbounded.effective_deadline(start), None);

        let explicit = start + Duration::from_secs(30);
        let opts = unbounded.with_deadline(explicit);
        assert_eq!(opts.effective_deadline(start), Some(explicit));
    }

    #[test]
    fn status_line_and_error_body() {
        let resp = ApiResponse::new(StatusCode::UNAUTHORIZED, "{\"Error\":\"bad token\"}");
        assert_eq!(resp.status_line(), "401 Unauthorized");
        let err = resp.into_status_error();
        assert_eq!(err.status, 401);
        assert_eq!(err.raw_body.as_deref(), Some("{\"Error\":\"bad token\"}"));

        let empty = ApiResponse::new(StatusCode::FORBIDDEN, Vec::new()).into_status_error();
        assert_eq!(empty.raw_body, None);
    }

    #[test]
    fn status_line_uses_canonical_reason_or_bare_code() {
        let unregistered = StatusCode::from_u16(599).unwrap();
        assert_eq!(ApiResponse::new(unregistered, Vec::new()).status_line(), "599");
        let err = ApiResponse::new(unregistered, Vec::new()).into_status_error();
        assert_eq!(err.status_line, "599");
        assert_eq!(err.to_string(), "unexpected status code: 599");

        let throttled = ApiResponse::new(StatusCode::TOO_MANY_REQUESTS, Vec::new());
        assert_eq!(throttled.status_line(), "429 Too Many Requests");
    }

    #[test]
    fn client_build_failure_is_a_config_error() {
        let builder_err = reqwest::Client::new()
            .get("not a url")
            .build()
            .expect_err("relative url");
        let err = client_build_error(builder_err);
        assert!(
            matches!(&err, Error::Config(msg) if msg.starts_with("failed to build http client")),
            "got {err:?}"
        );
        assert!(!err.is_cancelled());
        assert_eq!(err.retries(), None);
    }

    #[test]
    fn builds_client_with_and_without_verification() {
        assert!(HttpTransport::build_client(crate::DEFAULT_CONNECT_TIMEOUT, false).is_ok());
        assert!(HttpTransport::build_client(crate::DEFAULT_CONNECT_TIMEOUT, true).is_ok());
    }
}
