use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Retry metadata surfaced on transport/status errors when retries were attempted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryMetadata {
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// The bearer credential could not be turned into an API endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("credential is empty")]
    Empty,

    #[error("malformed credential: {0}")]
    Malformed(String),

    #[error("credential has no routing claim (expected an http(s) URL in `aud`)")]
    MissingRoutingClaim,
}

/// A non-200 response that was received in full.
///
/// Retryable statuses (429, 5xx) only reach this point once the retry budget
/// is spent, in which case `retries` records what happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusError {
    pub status: u16,
    /// Status code plus its canonical reason, e.g. `401 Unauthorized`, or the
    /// bare code when the status has no registered reason.
    pub status_line: String,
    /// Raw response body for debugging (when non-empty).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<RetryMetadata>,
}

impl StatusError {
    pub fn new(status: u16, status_line: impl Into<String>) -> Self {
        Self {
            status,
            status_line: status_line.into(),
            raw_body: None,
            retries: None,
        }
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unexpected status code: {}", self.status_line)?;
        if let Some(retries) = &self.retries {
            write!(f, " (after {} attempts)", retries.attempts)?;
        }
        Ok(())
    }
}

impl std::error::Error for StatusError {}

/// Convenience alias for fallible client results.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Transport-level error (timeouts, DNS/TLS/connectivity, cancellation).
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    #[source]
    pub source: Option<reqwest::Error>,
    pub retries: Option<RetryMetadata>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            retries: None,
        }
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Cancelled, message)
    }

    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            TransportErrorKind::Timeout | TransportErrorKind::Connect | TransportErrorKind::Request
        )
    }

    pub(crate) fn with_retries(mut self, retries: Option<RetryMetadata>) -> Self {
        if retries.is_some() {
            self.retries = retries;
        }
        self
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_body() || err.is_decode() {
            TransportErrorKind::Body
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };

        TransportError {
            kind,
            message: err.to_string(),
            source: Some(err),
            retries: None,
        }
    }
}

/// Broad transport error kinds for classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    Body,
    /// The caller cancelled the call or its deadline elapsed.
    Cancelled,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Body => "body",
            TransportErrorKind::Cancelled => "cancelled",
            TransportErrorKind::Other => "transport",
        };
        write!(f, "{label}")
    }
}

/// Unified error type surfaced by the client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Config(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{0}")]
    UnexpectedStatus(#[from] StatusError),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl Error {
    /// HTTP status code, when the server answered with a non-200 status.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::UnexpectedStatus(err) => Some(err.status),
            _ => None,
        }
    }

    /// Whether the call was aborted by caller cancellation or deadline.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::Transport(TransportError {
                kind: TransportErrorKind::Cancelled,
                ..
            })
        )
    }

    /// Retry metadata, when the transport made more than one attempt.
    pub fn retries(&self) -> Option<&RetryMetadata> {
        match self {
            Error::Transport(err) => err.retries.as_ref(),
            Error::UnexpectedStatus(err) => err.retries.as_ref(),
            _ => None,
        }
    }
}
