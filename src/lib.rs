//! Pull-based Rust client for the audit events API.
//!
//! The API exposes two cursor-paginated event streams, sign-in attempts and
//! item usages, plus a token introspection endpoint. The tenant's endpoint
//! is read from the bearer token's claims, so one [`Client`] serves any
//! number of tokens.
//!
//! The client is stateless between calls. Callers own polling cadence and
//! cursor persistence: fetch with the last cursor while `has_more` is set,
//! then sleep until the next poll.
//!
//! ```no_run
//! # async fn run(token: &str) -> eventsapi::Result<()> {
//! use eventsapi::{CallOptions, Client, Config, Cursor};
//!
//! let client = Client::new(Config::default())?;
//! let mut cursor = Cursor::initial();
//! loop {
//!     let batch = client
//!         .item_usages(token, &cursor, CallOptions::default())
//!         .await?;
//!     for usage in &batch.items {
//!         println!("{} used item {}", usage.user.email, usage.item_uuid);
//!     }
//!     cursor = batch.cursor.clone();
//!     if batch.is_drained() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(clippy::result_large_err)]

/// Default User-Agent header value.
pub const DEFAULT_USER_AGENT: &str = concat!("eventsapi-rust/", env!("CARGO_PKG_VERSION"));

/// Default connection timeout (5 seconds).
pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Default per-attempt request timeout (60 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// Token introspection endpoint.
pub const INTROSPECT_PATH: &str = "/api/auth/introspect";

/// Sign-in attempt stream endpoint.
pub const SIGN_IN_ATTEMPTS_PATH: &str = "/api/v1/signinattempts";

/// Item usage stream endpoint.
pub const ITEM_USAGES_PATH: &str = "/api/v1/itemusages";

mod client;
pub mod credential;
mod errors;
mod http;
mod request;
mod retry;
mod types;

#[cfg(feature = "blocking")]
mod blocking;
#[cfg(feature = "testing")]
pub mod testing;

pub use client::{Client, Config};
pub use credential::{decode_claims, resolve_base_url, Audience, Claims};
pub use errors::{
    CredentialError, Error, Result, RetryMetadata, StatusError, TransportError,
    TransportErrorKind,
};
pub use http::{ApiResponse, BoxFuture, CallOptions, HttpTransport, RetryConfig, Transport};
pub use request::{ApiRequest, RequestBuilder};
pub use retry::RetryingTransport;
pub use types::{
    ClientInfo, Cursor, EventBatch, IntrospectionResult, ItemUsage, ItemUsageBatch,
    SignInAttempt, SignInAttemptBatch, SignInAttemptDetails, User, FEATURE_ITEM_USAGES,
    FEATURE_SIGN_IN_ATTEMPTS,
};

pub use tokio_util::sync::CancellationToken;

#[cfg(feature = "blocking")]
pub use blocking::BlockingClient;
