use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};

use crate::{
    client::{Client, Config},
    errors::{Error, Result},
    http::CallOptions,
    types::{IntrospectionResult, ItemUsageBatch, SignInAttemptBatch},
};

/// Synchronous client for callers without an async runtime.
///
/// Drives [`Client`] on a small private runtime, so a
/// [`CancellationToken`](crate::CancellationToken) cancelled from another
/// thread aborts an in-flight request. Safe to share across threads.
///
/// Must not be called or dropped from within an async context.
#[derive(Clone)]
pub struct BlockingClient {
    inner: Client,
    runtime: Arc<Runtime>,
}

impl BlockingClient {
    pub fn new(cfg: Config) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("eventsapi-blocking")
            .enable_all()
            .build()
            .map_err(|err| Error::Config(format!("failed to start runtime: {err}")))?;
        let inner = {
            let _guard = runtime.enter();
            Client::new(cfg)?
        };
        Ok(Self {
            inner,
            runtime: Arc::new(runtime),
        })
    }

    /// The async client this wraps.
    pub fn async_client(&self) -> &Client {
        &self.inner
    }

    pub fn introspect(&self, token: &str, options: CallOptions) -> Result<IntrospectionResult> {
        self.runtime
            .block_on(self.inner.introspect(token, options))
    }

    pub fn sign_in_attempts(
        &self,
        token: &str,
        cursor: impl AsRef<str>,
        options: CallOptions,
    ) -> Result<SignInAttemptBatch> {
        self.runtime
            .block_on(self.inner.sign_in_attempts(token, cursor, options))
    }

    pub fn item_usages(
        &self,
        token: &str,
        cursor: impl AsRef<str>,
        options: CallOptions,
    ) -> Result<ItemUsageBatch> {
        self.runtime
            .block_on(self.inner.item_usages(token, cursor, options))
    }
}
