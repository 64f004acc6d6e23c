use std::{sync::Arc, time::Duration};

use reqwest::{header::HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::{
    errors::{Error, Result},
    http::{CallOptions, HttpTransport, RetryConfig, Transport},
    request::RequestBuilder,
    retry::RetryingTransport,
    types::{IntrospectionResult, ItemUsageBatch, SignInAttemptBatch},
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT, INTROSPECT_PATH,
    ITEM_USAGES_PATH, SIGN_IN_ATTEMPTS_PATH,
};

#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Override the User-Agent header (defaults to `eventsapi-rust/<version>`).
    pub user_agent: Option<String>,
    pub http_client: Option<reqwest::Client>,
    /// Override the connect timeout (defaults to 5s).
    pub connect_timeout: Option<Duration>,
    /// Override the per-attempt request timeout (defaults to 60s).
    pub timeout: Option<Duration>,
    /// Retry/backoff policy (defaults to 3 attempts, exponential backoff + jitter).
    pub retry: Option<RetryConfig>,
    /// Accept any TLS certificate. Ignored when `http_client` is supplied.
    pub insecure_skip_verify: bool,
}

/// Client for the events API.
///
/// Cheap to clone; clones share one connection pool. Holds no per-stream
/// state, so calls may be issued concurrently.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    requests: RequestBuilder,
    transport: RetryingTransport,
    http: Option<reqwest::Client>,
}

impl Client {
    pub fn new(cfg: Config) -> Result<Self> {
        let connect_timeout = cfg.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let request_timeout = cfg.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);

        let http = match cfg.http_client.clone() {
            Some(client) => client,
            None => HttpTransport::build_client(connect_timeout, cfg.insecure_skip_verify)?,
        };
        let transport = HttpTransport::new(http.clone(), request_timeout);
        Self::assemble(cfg, Arc::new(transport), Some(http))
    }

    /// Build a client over a custom [`Transport`], e.g. a recording fake.
    pub fn with_transport(cfg: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        Self::assemble(cfg, transport, None)
    }

    fn assemble(
        cfg: Config,
        transport: Arc<dyn Transport>,
        http: Option<reqwest::Client>,
    ) -> Result<Self> {
        let user_agent = match cfg.user_agent.as_deref().map(str::trim) {
            Some(agent) if !agent.is_empty() => HeaderValue::from_str(agent)
                .map_err(|err| Error::Config(format!("invalid user agent: {err}")))?,
            _ => HeaderValue::from_static(DEFAULT_USER_AGENT),
        };

        Ok(Self {
            inner: Arc::new(ClientInner {
                requests: RequestBuilder::new(user_agent),
                transport: RetryingTransport::new(transport, cfg.retry.unwrap_or_default()),
                http,
            }),
        })
    }

    /// Underlying pooled HTTP client, absent for custom transports.
    pub fn http_client(&self) -> Option<&reqwest::Client> {
        self.inner.http.as_ref()
    }

    /// Metadata about `token`: issue time and enabled features.
    pub async fn introspect(
        &self,
        token: &str,
        options: CallOptions,
    ) -> Result<IntrospectionResult> {
        self.inner
            .execute_json(Method::GET, token, INTROSPECT_PATH, None, &options)
            .await
    }

    /// Fetch the next page of sign-in attempts after `cursor`.
    pub async fn sign_in_attempts(
        &self,
        token: &str,
        cursor: impl AsRef<str>,
        options: CallOptions,
    ) -> Result<SignInAttemptBatch> {
        self.inner
            .execute_json(
                Method::POST,
                token,
                SIGN_IN_ATTEMPTS_PATH,
                Some(cursor.as_ref()),
                &options,
            )
            .await
    }

    /// Fetch the next page of item usages after `cursor`.
    pub async fn item_usages(
        &self,
        token: &str,
        cursor: impl AsRef<str>,
        options: CallOptions,
    ) -> Result<ItemUsageBatch> {
        self.inner
            .execute_json(
                Method::POST,
                token,
                ITEM_USAGES_PATH,
                Some(cursor.as_ref()),
                &options,
            )
            .await
    }
}

impl ClientInner {
    async fn execute_json<T: DeserializeOwned>(
        &self,
        method: Method,
        token: &str,
        path: &str,
        body: Option<&str>,
        options: &CallOptions,
    ) -> Result<T> {
        let request = self.requests.build(method, token, path, body)?;
        let resp = self.transport.execute(&request, options).await?;
        if resp.status != StatusCode::OK {
            return Err(resp.into_status_error().into());
        }
        let parsed = serde_json::from_slice::<T>(&resp.body).map_err(Error::Decode)?;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use reqwest::header::{AUTHORIZATION, USER_AGENT};
    use serde_json::json;

    use super::*;
    use crate::{
        errors::CredentialError,
        http::{ApiResponse, BoxFuture},
        request::ApiRequest,
        TransportError,
    };

    /// Records requests and answers every call with the same response.
    struct Recorder {
        status: StatusCode,
        body: String,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl Recorder {
        fn new(status: u16, body: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                status: StatusCode::from_u16(status).unwrap(),
                body: body.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn raw(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                status: StatusCode::from_u16(status).unwrap(),
                body: body.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<ApiRequest> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl Transport for Recorder {
        fn execute<'a>(
            &'a self,
            request: &'a ApiRequest,
        ) -> BoxFuture<'a, std::result::Result<ApiResponse, TransportError>> {
            self.seen.lock().unwrap().push(request.clone());
            let resp = ApiResponse::new(self.status, self.body.clone());
            Box::pin(async move { Ok(resp) })
        }
    }

    fn token() -> String {
        let claims = json!({ "aud": ["com.example.streamingservice", "https://example.1password.com"] });
        format!(
            "eyJhbGciOiJub25lIn0.{}.sig",
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    fn client(recorder: &Arc<Recorder>) -> Client {
        Client::with_transport(
            Config {
                retry: Some(RetryConfig::disabled()),
                ..Default::default()
            },
            recorder.clone(),
        )
        .expect("client")
    }

    fn empty_batch() -> serde_json::Value {
        json!({ "cursor": "next", "has_more": false, "items": [] })
    }

    #[tokio::test]
    async fn sign_in_attempts_posts_cursor_verbatim() {
        let recorder = Recorder::new(200, empty_batch());
        let batch = client(&recorder)
            .sign_in_attempts(&token(), "cursor-1", CallOptions::default())
            .await
            .expect("batch");
        assert_eq!(batch.cursor.as_str(), "next");

        let seen = recorder.requests();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::POST);
        assert_eq!(
            seen[0].url.as_str(),
            "https://example.1password.com/api/v1/signinattempts"
        );
        assert_eq!(seen[0].body.as_deref(), Some("cursor-1"));
        assert!(seen[0].headers.contains_key(AUTHORIZATION));
        assert_eq!(seen[0].headers[USER_AGENT], DEFAULT_USER_AGENT);
    }

    #[tokio::test]
    async fn introspect_is_a_bodiless_get() {
        let recorder = Recorder::new(
            200,
            json!({ "UUID": "u", "IssuedAt": "2021-06-09T17:18:34Z", "Features": ["itemusages"] }),
        );
        let result = client(&recorder)
            .introspect(&token(), CallOptions::default())
            .await
            .expect("introspect");
        assert!(result.can_read_item_usages());
        let seen = recorder.requests();
        assert_eq!(seen[0].method, Method::GET);
        assert_eq!(seen[0].path, INTROSPECT_PATH);
        assert!(seen[0].body.is_none());
    }

    #[tokio::test]
    async fn same_cursor_yields_identical_batches() {
        let recorder = Recorder::new(200, empty_batch());
        let client = client(&recorder);
        let first = client
            .item_usages(&token(), "c", CallOptions::default())
            .await
            .unwrap();
        let second = client
            .item_usages(&token(), "c", CallOptions::default())
            .await
            .unwrap();
        assert_eq!(first, second);
        let seen = recorder.requests();
        assert_eq!(seen[0].body, seen[1].body);
        assert_eq!(seen[0].url, seen[1].url);
    }

    #[tokio::test]
    async fn non_ok_statuses_become_unexpected_status() {
        for code in [201, 204, 401, 403, 500] {
            let recorder = Recorder::raw(code, "nope");
            let err = client(&recorder)
                .item_usages(&token(), "", CallOptions::default())
                .await
                .expect_err("non-200");
            assert_eq!(err.status(), Some(code));
        }
    }

    #[tokio::test]
    async fn undecodable_body_is_a_decode_error() {
        let recorder = Recorder::raw(200, "<html>maintenance</html>");
        let err = client(&recorder)
            .sign_in_attempts(&token(), "", CallOptions::default())
            .await
            .expect_err("decode");
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn credential_errors_skip_the_transport() {
        let recorder = Recorder::new(200, empty_batch());
        let err = client(&recorder)
            .sign_in_attempts("garbage", "", CallOptions::default())
            .await
            .expect_err("credential");
        assert!(matches!(
            err,
            Error::Credential(CredentialError::Malformed(_))
        ));
        assert!(recorder.requests().is_empty());
    }

    #[test]
    fn rejects_invalid_user_agent() {
        let recorder = Recorder::new(200, empty_batch());
        let result = Client::with_transport(
            Config {
                user_agent: Some("bad\nagent".into()),
                ..Default::default()
            },
            recorder,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn builds_default_http_client() {
        let client = Client::new(Config {
            insecure_skip_verify: true,
            ..Default::default()
        })
        .expect("client");
        assert!(client.http_client().is_some());
    }

    #[test]
    fn supplied_http_client_is_kept_with_insecure_flag() {
        let supplied = reqwest::Client::builder().build().expect("http client");
        let client = Client::new(Config {
            http_client: Some(supplied),
            insecure_skip_verify: true,
            ..Default::default()
        })
        .expect("client");
        assert!(client.http_client().is_some());
    }
}
