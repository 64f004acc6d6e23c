use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT},
    Method, Url,
};

use crate::{credential, errors::CredentialError, DEFAULT_USER_AGENT};

/// An authenticated request, owned so the retry layer can re-send it.
#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    /// Path as supplied by the caller, for logs.
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

/// Composes versioned, authenticated requests against the endpoint a
/// credential is routed to.
#[derive(Clone, Debug)]
pub struct RequestBuilder {
    user_agent: HeaderValue,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self {
            user_agent: HeaderValue::from_static(DEFAULT_USER_AGENT),
        }
    }
}

impl RequestBuilder {
    pub fn new(user_agent: HeaderValue) -> Self {
        Self { user_agent }
    }

    pub fn user_agent(&self) -> &HeaderValue {
        &self.user_agent
    }

    /// Build a request for `path` on the credential's base URL.
    ///
    /// `path` is appended verbatim; callers supply well-formed paths.
    pub fn build(
        &self,
        method: Method,
        credential: &str,
        path: &str,
        body: Option<&str>,
    ) -> Result<ApiRequest, CredentialError> {
        let token = credential::normalize(credential);
        let base = credential::resolve_base_url(token)?;
        let joined = format!("{}{}", base.as_str().trim_end_matches('/'), path);
        let url = Url::parse(&joined)
            .map_err(|err| CredentialError::Malformed(format!("invalid endpoint url: {err}")))?;

        let mut authorization = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            CredentialError::Malformed("credential contains invalid header characters".into())
        })?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(USER_AGENT, self.user_agent.clone());

        Ok(ApiRequest {
            method,
            url,
            path: path.to_string(),
            headers,
            body: body.map(str::to_string),
        })
    }
}
