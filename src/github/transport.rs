//! Outbound HTTP seam for every GitHub call.
//!
//! Credential handling, retries, and status interpretation live above this
//! layer. The transport only moves a request to GitHub and hands back the
//! status, headers, and body exactly as received, so callers can react to
//! `401`, `403`, and `404` themselves.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use url::Url;

use super::error::GitHubError;
use super::error_mapping::{map_http_error, map_transport_error};
use super::pagination::next_link;
use super::rate_limit::RateLimitInfo;

/// Media type requested unless a call overrides it.
pub const DEFAULT_ACCEPT: &str = "application/vnd.github+json";

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "butler";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Credential attached to an outbound request.
#[derive(Clone)]
pub enum Authorization {
    /// `Authorization: Bearer …`, used for app assertions and tenant tokens.
    Bearer(SecretString),
    /// `Authorization: token …`, used for the personal account.
    Token(SecretString),
}

impl Authorization {
    fn header_value(&self) -> String {
        match self {
            Self::Bearer(secret) => format!("Bearer {}", secret.expose_secret()),
            Self::Token(secret) => format!("token {}", secret.expose_secret()),
        }
    }
}

impl fmt::Debug for Authorization {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => formatter.write_str("Bearer([REDACTED])"),
            Self::Token(_) => formatter.write_str("Token([REDACTED])"),
        }
    }
}

/// A single request to the GitHub API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: Url,
    /// Credential, if the endpoint needs one.
    pub authorization: Option<Authorization>,
    /// JSON body for write operations.
    pub body: Option<serde_json::Value>,
    /// Media type for the `Accept` header.
    pub accept: String,
}

impl ApiRequest {
    /// Creates an unauthenticated request with the default media type.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            authorization: None,
            body: None,
            accept: DEFAULT_ACCEPT.to_owned(),
        }
    }

    /// Attaches a credential.
    #[must_use]
    pub fn with_authorization(mut self, authorization: Authorization) -> Self {
        self.authorization = Some(authorization);
        self
    }

    /// Attaches a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: Option<serde_json::Value>) -> Self {
        self.body = body;
        self
    }

    /// Short label used in logs and error messages, e.g. `GET /repos/o/r`.
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{} {}", self.method, self.url.path())
    }
}

/// Response returned by the transport, untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: String,
}

impl ApiResponse {
    /// Builds a response from its parts.
    #[must_use]
    pub const fn new(status: StatusCode, headers: HeaderMap, body: String) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns true for a 2xx status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Deserialises the body.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Decode`] when the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, GitHubError> {
        serde_json::from_str(&self.body).map_err(|error| GitHubError::Decode {
            message: error.to_string(),
        })
    }

    /// Converts a non-success response into an error for `operation`.
    ///
    /// # Errors
    ///
    /// Returns the mapped [`GitHubError`] for any non-2xx status.
    pub fn error_for_status(self, operation: &str) -> Result<Self, GitHubError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(map_http_error(operation, self.status, &self.body))
        }
    }

    /// Returns the `rel="next"` page, if any.
    #[must_use]
    pub fn next_link(&self) -> Option<Url> {
        next_link(&self.headers)
    }

    /// Returns the rate limit state reported with this response.
    #[must_use]
    pub fn rate_limit(&self) -> Option<RateLimitInfo> {
        RateLimitInfo::from_headers(&self.headers)
    }
}

/// Sends requests to GitHub.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Performs one HTTP exchange.
    ///
    /// Only failures to obtain a response are errors; every HTTP status is
    /// returned as a response.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, GitHubError>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Builds a transport with the standard headers and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] when the TLS backend cannot be
    /// initialised.
    pub fn new() -> Result<Self, GitHubError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| GitHubError::Configuration {
                message: format!("failed to build HTTP client: {error}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ApiTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, GitHubError> {
        let operation = request.describe();
        let mut builder = self
            .client
            .request(request.method, request.url)
            .header(http::header::ACCEPT, request.accept)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(authorization) = &request.authorization {
            builder = builder.header(http::header::AUTHORIZATION, authorization.header_value());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| map_transport_error(&operation, &error))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|error| map_transport_error(&operation, &error))?;

        tracing::debug!("{operation} -> {status}");
        Ok(ApiResponse::new(status, headers, body))
    }
}

#[cfg(test)]
mod tests {
    use http::{HeaderMap, Method, StatusCode};
    use rstest::rstest;
    use secrecy::SecretString;
    use url::Url;

    use super::{ApiRequest, ApiResponse, Authorization};
    use crate::github::GitHubError;

    #[rstest]
    fn debug_output_redacts_credentials() {
        let url = Url::parse("https://api.github.com/app").expect("url should parse");
        let request = ApiRequest::new(Method::GET, url).with_authorization(Authorization::Bearer(
            SecretString::from("ghs_secret_value".to_owned()),
        ));

        let rendered = format!("{request:?}");

        assert!(!rendered.contains("ghs_secret_value"), "leaked: {rendered}");
        assert!(rendered.contains("REDACTED"), "missing marker: {rendered}");
    }

    #[rstest]
    fn error_for_status_keeps_success() {
        let response = ApiResponse::new(StatusCode::CREATED, HeaderMap::new(), "{}".to_owned());

        let result = response.clone().error_for_status("create issue");

        assert_eq!(result, Ok(response));
    }

    #[rstest]
    fn json_reports_decode_errors() {
        let response = ApiResponse::new(StatusCode::OK, HeaderMap::new(), "not json".to_owned());

        let result = response.json::<serde_json::Value>();

        assert!(
            matches!(result, Err(GitHubError::Decode { .. })),
            "expected Decode, got {result:?}"
        );
    }
}
