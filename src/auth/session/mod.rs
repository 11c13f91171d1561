//! Per-installation authenticated sessions.
//!
//! A [`TenantSession`] owns the single cached token of one installation. The
//! token is fetched lazily, regenerated when it is within a minute of expiry,
//! and regenerated exactly once more when GitHub answers `401`. A second
//! consecutive `401` is returned as [`GitHubError::Authentication`].

use std::fmt;
use std::sync::Arc;

use http::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use url::Url;

use super::issuer::CredentialIssuer;
use super::token::TenantToken;
use crate::github::error_mapping::{is_auth_failure, map_http_error};
use crate::github::pagination::MAX_PAGES;
use crate::github::{
    ApiBase, ApiRequest, ApiResponse, Authorization, GitHubError, InstallationId,
};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

/// Long-lived credential of a human-owned helper account.
///
/// GitHub does not let apps open pull requests from forks they create, so
/// forking and cross-fork pull requests go through this account.
#[derive(Clone)]
pub struct PersonalAccount {
    login: String,
    token: SecretString,
}

impl PersonalAccount {
    /// Wraps the account login and its token.
    #[must_use]
    pub const fn new(login: String, token: SecretString) -> Self {
        Self { login, token }
    }

    /// Account login.
    #[must_use]
    pub const fn login(&self) -> &str {
        self.login.as_str()
    }

    /// Account token.
    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }
}

impl fmt::Debug for PersonalAccount {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PersonalAccount")
            .field("login", &self.login)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Authenticated access to one installation's repositories.
pub struct TenantSession {
    installation: InstallationId,
    issuer: Arc<CredentialIssuer>,
    personal: Option<PersonalAccount>,
    telemetry: Arc<dyn TelemetrySink>,
    token: Mutex<Option<TenantToken>>,
}

impl TenantSession {
    /// Binds a session to `installation`. No network call is made.
    #[must_use]
    pub fn new(
        installation: InstallationId,
        issuer: Arc<CredentialIssuer>,
        personal: Option<PersonalAccount>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            installation,
            issuer,
            personal,
            telemetry,
            token: Mutex::new(None),
        }
    }

    /// Installation this session acts for.
    #[must_use]
    pub const fn installation(&self) -> InstallationId {
        self.installation
    }

    /// API root used to build endpoint URLs.
    #[must_use]
    pub fn api_base(&self) -> &ApiBase {
        self.issuer.api_base()
    }

    /// The personal account, when one is configured.
    #[must_use]
    pub const fn personal_account(&self) -> Option<&PersonalAccount> {
        self.personal.as_ref()
    }

    /// Returns a valid token, issuing a new one when none is cached or the
    /// cached one is within the refresh margin.
    ///
    /// # Errors
    ///
    /// Propagates credential errors from the issuer.
    pub async fn token(&self) -> Result<SecretString, GitHubError> {
        let mut cached = self.token.lock().await;
        let now = self.issuer.clock().now();
        if let Some(token) = cached.as_ref()
            && !token.needs_refresh(now)
        {
            return Ok(token.secret().clone());
        }

        tracing::debug!("issuing token for installation {}", self.installation);
        let fresh = self.issuer.issue_token(self.installation).await?;
        let secret = fresh.secret().clone();
        *cached = Some(fresh);
        Ok(secret)
    }

    /// Drops the cached token if it is still the one that was rejected.
    ///
    /// Comparing against the rejected secret keeps a concurrent caller that
    /// already regenerated from being forced into a second exchange.
    async fn invalidate(&self, rejected: &SecretString) {
        let mut cached = self.token.lock().await;
        let is_rejected = cached
            .as_ref()
            .is_some_and(|token| token.secret().expose_secret() == rejected.expose_secret());
        if is_rejected {
            *cached = None;
        }
    }

    /// Sends one request with the installation token attached.
    ///
    /// A `401` invalidates the token, regenerates it once, and retries once.
    /// Every other status is returned to the caller unchanged.
    ///
    /// # Errors
    ///
    /// Returns credential errors, transport failures, and
    /// [`GitHubError::Authentication`] when the retry is rejected as well.
    pub async fn authenticated_call(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<ApiResponse, GitHubError> {
        let request = ApiRequest::new(method, url).with_body(body);

        let first_token = self.token().await?;
        let first = self.send_with(&request, &first_token).await?;
        if !is_auth_failure(first.status) {
            return Ok(first);
        }

        tracing::info!(
            "installation {} token rejected by {}; regenerating once",
            self.installation,
            request.describe()
        );
        self.invalidate(&first_token).await;
        let retry_token = self.token().await?;
        let retry = self.send_with(&request, &retry_token).await?;
        if is_auth_failure(retry.status) {
            return Err(map_http_error(&request.describe(), retry.status, &retry.body));
        }
        Ok(retry)
    }

    async fn send_with(
        &self,
        request: &ApiRequest,
        token: &SecretString,
    ) -> Result<ApiResponse, GitHubError> {
        let attempt = request
            .clone()
            .with_authorization(Authorization::Bearer(token.clone()));
        let response = self.issuer.transport().send(attempt).await?;
        self.observe_rate_limit(&response);
        Ok(response)
    }

    fn observe_rate_limit(&self, response: &ApiResponse) {
        let Some(rate) = response.rate_limit() else {
            return;
        };
        if rate.is_exhausted() {
            tracing::warn!(
                "installation {} exhausted its rate limit; resets in {}s",
                self.installation,
                rate.seconds_until_reset()
            );
        }
        self.telemetry.record(TelemetryEvent::RateLimitObserved {
            installation_id: self.installation.get(),
            limit: rate.limit(),
            remaining: rate.remaining(),
        });
    }

    /// Sends a request and fails on any non-success status.
    ///
    /// # Errors
    ///
    /// Returns errors from [`Self::authenticated_call`] and the mapped error
    /// for non-2xx statuses.
    pub async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<ApiResponse, GitHubError> {
        let operation = format!("{method} {}", url.path());
        self.authenticated_call(method, url, body)
            .await?
            .error_for_status(&operation)
    }

    /// Fetches and deserialises a single resource.
    ///
    /// # Errors
    ///
    /// Returns errors from [`Self::send`] and decode failures.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, GitHubError> {
        self.send(Method::GET, url, None).await?.json()
    }

    /// Sends a write request and deserialises the created or updated resource.
    ///
    /// # Errors
    ///
    /// Returns errors from [`Self::send`] and decode failures.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: serde_json::Value,
    ) -> Result<T, GitHubError> {
        self.send(method, url, Some(body)).await?.json()
    }

    /// Collects a paginated collection, following `next` links.
    ///
    /// `unwrap_page` extracts the items from one page, which lets the same
    /// loop serve plain arrays and wrapped pages such as
    /// `{"repositories": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns the first error from any page.
    pub async fn paginate<P, T, F>(&self, url: Url, mut unwrap_page: F) -> Result<Vec<T>, GitHubError>
    where
        P: DeserializeOwned,
        F: FnMut(P) -> Vec<T> + Send,
    {
        let mut items = Vec::new();
        let mut next = Some(url);
        let mut pages = 0;

        while let Some(page_url) = next.take() {
            let response = self.send(Method::GET, page_url, None).await?;
            items.extend(unwrap_page(response.json::<P>()?));

            pages += 1;
            if pages >= MAX_PAGES {
                tracing::warn!("pagination stopped after {MAX_PAGES} pages");
                break;
            }
            next = response.next_link();
        }

        Ok(items)
    }

    /// Collects a paginated JSON array.
    ///
    /// # Errors
    ///
    /// Returns the first error from any page.
    pub async fn collect_all<T>(&self, url: Url) -> Result<Vec<T>, GitHubError>
    where
        T: DeserializeOwned + Send,
    {
        self.paginate(url, |page: Vec<T>| page).await
    }

    /// Sends a request as the personal account.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] when no personal account is
    /// configured, transport failures, and the mapped error for non-2xx
    /// statuses.
    pub async fn personal_call(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> Result<ApiResponse, GitHubError> {
        let account = self
            .personal
            .as_ref()
            .ok_or_else(|| GitHubError::Configuration {
                message: "this command needs a personal account".to_owned(),
            })?;
        let request = ApiRequest::new(method, url)
            .with_body(body)
            .with_authorization(Authorization::Token(account.token().clone()));
        let operation = request.describe();
        let response = self.issuer.transport().send(request).await?;
        if response.status == StatusCode::UNAUTHORIZED {
            tracing::error!("personal account {} was rejected by GitHub", account.login());
        }
        response.error_for_status(&operation)
    }
}

impl fmt::Debug for TenantSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TenantSession")
            .field("installation", &self.installation)
            .field("personal", &self.personal)
            .finish_non_exhaustive()
    }
}
