//! Mints app assertions and exchanges them for tenant tokens.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use http::{Method, StatusCode};
use jsonwebtoken::{Algorithm, Header};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

use super::clock::Clock;
use super::identity::AppIdentity;
use super::token::{Assertion, TenantToken};
use crate::github::error_mapping::extract_github_message;
use crate::github::models::Installation;
use crate::github::pagination::MAX_PAGES;
use crate::github::{
    ApiBase, ApiRequest, ApiResponse, ApiTransport, Authorization, GitHubError, InstallationId,
};

/// Backdating applied to `iat` to tolerate clock skew with GitHub.
const CLOCK_SKEW_SECONDS: i64 = 60;
/// Lifetime of an assertion; GitHub caps this at ten minutes.
const ASSERTION_LIFETIME_SECONDS: i64 = 600;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AssertionClaims {
    pub(crate) iat: i64,
    pub(crate) exp: i64,
    pub(crate) iss: String,
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    token: String,
    expires_at: String,
}

/// Issues credentials on behalf of the app.
pub struct CredentialIssuer {
    identity: AppIdentity,
    transport: Arc<dyn ApiTransport>,
    api_base: ApiBase,
    clock: Arc<dyn Clock>,
}

impl CredentialIssuer {
    /// Creates an issuer for `identity` talking to `api_base`.
    #[must_use]
    pub fn new(
        identity: AppIdentity,
        transport: Arc<dyn ApiTransport>,
        api_base: ApiBase,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            identity,
            transport,
            api_base,
            clock,
        }
    }

    /// Signs a fresh assertion valid for ten minutes.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Credential`] when signing fails.
    pub fn mint_assertion(&self) -> Result<Assertion, GitHubError> {
        let now = self.clock.now();
        let expires_at = now + TimeDelta::seconds(ASSERTION_LIFETIME_SECONDS);
        let claims = AssertionClaims {
            iat: (now - TimeDelta::seconds(CLOCK_SKEW_SECONDS)).timestamp(),
            exp: expires_at.timestamp(),
            iss: self.identity.app_id().to_string(),
        };
        let jwt = jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            self.identity.signing_key(),
        )
        .map_err(|error| GitHubError::Credential {
            message: format!("failed to sign app assertion: {error}"),
        })?;
        Ok(Assertion::new(SecretString::from(jwt), expires_at))
    }

    /// Exchanges an assertion for an installation access token.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::InstallationForbidden`] when GitHub answers
    /// `403`, and [`GitHubError::Credential`] for any other failure.
    pub async fn exchange(
        &self,
        installation: InstallationId,
        assertion: &Assertion,
    ) -> Result<TenantToken, GitHubError> {
        let url = self
            .api_base
            .endpoint(&format!("app/installations/{installation}/access_tokens"))?;
        let request = ApiRequest::new(Method::POST, url)
            .with_authorization(Authorization::Bearer(assertion.jwt().clone()));
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|error| GitHubError::Credential {
                message: format!("token exchange for installation {installation}: {error}"),
            })?;

        if response.status == StatusCode::FORBIDDEN {
            return Err(GitHubError::InstallationForbidden {
                installation_id: installation.get(),
            });
        }
        if !response.is_success() {
            let detail = extract_github_message(&response.body)
                .unwrap_or_else(|| "no message".to_owned());
            return Err(GitHubError::Credential {
                message: format!(
                    "token exchange for installation {installation} returned {}: {detail}",
                    response.status
                ),
            });
        }

        parse_access_token(installation, &response)
    }

    /// Mints an assertion and exchanges it in one step.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::mint_assertion`] and [`Self::exchange`].
    pub async fn issue_token(&self, installation: InstallationId) -> Result<TenantToken, GitHubError> {
        let assertion = self.mint_assertion()?;
        self.exchange(installation, &assertion).await
    }

    /// Performs one app-authenticated request.
    ///
    /// # Errors
    ///
    /// Returns signing errors and transport failures; HTTP statuses are left
    /// to the caller.
    pub async fn app_call(&self, method: Method, url: Url) -> Result<ApiResponse, GitHubError> {
        let assertion = self.mint_assertion()?;
        let request = ApiRequest::new(method, url)
            .with_authorization(Authorization::Bearer(assertion.jwt().clone()));
        self.transport.send(request).await
    }

    /// Lists every installation of the app, following pagination.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Credential`] when GitHub rejects the assertion,
    /// or the mapped API error for other failures.
    pub async fn list_installations(&self) -> Result<Vec<Installation>, GitHubError> {
        let mut installations = Vec::new();
        let mut next = Some(self.api_base.endpoint("app/installations")?);
        let mut pages = 0;

        while let Some(url) = next.take() {
            let response = self.app_call(Method::GET, url).await?;
            if response.status == StatusCode::UNAUTHORIZED {
                return Err(GitHubError::Credential {
                    message: "GitHub rejected the app assertion".to_owned(),
                });
            }
            let page = response.error_for_status("list installations")?;
            installations.extend(page.json::<Vec<Installation>>()?);

            pages += 1;
            if pages >= MAX_PAGES {
                tracing::warn!("installation listing stopped after {MAX_PAGES} pages");
                break;
            }
            next = page.next_link();
        }

        Ok(installations)
    }

    /// Returns the API root this issuer talks to.
    #[must_use]
    pub const fn api_base(&self) -> &ApiBase {
        &self.api_base
    }

    /// Returns the clock used for expiry decisions.
    #[must_use]
    pub const fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Returns the transport shared with sessions.
    #[must_use]
    pub const fn transport(&self) -> &Arc<dyn ApiTransport> {
        &self.transport
    }
}

fn parse_access_token(
    installation: InstallationId,
    response: &ApiResponse,
) -> Result<TenantToken, GitHubError> {
    let payload: AccessTokenResponse =
        response.json().map_err(|error| GitHubError::Credential {
            message: format!("token exchange returned an unexpected body: {error}"),
        })?;
    let expires_at = DateTime::parse_from_rfc3339(&payload.expires_at)
        .map_err(|error| GitHubError::Credential {
            message: format!("token expiry {} is not RFC 3339: {error}", payload.expires_at),
        })?
        .with_timezone(&Utc);
    Ok(TenantToken::new(
        installation,
        SecretString::from(payload.token),
        expires_at,
    ))
}
