//! Shared test utilities: a real app identity, wiremock-backed issuers,
//! and token endpoint stubs.

use std::sync::Arc;

use butler::auth::{AppIdentity, Clock, CredentialIssuer, SystemClock};
use butler::github::ApiBase;
use butler::ReqwestTransport;
use chrono::{DateTime, TimeDelta, Utc};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub mod runtime;

/// Throwaway RSA key used to sign test assertions.
pub const PRIVATE_KEY_PEM: &str = include_str!("../fixtures/app_private_key.pem");

/// App id the fixture identity signs as.
pub const APP_ID: u64 = 4242;

/// Builds the fixture identity.
///
/// # Panics
///
/// Panics if the fixture key does not parse.
pub fn identity() -> AppIdentity {
    AppIdentity::from_pem(APP_ID, &SecretString::from(PRIVATE_KEY_PEM.to_owned()))
        .unwrap_or_else(|error| panic!("fixture key should parse: {error}"))
}

/// Builds an issuer that talks to `server` over real HTTP.
///
/// # Panics
///
/// Panics if the HTTP client or the API base cannot be built.
pub fn issuer_for(server: &MockServer, clock: Arc<dyn Clock>) -> Arc<CredentialIssuer> {
    let transport = ReqwestTransport::new()
        .unwrap_or_else(|error| panic!("HTTP client should build: {error}"));
    let api_base = ApiBase::parse(&server.uri())
        .unwrap_or_else(|error| panic!("mock server URI should parse: {error}"));
    Arc::new(CredentialIssuer::new(
        identity(),
        Arc::new(transport),
        api_base,
        clock,
    ))
}

/// An issuer on the system clock.
pub fn system_issuer(server: &MockServer) -> Arc<CredentialIssuer> {
    issuer_for(server, Arc::new(SystemClock))
}

/// The JSON GitHub returns from a token exchange.
pub fn token_body(token: &str, expires_at: DateTime<Utc>) -> serde_json::Value {
    json!({ "token": token, "expires_at": expires_at.to_rfc3339() })
}

/// Answers token exchanges for `installation` with `token`, valid for an
/// hour from now.
pub fn token_endpoint(installation: u64, token: &str) -> Mock {
    Mock::given(method("POST"))
        .and(path(format!("/app/installations/{installation}/access_tokens")))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(token_body(token, Utc::now() + TimeDelta::hours(1))),
        )
}
