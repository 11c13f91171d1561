//! The app's own identity: numeric id plus RSA signing key.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use jsonwebtoken::EncodingKey;
use secrecy::{ExposeSecret, SecretString};

use crate::github::GitHubError;

/// Application identity, loaded once at startup and shared process-wide.
///
/// The PEM is parsed eagerly so that broken key material is reported as a
/// configuration error before the server starts accepting webhooks.
#[derive(Clone)]
pub struct AppIdentity {
    app_id: u64,
    signing_key: EncodingKey,
}

impl AppIdentity {
    /// Builds an identity from a PEM-encoded RSA private key.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] when the key is empty or is not
    /// an RSA PEM.
    pub fn from_pem(app_id: u64, private_key: &SecretString) -> Result<Self, GitHubError> {
        let pem = private_key.expose_secret();
        if pem.trim().is_empty() {
            return Err(GitHubError::Configuration {
                message: "app private key is empty".to_owned(),
            });
        }
        let signing_key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|error| {
                GitHubError::Configuration {
                    message: format!("app private key is not a valid RSA PEM: {error}"),
                }
            })?;
        Ok(Self {
            app_id,
            signing_key,
        })
    }

    /// Returns the numeric application id.
    #[must_use]
    pub const fn app_id(&self) -> u64 {
        self.app_id
    }

    pub(crate) const fn signing_key(&self) -> &EncodingKey {
        &self.signing_key
    }
}

/// Unwraps a base64-wrapped PEM, the form usually stored in a single
/// environment variable. Whitespace inside the value is ignored.
///
/// # Errors
///
/// Returns [`GitHubError::Configuration`] when the value is not base64 or
/// does not decode to UTF-8.
pub fn decode_base64_pem(encoded: &SecretString) -> Result<SecretString, GitHubError> {
    let compact: String = encoded
        .expose_secret()
        .chars()
        .filter(|character| !character.is_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(compact)
        .map_err(|error| GitHubError::Configuration {
            message: format!("app private key is not valid base64: {error}"),
        })?;
    String::from_utf8(bytes)
        .map(SecretString::from)
        .map_err(|error| GitHubError::Configuration {
            message: format!("app private key is not UTF-8: {error}"),
        })
}

impl fmt::Debug for AppIdentity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppIdentity")
            .field("app_id", &self.app_id)
            .field("signing_key", &"[REDACTED]")
            .finish()
    }
}
