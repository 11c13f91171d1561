//! Short-lived credentials: app assertions and tenant tokens.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use secrecy::SecretString;

use crate::github::InstallationId;

/// Seconds before expiry at which a tenant token is regenerated.
pub const REFRESH_MARGIN_SECONDS: i64 = 60;

/// A signed, time-boxed app-level claim.
///
/// Assertions are cheap to mint and are never cached; each one is used for a
/// single token exchange or app-level call.
#[derive(Clone)]
pub struct Assertion {
    jwt: SecretString,
    expires_at: DateTime<Utc>,
}

impl Assertion {
    pub(crate) const fn new(jwt: SecretString, expires_at: DateTime<Utc>) -> Self {
        Self { jwt, expires_at }
    }

    /// Returns the encoded JWT.
    #[must_use]
    pub const fn jwt(&self) -> &SecretString {
        &self.jwt
    }

    /// Returns the `exp` claim.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

impl fmt::Debug for Assertion {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Assertion")
            .field("jwt", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Bearer credential for one installation.
#[derive(Clone)]
pub struct TenantToken {
    installation: InstallationId,
    secret: SecretString,
    expires_at: DateTime<Utc>,
}

impl TenantToken {
    /// Wraps an issued token.
    #[must_use]
    pub const fn new(
        installation: InstallationId,
        secret: SecretString,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            installation,
            secret,
            expires_at,
        }
    }

    /// Installation the token was issued for.
    #[must_use]
    pub const fn installation(&self) -> InstallationId {
        self.installation
    }

    /// The bearer secret.
    #[must_use]
    pub const fn secret(&self) -> &SecretString {
        &self.secret
    }

    /// Expiry reported by GitHub.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true once `now` is within the refresh margin of expiry.
    #[must_use]
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now + TimeDelta::seconds(REFRESH_MARGIN_SECONDS) >= self.expires_at
    }
}

impl fmt::Debug for TenantToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TenantToken")
            .field("installation", &self.installation)
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
