//! Process-wide memo of tenant sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::issuer::CredentialIssuer;
use super::session::{PersonalAccount, TenantSession};
use crate::github::InstallationId;
use crate::telemetry::TelemetrySink;

/// Hands out one shared [`TenantSession`] per installation.
///
/// Keeping a single session per installation means its token cache is reused
/// across dispatches and never shared between installations.
pub struct SessionCache {
    issuer: Arc<CredentialIssuer>,
    personal: Option<PersonalAccount>,
    telemetry: Arc<dyn TelemetrySink>,
    sessions: Mutex<HashMap<InstallationId, Arc<TenantSession>>>,
}

impl SessionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(
        issuer: Arc<CredentialIssuer>,
        personal: Option<PersonalAccount>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            issuer,
            personal,
            telemetry,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the session bound to `installation`, creating it on first use.
    ///
    /// Construction is cheap; the token is only fetched on the first
    /// authenticated call.
    pub fn session_for(&self, installation: InstallationId) -> Arc<TenantSession> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(sessions.entry(installation).or_insert_with(|| {
            Arc::new(TenantSession::new(
                installation,
                Arc::clone(&self.issuer),
                self.personal.clone(),
                Arc::clone(&self.telemetry),
            ))
        }))
    }

    /// The issuer shared by every session.
    #[must_use]
    pub const fn issuer(&self) -> &Arc<CredentialIssuer> {
        &self.issuer
    }
}
