//! Mapping from repositories to the installation that can act on them.
//!
//! The directory is read on every cross-repository request and written only
//! by a full rebuild or by refreshing a single installation. Writers are
//! serialised and do all network I/O before taking the short write lock, so a
//! lookup never waits on GitHub and never sees a half-written entry.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;

use crate::auth::SessionCache;
use crate::github::models::{AccessibleRepository, RepositoryPage};
use crate::github::{GitHubError, InstallationId, RepositorySlug};

/// Outcome of a full rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectorySummary {
    /// Installations listed by GitHub.
    pub installations: usize,
    /// Repositories recorded across all installations.
    pub repositories: usize,
    /// Installations skipped because the app lost access.
    pub forbidden: usize,
    /// Installations skipped because their repositories could not be listed.
    pub failed: usize,
}

#[derive(Debug, Default)]
struct Entries {
    repositories: HashMap<String, InstallationId>,
    organisations: HashMap<String, InstallationId>,
    /// Account login of each installation; survives refreshes that list
    /// nothing.
    accounts: HashMap<String, InstallationId>,
    stale: HashSet<InstallationId>,
}

impl Entries {
    /// Replaces everything `installation` covers with `repositories`.
    fn record(&mut self, installation: InstallationId, repositories: &[AccessibleRepository]) {
        self.repositories.retain(|_, owner| *owner != installation);
        self.organisations.retain(|_, owner| *owner != installation);
        for repository in repositories {
            self.repositories
                .insert(repository.full_name.to_lowercase(), installation);
            self.organisations
                .insert(repository.owner.login.to_lowercase(), installation);
        }
        self.stale.remove(&installation);
    }

    fn installation_of_owner(&self, owner: &str) -> Option<InstallationId> {
        self.organisations
            .get(owner)
            .or_else(|| self.accounts.get(owner))
            .copied()
    }

    fn live(&self, key: &str) -> Option<InstallationId> {
        self.repositories
            .get(key)
            .copied()
            .filter(|installation| !self.stale.contains(installation))
    }
}

/// Repository-to-installation directory shared by every dispatch.
pub struct TenantDirectory {
    sessions: Arc<SessionCache>,
    entries: RwLock<Entries>,
    writer: Mutex<()>,
}

impl TenantDirectory {
    /// Creates an empty directory; call [`Self::rebuild`] to populate it.
    #[must_use]
    pub fn new(sessions: Arc<SessionCache>) -> Self {
        Self {
            sessions,
            entries: RwLock::new(Entries::default()),
            writer: Mutex::new(()),
        }
    }

    /// Enumerates every installation and records its repositories.
    ///
    /// Entries are overwritten key by key, so rebuilding twice against the
    /// same remote state yields the same mapping.
    ///
    /// # Errors
    ///
    /// Returns an error only when the installations themselves cannot be
    /// listed. Failures of individual installations are counted in the
    /// summary.
    pub async fn rebuild(&self) -> Result<DirectorySummary, GitHubError> {
        let _writer = self.writer.lock().await;
        let installations = self.sessions.issuer().list_installations().await?;

        let mut summary = DirectorySummary {
            installations: installations.len(),
            ..DirectorySummary::default()
        };
        let mut fetched = Vec::with_capacity(installations.len());
        let mut forbidden = Vec::new();
        for installation in &installations {
            let id = InstallationId::new(installation.id);
            match self.fetch_repositories(id).await {
                Ok(repositories) => {
                    summary.repositories += repositories.len();
                    let owner = installation
                        .account
                        .as_ref()
                        .map(|account| account.login.to_lowercase());
                    fetched.push((id, owner, repositories));
                }
                Err(GitHubError::InstallationForbidden { .. }) => {
                    tracing::warn!("installation {id} is forbidden; marking stale");
                    summary.forbidden += 1;
                    forbidden.push(id);
                }
                Err(error) => {
                    tracing::warn!("could not list repositories of installation {id}: {error}");
                    summary.failed += 1;
                }
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for (id, owner, repositories) in &fetched {
            entries.record(*id, repositories);
            if let Some(login) = owner {
                entries.accounts.insert(login.clone(), *id);
            }
        }
        entries.stale.extend(forbidden);
        drop(entries);

        tracing::info!(
            "directory rebuilt: {} installations, {} repositories, {} forbidden",
            summary.installations,
            summary.repositories,
            summary.forbidden
        );
        Ok(summary)
    }

    /// Re-lists one installation's repositories and records them.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; an `InstallationForbidden` also marks the
    /// installation stale.
    pub async fn refresh_installation(
        &self,
        installation: InstallationId,
    ) -> Result<usize, GitHubError> {
        let _writer = self.writer.lock().await;
        match self.fetch_repositories(installation).await {
            Ok(repositories) => {
                self.entries
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .record(installation, &repositories);
                tracing::debug!(
                    "installation {installation} refreshed with {} repositories",
                    repositories.len()
                );
                Ok(repositories.len())
            }
            Err(error) => {
                if matches!(error, GitHubError::InstallationForbidden { .. }) {
                    self.mark_stale(installation);
                }
                Err(error)
            }
        }
    }

    /// Looks up the installation for `repository`.
    ///
    /// On a miss whose owner is known, the owner's installation is refreshed
    /// once and the lookup retried. Refresh failures are logged and resolve
    /// as absent.
    pub async fn resolve(&self, repository: &RepositorySlug) -> Option<InstallationId> {
        let key = repository.key();
        if let Some(installation) = self.lookup(&key) {
            return Some(installation);
        }

        let owner = repository.owner().as_str().to_lowercase();
        let candidate = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .installation_of_owner(&owner)?;

        tracing::debug!("{repository} not in directory; refreshing installation {candidate}");
        if let Err(error) = self.refresh_installation(candidate).await {
            tracing::warn!("refresh of installation {candidate} failed: {error}");
            return None;
        }
        self.lookup(&key)
    }

    /// Direct lookup without any refresh.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<InstallationId> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .live(&key.to_lowercase())
    }

    /// Marks an installation's entries as unusable until it is refreshed.
    pub fn mark_stale(&self, installation: InstallationId) {
        tracing::info!("installation {installation} marked stale");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .stale
            .insert(installation);
    }

    /// Number of repositories currently recorded, stale ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .repositories
            .len()
    }

    /// Returns true when nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn fetch_repositories(
        &self,
        installation: InstallationId,
    ) -> Result<Vec<AccessibleRepository>, GitHubError> {
        let session = self.sessions.session_for(installation);
        let url = session.api_base().endpoint("installation/repositories")?;
        session
            .paginate(url, |page: RepositoryPage| page.repositories)
            .await
    }
}

impl std::fmt::Debug for TenantDirectory {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TenantDirectory")
            .field("repositories", &self.len())
            .finish_non_exhaustive()
    }
}
