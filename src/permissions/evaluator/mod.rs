//! Authorization decisions for primary and secondary repositories.

use std::fmt;

use serde_json::Value;

use super::PermissionLevel;
use super::policy::{PolicyDecision, PolicyDocument};
use crate::auth::TenantSession;
use crate::commands::CommandSpec;
use crate::github::{GitHubError, RepositoryClient, RepositorySlug};

/// Pull request facts that can widen what a requester may do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestContext {
    /// Login of the pull request author.
    pub author: String,
    /// `owner/name` of the head repository, absent when the fork was deleted.
    pub head_repository: Option<String>,
    /// Login owning the head repository.
    pub head_owner: Option<String>,
    /// Whether maintainers may push to the head branch.
    pub maintainer_can_modify: bool,
}

impl PullRequestContext {
    /// True when `login` wrote the pull request from a repository they own.
    #[must_use]
    pub fn is_owning_author(&self, login: &str) -> bool {
        self.author.eq_ignore_ascii_case(login)
            && self
                .head_owner
                .as_deref()
                .is_some_and(|owner| owner.eq_ignore_ascii_case(&self.author))
    }

    /// True when `target` is the head repository and maintainers may edit it.
    #[must_use]
    pub fn allows_maintainer_edit_of(&self, target: &RepositorySlug) -> bool {
        self.maintainer_can_modify
            && self
                .head_repository
                .as_deref()
                .is_some_and(|head| head.eq_ignore_ascii_case(&target.to_string()))
    }
}

/// Which rule granted an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantRule {
    /// Collaborator permission met the command's minimum scope.
    Scope,
    /// The requester authored the pull request from their own repository.
    PullRequestAuthor,
    /// The repository policy document granted the command.
    Policy,
    /// The secondary repository is the pull request head and allows
    /// maintainer edits.
    MaintainerEdit,
}

/// Why an invocation or secondary request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenialReason {
    /// Permission below the command's minimum and no other rule applied.
    InsufficientScope {
        /// Scope the command needs.
        required: PermissionLevel,
        /// Scope the requester has, when it could be read.
        actual: Option<PermissionLevel>,
    },
    /// The policy document denylists the requester.
    Denylisted,
    /// The policy document could not be read or parsed.
    PolicyUnavailable {
        /// Diagnostic detail.
        message: String,
    },
    /// The requested repository is not `owner/name`.
    InvalidTarget {
        /// The raw request.
        target: String,
    },
    /// The app is not installed on the requested repository.
    NotInstalled {
        /// The requested repository.
        target: String,
    },
    /// A lookup needed for the decision failed.
    LookupFailed {
        /// Diagnostic detail.
        message: String,
    },
}

impl fmt::Display for DenialReason {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientScope { required, actual } => match actual {
                Some(level) => write!(formatter, "requires {required}, requester has {level}"),
                None => write!(formatter, "requires {required}, requester level unknown"),
            },
            Self::Denylisted => formatter.write_str("requester is denylisted"),
            Self::PolicyUnavailable { message } => write!(formatter, "policy unavailable: {message}"),
            Self::InvalidTarget { target } => write!(formatter, "{target} is not owner/name"),
            Self::NotInstalled { target } => write!(formatter, "not installed on {target}"),
            Self::LookupFailed { message } => write!(formatter, "lookup failed: {message}"),
        }
    }
}

/// Result of an authorization check. A denial is a value, never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Authorization {
    /// The requester may proceed.
    Granted {
        /// The rule that matched first.
        rule: GrantRule,
        /// Per-command configuration from a policy grant.
        local_config: Option<Value>,
    },
    /// The requester may not proceed.
    Denied(DenialReason),
}

impl Authorization {
    /// True for [`Authorization::Granted`].
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }

    const fn granted(rule: GrantRule) -> Self {
        Self::Granted {
            rule,
            local_config: None,
        }
    }
}

/// One primary-repository authorization question.
#[derive(Debug, Clone, Copy)]
pub struct AuthorizationRequest<'a> {
    /// The command being invoked.
    pub command: &'a CommandSpec,
    /// Repository the mention was posted in.
    pub repository: &'a RepositorySlug,
    /// Login of the requester.
    pub requester: &'a str,
    /// Pull request facts, when the thread is a pull request.
    pub pull_request: Option<&'a PullRequestContext>,
}

/// Combines collaborator permission, the author override, and the policy
/// document into a decision.
#[derive(Debug, Clone)]
pub struct PermissionEvaluator {
    policy_path: String,
}

impl PermissionEvaluator {
    /// Creates an evaluator reading policy documents from `policy_path`.
    #[must_use]
    pub fn new(policy_path: impl Into<String>) -> Self {
        Self {
            policy_path: policy_path.into(),
        }
    }

    /// Repository path of the policy document.
    #[must_use]
    pub fn policy_path(&self) -> &str {
        &self.policy_path
    }

    /// Reads `login`'s permission on `repository`. Never cached.
    ///
    /// # Errors
    ///
    /// Returns session and API errors.
    pub async fn permission_of(
        &self,
        session: &TenantSession,
        repository: &RepositorySlug,
        login: &str,
    ) -> Result<PermissionLevel, GitHubError> {
        let raw = RepositoryClient::new(session, repository)
            .collaborator_permission(login)
            .await?;
        Ok(PermissionLevel::from_github(&raw))
    }

    /// Fetches the repository's policy document. A missing file is the empty
    /// policy.
    ///
    /// # Errors
    ///
    /// Credential failures pass through unchanged; every other failure is
    /// reported as [`GitHubError::PolicyFetch`].
    pub async fn fetch_policy(
        &self,
        session: &TenantSession,
        repository: &RepositorySlug,
    ) -> Result<PolicyDocument, GitHubError> {
        let contents = RepositoryClient::new(session, repository)
            .file_contents(&self.policy_path)
            .await
            .map_err(|error| {
                if error.is_credential_failure() {
                    error
                } else {
                    GitHubError::PolicyFetch {
                        message: format!("{repository}/{}: {error}", self.policy_path),
                    }
                }
            })?;
        contents.map_or_else(|| Ok(PolicyDocument::default()), |source| PolicyDocument::parse(&source))
    }

    /// Decides whether the requester may run the command.
    ///
    /// Rules are tried in order and the first match wins: scope, pull request
    /// author override, policy document.
    ///
    /// # Errors
    ///
    /// Only credential failures are returned as errors. Every other lookup
    /// failure fails closed.
    pub async fn authorize(
        &self,
        session: &TenantSession,
        request: &AuthorizationRequest<'_>,
    ) -> Result<Authorization, GitHubError> {
        let AuthorizationRequest {
            command,
            repository,
            requester,
            pull_request,
        } = *request;

        let actual = match self.permission_of(session, repository, requester).await {
            Ok(level) => Some(level),
            Err(error) if error.is_credential_failure() => return Err(error),
            Err(error) => {
                tracing::warn!("permission lookup for {requester} on {repository} failed: {error}");
                None
            }
        };
        // An unreadable level never grants, not even commands anyone may run.
        if actual.is_some_and(|level| level >= command.min_scope) {
            return Ok(Authorization::granted(GrantRule::Scope));
        }

        if command.allow_pr_author_override
            && pull_request.is_some_and(|context| context.is_owning_author(requester))
        {
            tracing::info!("{requester} is the owning author; allowing {}", command.name);
            return Ok(Authorization::granted(GrantRule::PullRequestAuthor));
        }

        let policy = match self.fetch_policy(session, repository).await {
            Ok(policy) => policy,
            Err(error) if error.is_credential_failure() => return Err(error),
            Err(error) => {
                tracing::warn!("{error}; denying {}", command.name);
                return Ok(Authorization::Denied(DenialReason::PolicyUnavailable {
                    message: error.to_string(),
                }));
            }
        };
        match policy.decide(requester, &command.name) {
            PolicyDecision::Denylisted => Ok(Authorization::Denied(DenialReason::Denylisted)),
            PolicyDecision::Granted { local_config } => Ok(Authorization::Granted {
                rule: GrantRule::Policy,
                local_config,
            }),
            PolicyDecision::NoGrant => Ok(Authorization::Denied(DenialReason::InsufficientScope {
                required: command.min_scope,
                actual,
            })),
        }
    }

    /// Decides whether a suspended command may act on `target`.
    ///
    /// Granted when the requester has write or better on the target, or when
    /// the target is the pull request head and maintainer edits are allowed.
    /// Other lookup failures resolve to a denial.
    ///
    /// # Errors
    ///
    /// Credential failures of the target session are returned so the caller
    /// can retire a revoked installation.
    pub async fn authorize_secondary(
        &self,
        target_session: &TenantSession,
        target: &RepositorySlug,
        requester: &str,
        pull_request: Option<&PullRequestContext>,
    ) -> Result<Authorization, GitHubError> {
        let level = match self.permission_of(target_session, target, requester).await {
            Ok(level) => level,
            Err(error) if error.is_credential_failure() => return Err(error),
            Err(error) => {
                tracing::warn!("permission lookup for {requester} on {target} failed: {error}");
                return Ok(Authorization::Denied(DenialReason::LookupFailed {
                    message: error.to_string(),
                }));
            }
        };

        Ok(if level >= PermissionLevel::Write {
            Authorization::granted(GrantRule::Scope)
        } else if pull_request.is_some_and(|context| context.allows_maintainer_edit_of(target)) {
            Authorization::granted(GrantRule::MaintainerEdit)
        } else {
            Authorization::Denied(DenialReason::InsufficientScope {
                required: PermissionLevel::Write,
                actual: Some(level),
            })
        })
    }
}

#[cfg(test)]
mod tests;
