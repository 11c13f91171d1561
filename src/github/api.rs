//! Typed endpoint helpers for one repository.
//!
//! Commands and the permission evaluator never build URLs by hand; they go
//! through a [`RepositoryClient`] bound to a session and a repository.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::error::GitHubError;
use super::locator::RepositorySlug;
use super::models::{
    ApiPullRequest, Branch, Comment, CreatedIssue, Label, PullRequestDetail, RepositoryInfo,
};
use crate::auth::TenantSession;

const FORK_POLL_ATTEMPTS: u32 = 5;
const FORK_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Target state of an issue or pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueState {
    /// Reopen.
    Open,
    /// Close.
    Closed,
}

impl IssueState {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Deserialize)]
struct PermissionResponse {
    permission: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: String,
}

/// Endpoint helpers scoped to one repository and one session.
#[derive(Debug, Clone, Copy)]
pub struct RepositoryClient<'a> {
    session: &'a TenantSession,
    repository: &'a RepositorySlug,
}

impl<'a> RepositoryClient<'a> {
    /// Binds `session` to `repository`.
    #[must_use]
    pub const fn new(session: &'a TenantSession, repository: &'a RepositorySlug) -> Self {
        Self {
            session,
            repository,
        }
    }

    /// Repository this client addresses.
    #[must_use]
    pub const fn repository(&self) -> &RepositorySlug {
        self.repository
    }

    fn url(&self, path: &str) -> Result<Url, GitHubError> {
        self.session
            .api_base()
            .repository_endpoint(self.repository, path)
    }

    /// Appends one percent-encoded path segment, for user-supplied names.
    fn url_with_segment(&self, path: &str, segment: &str) -> Result<Url, GitHubError> {
        let mut url = self.url(path)?;
        url.path_segments_mut()
            .map_err(|()| GitHubError::Configuration {
                message: format!("cannot append {segment} to {path}"),
            })?
            .push(segment);
        Ok(url)
    }

    /// Reads the collaborator permission string for `login`.
    ///
    /// # Errors
    ///
    /// Returns session errors and non-2xx statuses.
    pub async fn collaborator_permission(&self, login: &str) -> Result<String, GitHubError> {
        let mut url = self.url("collaborators")?;
        url.path_segments_mut()
            .map_err(|()| GitHubError::Configuration {
                message: "cannot build collaborator URL".to_owned(),
            })?
            .push(login)
            .push("permission");
        let response: PermissionResponse = self.session.get_json(url).await?;
        Ok(response.permission)
    }

    /// Reads a repository file, returning `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns session errors, non-2xx statuses other than `404`, and
    /// [`GitHubError::Decode`] when the content is not base64 UTF-8.
    pub async fn file_contents(&self, path: &str) -> Result<Option<String>, GitHubError> {
        let url = self.url(&format!("contents/{}", path.trim_start_matches('/')))?;
        let response = self.session.authenticated_call(Method::GET, url, None).await?;
        if response.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let payload: ContentsResponse = response.error_for_status("read contents")?.json()?;
        let compact: String = payload
            .content
            .chars()
            .filter(|character| !character.is_whitespace())
            .collect();
        let bytes = STANDARD
            .decode(compact)
            .map_err(|error| GitHubError::Decode {
                message: format!("{path} is not valid base64: {error}"),
            })?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|error| GitHubError::Decode {
                message: format!("{path} is not UTF-8: {error}"),
            })
    }

    /// Posts a comment on an issue or pull request.
    ///
    /// # Errors
    ///
    /// Returns session errors and non-2xx statuses.
    pub async fn post_comment(&self, issue: u64, body: &str) -> Result<(), GitHubError> {
        let url = self.url(&format!("issues/{issue}/comments"))?;
        self.session
            .send(Method::POST, url, Some(json!({ "body": body })))
            .await?;
        Ok(())
    }

    /// Lists the comments of an issue, oldest first.
    ///
    /// # Errors
    ///
    /// Returns session errors and non-2xx statuses.
    pub async fn issue_comments(&self, issue: u64) -> Result<Vec<Comment>, GitHubError> {
        let url = self.url(&format!("issues/{issue}/comments"))?;
        self.session.collect_all(url).await
    }

    /// Lists every label defined on the repository.
    ///
    /// # Errors
    ///
    /// Returns session errors and non-2xx statuses.
    pub async fn labels(&self) -> Result<Vec<Label>, GitHubError> {
        let url = self.url("labels")?;
        self.session.collect_all(url).await
    }

    /// Adds labels to an issue.
    ///
    /// # Errors
    ///
    /// Returns session errors and non-2xx statuses.
    pub async fn add_labels(&self, issue: u64, labels: &[String]) -> Result<(), GitHubError> {
        let url = self.url(&format!("issues/{issue}/labels"))?;
        self.session
            .send(Method::POST, url, Some(json!({ "labels": labels })))
            .await?;
        Ok(())
    }

    /// Removes one label from an issue.
    ///
    /// # Errors
    ///
    /// Returns session errors and non-2xx statuses, including `404` when the
    /// label was not applied.
    pub async fn remove_label(&self, issue: u64, label: &str) -> Result<(), GitHubError> {
        let url = self.url_with_segment(&format!("issues/{issue}/labels"), label)?;
        self.session.send(Method::DELETE, url, None).await?;
        Ok(())
    }

    /// Opens or closes an issue or pull request.
    ///
    /// # Errors
    ///
    /// Returns session errors and non-2xx statuses.
    pub async fn set_issue_state(&self, issue: u64, state: IssueState) -> Result<(), GitHubError> {
        let url = self.url(&format!("issues/{issue}"))?;
        self.session
            .send(Method::PATCH, url, Some(json!({ "state": state.as_str() })))
            .await?;
        Ok(())
    }

    /// Replaces the milestone and labels of an issue.
    ///
    /// # Errors
    ///
    /// Returns session errors and non-2xx statuses.
    pub async fn update_issue(
        &self,
        issue: u64,
        milestone: Option<u64>,
        labels: &[String],
    ) -> Result<(), GitHubError> {
        let url = self.url(&format!("issues/{issue}"))?;
        self.session
            .send(
                Method::PATCH,
                url,
                Some(json!({ "milestone": milestone, "labels": labels })),
            )
            .await?;
        Ok(())
    }

    /// Creates an issue.
    ///
    /// # Errors
    ///
    /// Returns session errors and non-2xx statuses.
    pub async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<CreatedIssue, GitHubError> {
        let url = self.url("issues")?;
        self.session
            .send_json(
                Method::POST,
                url,
                json!({ "title": title, "body": body, "labels": labels }),
            )
            .await
    }

    /// Fetches pull request detail.
    ///
    /// # Errors
    ///
    /// Returns session errors, non-2xx statuses, and decode failures.
    pub async fn pull_request(&self, number: u64) -> Result<PullRequestDetail, GitHubError> {
        let url = self.url(&format!("pulls/{number}"))?;
        let api: ApiPullRequest = self.session.get_json(url).await?;
        Ok(PullRequestDetail::from(api))
    }

    /// Merges a pull request, pinned to `head_sha` so a late push is not
    /// merged unseen.
    ///
    /// # Errors
    ///
    /// Returns session errors and non-2xx statuses (`405` when GitHub refuses
    /// the merge, `409` when the head moved).
    pub async fn merge_pull_request(&self, number: u64, head_sha: &str) -> Result<(), GitHubError> {
        let url = self.url(&format!("pulls/{number}/merge"))?;
        self.session
            .send(Method::PUT, url, Some(json!({ "sha": head_sha })))
            .await?;
        Ok(())
    }

    /// Reads repository metadata.
    ///
    /// # Errors
    ///
    /// Returns session errors and non-2xx statuses.
    pub async fn repository_info(&self) -> Result<RepositoryInfo, GitHubError> {
        let url = self.url("")?;
        self.session.get_json(url).await
    }

    /// Lists branch names.
    ///
    /// # Errors
    ///
    /// Returns session errors and non-2xx statuses.
    pub async fn branches(&self) -> Result<Vec<Branch>, GitHubError> {
        let url = self.url("branches")?;
        self.session.collect_all(url).await
    }

    /// Forks the repository into the personal account and waits briefly for
    /// GitHub to materialise the fork.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] without a personal account, and
    /// transport or status errors from the fork request.
    pub async fn fork_as_personal(&self) -> Result<ForkedRepository, GitHubError> {
        let url = self.url("forks")?;
        let response = self.session.personal_call(Method::POST, url, None).await?;
        let fork: ForkResponse = response.json()?;
        let slug = RepositorySlug::parse(&fork.full_name)?;
        let forked = ForkedRepository {
            clone_url: fork
                .clone_url
                .unwrap_or_else(|| format!("https://github.com/{slug}.git")),
            slug: slug.clone(),
        };

        let probe = self.session.api_base().repository_endpoint(&slug, "")?;
        for attempt in 0..FORK_POLL_ATTEMPTS {
            match self
                .session
                .personal_call(Method::GET, probe.clone(), None)
                .await
            {
                Ok(_) => {
                    tracing::debug!("fork {slug} ready after {attempt} polls");
                    return Ok(forked);
                }
                Err(error) if error.is_not_found() => {
                    tokio::time::sleep(FORK_POLL_INTERVAL).await;
                }
                Err(error) => return Err(error),
            }
        }
        tracing::warn!("fork {slug} not visible yet; continuing anyway");
        Ok(forked)
    }

    /// Opens a pull request as the personal account.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] without a personal account, and
    /// transport or status errors.
    pub async fn open_pull_request_as_personal(
        &self,
        title: &str,
        body: &str,
        head: &str,
        base: &str,
    ) -> Result<CreatedIssue, GitHubError> {
        let url = self.url("pulls")?;
        let response = self
            .session
            .personal_call(
                Method::POST,
                url,
                Some(json!({ "title": title, "body": body, "head": head, "base": base })),
            )
            .await?;
        response.json()
    }
}

#[derive(Debug, Deserialize)]
struct ForkResponse {
    full_name: String,
    #[serde(default)]
    clone_url: Option<String>,
}

/// A fork owned by the personal account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkedRepository {
    /// `owner/name` of the fork.
    pub slug: RepositorySlug,
    /// HTTPS clone URL of the fork.
    pub clone_url: String,
}
