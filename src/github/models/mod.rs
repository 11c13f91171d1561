//! Data models for webhook payloads and REST responses.
//!
//! Webhook types mirror only the fields the bot reads; unknown fields are
//! ignored. Types prefixed with `Api` are internal deserialisation targets
//! that convert into flatter public domain types.

use serde::Deserialize;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// A GitHub user or organisation reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Account {
    /// Login name.
    pub login: String,
}

/// Repository block of a webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookRepository {
    /// Repository name without the owner.
    pub name: String,
    /// `owner/name`.
    pub full_name: String,
    /// Owning account.
    pub owner: Account,
}

/// Installation block of a webhook payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstallationRef {
    /// Installation id.
    pub id: u64,
    /// Account the app is installed on, present on installation events.
    #[serde(default)]
    pub account: Option<Account>,
}

/// A label as returned by GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Label {
    /// Label name.
    pub name: String,
    /// Free-text description, which may carry `on-merge:` directives.
    #[serde(default)]
    pub description: Option<String>,
}

/// A milestone as returned by GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Milestone {
    /// Milestone number.
    pub number: u64,
    /// Milestone title, e.g. `4.2`.
    pub title: String,
    /// Free-text description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Comment block of a comment webhook, also the shape of listed comments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Comment {
    /// Comment id.
    pub id: u64,
    /// Markdown body.
    #[serde(default)]
    pub body: Option<String>,
    /// Author.
    pub user: Account,
    /// Browser URL of the comment.
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Issue block of a webhook payload.
///
/// Pull requests are issues too; `pull_request` is present for them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Issue {
    /// Issue or pull request number.
    pub number: u64,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Markdown body.
    #[serde(default)]
    pub body: Option<String>,
    /// Author.
    pub user: Account,
    /// Applied labels.
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Marker object present when the issue is a pull request.
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
    /// Milestone, if any.
    #[serde(default)]
    pub milestone: Option<Milestone>,
}

impl Issue {
    /// Returns true when the issue is a pull request.
    #[must_use]
    pub const fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

/// Git reference block (`base`/`head`) of a pull request payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BranchRef {
    /// Branch name.
    #[serde(rename = "ref")]
    pub name: String,
}

/// Pull request block of a `pull_request` webhook.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebhookPullRequest {
    /// Pull request number.
    pub number: u64,
    /// Title.
    #[serde(default)]
    pub title: String,
    /// Markdown body.
    #[serde(default)]
    pub body: Option<String>,
    /// Author.
    pub user: Account,
    /// Whether the pull request was merged (on `closed` events).
    #[serde(default)]
    pub merged: bool,
    /// Who merged it.
    #[serde(default)]
    pub merged_by: Option<Account>,
    /// Target branch.
    pub base: BranchRef,
    /// Applied labels.
    #[serde(default)]
    pub labels: Vec<Label>,
    /// Milestone, if any.
    #[serde(default)]
    pub milestone: Option<Milestone>,
}

/// A decoded webhook delivery.
///
/// Every block is optional because GitHub sends different subsets for
/// different event types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct WebhookEvent {
    /// Event action such as `created`, `added`, or `closed`.
    #[serde(default)]
    pub action: Option<String>,
    /// Repository the event happened in.
    #[serde(default)]
    pub repository: Option<WebhookRepository>,
    /// Account that triggered the event.
    #[serde(default)]
    pub sender: Option<Account>,
    /// Installation the delivery belongs to.
    #[serde(default)]
    pub installation: Option<InstallationRef>,
    /// Comment, on comment events.
    #[serde(default)]
    pub comment: Option<Comment>,
    /// Issue, on issue and issue-comment events.
    #[serde(default)]
    pub issue: Option<Issue>,
    /// Pull request, on pull request events.
    #[serde(default)]
    pub pull_request: Option<WebhookPullRequest>,
}

/// An installation of the app, as listed by `GET /app/installations`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Installation {
    /// Installation id.
    pub id: u64,
    /// Account the app is installed on.
    #[serde(default)]
    pub account: Option<Account>,
}

/// A repository accessible to an installation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessibleRepository {
    /// `owner/name`.
    pub full_name: String,
    /// Owning account.
    pub owner: Account,
}

/// One page of `GET /installation/repositories`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryPage {
    /// Repositories on this page.
    #[serde(default)]
    pub repositories: Vec<AccessibleRepository>,
}

/// Issue created by `POST /repos/{owner}/{repo}/issues`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedIssue {
    /// Number of the new issue.
    pub number: u64,
}

/// Repository metadata from `GET /repos/{owner}/{repo}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RepositoryInfo {
    /// Default branch name.
    pub default_branch: String,
    /// HTTPS clone URL.
    #[serde(default)]
    pub clone_url: Option<String>,
}

/// A branch listed by `GET /repos/{owner}/{repo}/branches`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Branch {
    /// Branch name.
    pub name: String,
}

/// Pull request detail used for authorization and merge decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDetail {
    /// Pull request number.
    pub number: u64,
    /// Title.
    pub title: String,
    /// Author login.
    pub author: String,
    /// Head commit sha.
    pub head_sha: String,
    /// `owner/name` of the head repository; absent when the fork was deleted.
    pub head_repository: Option<String>,
    /// Login owning the head repository.
    pub head_owner: Option<String>,
    /// Target branch.
    pub base_ref: String,
    /// Whether maintainers may push to the head branch.
    pub maintainer_can_modify: bool,
    /// GitHub's mergeability verdict; `None` while still computing.
    pub mergeable: Option<bool>,
    /// Merge commit sha once merged.
    pub merge_commit_sha: Option<String>,
    /// Milestone, if any.
    pub milestone: Option<Milestone>,
    /// Applied labels.
    pub labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiPullRequest {
    number: u64,
    #[serde(default)]
    title: String,
    user: Account,
    head: ApiHead,
    base: BranchRef,
    #[serde(default)]
    maintainer_can_modify: bool,
    #[serde(default)]
    mergeable: Option<bool>,
    #[serde(default)]
    merge_commit_sha: Option<String>,
    #[serde(default)]
    milestone: Option<Milestone>,
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
struct ApiHead {
    sha: String,
    #[serde(default)]
    repo: Option<ApiHeadRepository>,
}

#[derive(Debug, Deserialize)]
struct ApiHeadRepository {
    full_name: String,
    owner: Account,
}

impl From<ApiPullRequest> for PullRequestDetail {
    fn from(api: ApiPullRequest) -> Self {
        let (head_repository, head_owner) = api
            .head
            .repo
            .map(|repo| (repo.full_name, repo.owner.login))
            .unzip();
        Self {
            number: api.number,
            title: api.title,
            author: api.user.login,
            head_sha: api.head.sha,
            head_repository,
            head_owner,
            base_ref: api.base.name,
            maintainer_can_modify: api.maintainer_can_modify,
            mergeable: api.mergeable,
            merge_commit_sha: api.merge_commit_sha,
            milestone: api.milestone,
            labels: api.labels,
        }
    }
}
