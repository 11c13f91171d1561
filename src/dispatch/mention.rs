//! Request-scoped facts about one mention.

use crate::github::models::{Label, Milestone, WebhookPullRequest};
use crate::github::{GitHubError, InstallationId, RepositorySlug, WebhookEvent};

/// The issue or pull request a mention was posted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    /// Issue or pull request number.
    pub number: u64,
    /// Title.
    pub title: String,
    /// Markdown body, empty when GitHub sent none.
    pub body: String,
    /// Login of the thread author.
    pub author: String,
    /// Applied labels.
    pub labels: Vec<Label>,
    /// Milestone, if any.
    pub milestone: Option<Milestone>,
    /// True when the thread is a pull request.
    pub is_pull_request: bool,
}

impl ThreadInfo {
    /// Names of the applied labels.
    #[must_use]
    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|label| label.name.clone()).collect()
    }
}

/// Everything a dispatch needs to know about where and by whom the bot was
/// addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionContext {
    /// Installation the delivery belongs to.
    pub installation: InstallationId,
    /// Repository the mention was posted in.
    pub repository: RepositorySlug,
    /// Login of the user addressing the bot.
    pub requester: String,
    /// The thread the mention was posted on.
    pub thread: ThreadInfo,
    /// Id of the comment carrying the mention; absent for synthetic mentions.
    pub trigger_comment_id: Option<u64>,
}

impl MentionContext {
    /// Builds the context of a comment webhook.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Decode`] when the installation, repository,
    /// issue, or comment block is missing, and
    /// [`GitHubError::InvalidRepository`] for a malformed repository name.
    pub fn from_comment_event(event: &WebhookEvent) -> Result<Self, GitHubError> {
        let installation = installation_of(event)?;
        let repository = repository_of(event)?;
        let issue = event.issue.as_ref().ok_or_else(|| missing("issue"))?;
        let comment = event.comment.as_ref().ok_or_else(|| missing("comment"))?;

        Ok(Self {
            installation,
            repository,
            requester: comment.user.login.clone(),
            thread: ThreadInfo {
                number: issue.number,
                title: issue.title.clone(),
                body: issue.body.clone().unwrap_or_default(),
                author: issue.user.login.clone(),
                labels: issue.labels.clone(),
                milestone: issue.milestone.clone(),
                is_pull_request: issue.is_pull_request(),
            },
            trigger_comment_id: Some(comment.id),
        })
    }

    /// Builds a synthetic mention by `merged_by` on a merged pull request.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Decode`] when the installation or repository
    /// block is missing.
    pub fn from_merged_pull_request(
        event: &WebhookEvent,
        pull_request: &WebhookPullRequest,
        merged_by: &str,
    ) -> Result<Self, GitHubError> {
        Ok(Self {
            installation: installation_of(event)?,
            repository: repository_of(event)?,
            requester: merged_by.to_owned(),
            thread: ThreadInfo {
                number: pull_request.number,
                title: pull_request.title.clone(),
                body: pull_request.body.clone().unwrap_or_default(),
                author: pull_request.user.login.clone(),
                labels: pull_request.labels.clone(),
                milestone: pull_request.milestone.clone(),
                is_pull_request: true,
            },
            trigger_comment_id: None,
        })
    }
}

fn missing(block: &str) -> GitHubError {
    GitHubError::Decode {
        message: format!("webhook payload has no {block} block"),
    }
}

fn installation_of(event: &WebhookEvent) -> Result<InstallationId, GitHubError> {
    event
        .installation
        .as_ref()
        .map(|installation| InstallationId::new(installation.id))
        .ok_or_else(|| missing("installation"))
}

fn repository_of(event: &WebhookEvent) -> Result<RepositorySlug, GitHubError> {
    let repository = event
        .repository
        .as_ref()
        .ok_or_else(|| missing("repository"))?;
    RepositorySlug::parse(&format!("{}/{}", repository.owner.login, repository.name))
}
