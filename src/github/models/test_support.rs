//! Builders for webhook payload fixtures.
//!
//! Integration tests feed these payloads through the event router and the
//! webhook endpoint, so they are produced as raw JSON exactly like GitHub
//! would send them.
//!
//! # Examples
//!
//! ```
//! use butler::github::models::test_support::CommentEventBuilder;
//!
//! let event = CommentEventBuilder::new("octo/hello", "alice", "@butler hello")
//!     .installation(42)
//!     .pull_request(true)
//!     .build();
//! assert_eq!(event.installation.map(|i| i.id), Some(42));
//! ```

use serde_json::{Value, json};

use super::WebhookEvent;

/// Builds an `issue_comment` `created` delivery.
#[derive(Debug, Clone)]
pub struct CommentEventBuilder {
    repository: String,
    requester: String,
    body: String,
    installation_id: u64,
    issue_number: u64,
    issue_author: String,
    issue_title: String,
    issue_body: String,
    labels: Vec<String>,
    comment_id: u64,
    is_pull_request: bool,
}

impl CommentEventBuilder {
    /// Starts a delivery for `requester` commenting `body` on `repository`.
    ///
    /// Defaults: installation 1, issue #1 authored by the requester, comment
    /// id 100, not a pull request.
    #[must_use]
    pub fn new(repository: &str, requester: &str, body: &str) -> Self {
        Self {
            repository: repository.to_owned(),
            requester: requester.to_owned(),
            body: body.to_owned(),
            installation_id: 1,
            issue_number: 1,
            issue_author: requester.to_owned(),
            issue_title: "Sample issue".to_owned(),
            issue_body: "Sample body".to_owned(),
            labels: Vec::new(),
            comment_id: 100,
            is_pull_request: false,
        }
    }

    /// Sets the installation id.
    #[must_use]
    pub const fn installation(mut self, installation_id: u64) -> Self {
        self.installation_id = installation_id;
        self
    }

    /// Sets the issue number.
    #[must_use]
    pub const fn number(mut self, issue_number: u64) -> Self {
        self.issue_number = issue_number;
        self
    }

    /// Sets the issue author.
    #[must_use]
    pub fn author(mut self, author: &str) -> Self {
        author.clone_into(&mut self.issue_author);
        self
    }

    /// Sets the issue title.
    #[must_use]
    pub fn title(mut self, title: &str) -> Self {
        title.clone_into(&mut self.issue_title);
        self
    }

    /// Sets the issue body.
    #[must_use]
    pub fn issue_body(mut self, body: &str) -> Self {
        body.clone_into(&mut self.issue_body);
        self
    }

    /// Sets the labels applied to the issue.
    #[must_use]
    pub fn labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|label| (*label).to_owned()).collect();
        self
    }

    /// Sets the triggering comment id.
    #[must_use]
    pub const fn comment_id(mut self, comment_id: u64) -> Self {
        self.comment_id = comment_id;
        self
    }

    /// Marks the issue as a pull request.
    #[must_use]
    pub const fn pull_request(mut self, is_pull_request: bool) -> Self {
        self.is_pull_request = is_pull_request;
        self
    }

    /// Renders the delivery as raw JSON.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let (owner, name) = self
            .repository
            .split_once('/')
            .unwrap_or((self.repository.as_str(), ""));
        let labels: Vec<Value> = self
            .labels
            .iter()
            .map(|label| json!({ "name": label, "description": null }))
            .collect();
        let pull_request = if self.is_pull_request {
            json!({ "url": format!("https://api.github.com/repos/{}/pulls/{}", self.repository, self.issue_number) })
        } else {
            Value::Null
        };
        json!({
            "action": "created",
            "installation": { "id": self.installation_id },
            "repository": {
                "name": name,
                "full_name": self.repository,
                "owner": { "login": owner }
            },
            "sender": { "login": self.requester },
            "issue": {
                "number": self.issue_number,
                "title": self.issue_title,
                "body": self.issue_body,
                "user": { "login": self.issue_author },
                "labels": labels,
                "pull_request": pull_request
            },
            "comment": {
                "id": self.comment_id,
                "body": self.body,
                "user": { "login": self.requester },
                "html_url": format!("https://github.com/{}/issues/{}#issuecomment-{}", self.repository, self.issue_number, self.comment_id)
            }
        })
    }

    /// Decodes the delivery into a [`WebhookEvent`].
    ///
    /// # Panics
    ///
    /// Panics if the generated JSON does not decode, which would be a bug in
    /// this builder.
    #[must_use]
    #[expect(clippy::expect_used, reason = "fixture builder used only by tests")]
    pub fn build(&self) -> WebhookEvent {
        serde_json::from_value(self.to_json()).expect("fixture payload should decode")
    }
}
