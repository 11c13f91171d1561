//! Routes decoded webhook deliveries to the dispatcher and the directory.

use std::sync::Arc;

use super::{DispatchReport, Dispatcher, MentionContext};
use crate::github::models::WebhookPullRequest;
use crate::github::{InstallationId, WebhookEvent};

const ON_MERGE_PREFIX: &str = "on-merge:";
const MERGE_BASES: [&str; 2] = ["main", "master"];

/// One queued delivery: the `X-GitHub-Event` kind and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Event kind such as `issue_comment` or `pull_request`.
    pub kind: String,
    /// Decoded payload.
    pub event: WebhookEvent,
}

impl Delivery {
    /// Pairs a kind with its payload.
    #[must_use]
    pub fn new(kind: impl Into<String>, event: WebhookEvent) -> Self {
        Self {
            kind: kind.into(),
            event,
        }
    }
}

/// What the router did with a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Nothing to do, with the reason.
    Ignored(&'static str),
    /// Mentions were dispatched; one report per dispatched body.
    Dispatched(Vec<DispatchReport>),
    /// An installation's repositories were re-listed.
    Refreshed {
        /// The refreshed installation.
        installation: InstallationId,
        /// Repositories it now covers.
        repositories: usize,
    },
    /// An installation was removed and its entries marked stale.
    MarkedStale(InstallationId),
}

/// Decides which deliveries deserve attention.
#[derive(Debug)]
pub struct EventRouter {
    dispatcher: Arc<Dispatcher>,
    denylist: Vec<String>,
}

impl EventRouter {
    /// Routes through `dispatcher`, ignoring senders in `denylist`.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, denylist: &[String]) -> Self {
        Self {
            dispatcher,
            denylist: denylist
                .iter()
                .map(|login| login.trim().to_lowercase())
                .filter(|login| !login.is_empty())
                .collect(),
        }
    }

    /// The dispatcher deliveries end up in.
    #[must_use]
    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Handles one delivery to completion.
    pub async fn route(&self, delivery: &Delivery) -> RouteOutcome {
        let event = &delivery.event;
        if let Some(reason) = self.sender_filter(event) {
            return RouteOutcome::Ignored(reason);
        }
        let action = event.action.as_deref().unwrap_or_default();

        match (delivery.kind.as_str(), action) {
            ("issue_comment", "created") => self.on_comment(event).await,
            ("installation" | "installation_repositories", "created" | "added" | "removed")
            | ("installation", "unsuspend") => {
                self.on_installation(event).await
            }
            ("installation", "deleted" | "suspend") => event
                .installation
                .as_ref()
                .map_or(RouteOutcome::Ignored("installation event without id"), |found| {
                    let installation = InstallationId::new(found.id);
                    self.dispatcher.directory().mark_stale(installation);
                    RouteOutcome::MarkedStale(installation)
                }),
            ("pull_request", "closed") => self.on_closed_pull_request(event).await,
            _ => {
                tracing::debug!("ignoring {} event with action {action:?}", delivery.kind);
                RouteOutcome::Ignored("unhandled event")
            }
        }
    }

    fn sender_filter(&self, event: &WebhookEvent) -> Option<&'static str> {
        let sender = event.sender.as_ref()?.login.to_lowercase();
        if self.denylist.contains(&sender) {
            tracing::info!("ignoring event from denylisted {sender}");
            return Some("sender is denylisted");
        }
        let own = format!("{}[bot]", self.dispatcher.bot_name().to_lowercase());
        if sender == own {
            return Some("event from this bot");
        }
        if sender.ends_with("[bot]") {
            tracing::debug!("not responding to another bot ({sender})");
            return Some("event from another bot");
        }
        None
    }

    async fn on_comment(&self, event: &WebhookEvent) -> RouteOutcome {
        let Some(body) = event
            .comment
            .as_ref()
            .and_then(|comment| comment.body.as_deref())
        else {
            return RouteOutcome::Ignored("comment without body");
        };
        if !self.dispatcher.parser().mentions(body) {
            return RouteOutcome::Ignored("bot not mentioned");
        }
        match MentionContext::from_comment_event(event) {
            Ok(mention) => RouteOutcome::Dispatched(vec![self.dispatcher.dispatch(mention, body).await]),
            Err(error) => {
                tracing::warn!("cannot dispatch comment: {error}");
                RouteOutcome::Ignored("malformed comment payload")
            }
        }
    }

    async fn on_installation(&self, event: &WebhookEvent) -> RouteOutcome {
        let Some(found) = event.installation.as_ref() else {
            return RouteOutcome::Ignored("installation event without id");
        };
        let installation = InstallationId::new(found.id);
        tracing::info!("installation {installation} gained repositories; refreshing");
        self.dispatcher
            .directory()
            .refresh_installation(installation)
            .await
            .map_or_else(
                |error| {
                    tracing::warn!("refreshing installation {installation} failed: {error}");
                    RouteOutcome::Ignored("installation refresh failed")
                },
                |repositories| RouteOutcome::Refreshed {
                    installation,
                    repositories,
                },
            )
    }

    async fn on_closed_pull_request(&self, event: &WebhookEvent) -> RouteOutcome {
        let Some(pull_request) = event.pull_request.as_ref() else {
            return RouteOutcome::Ignored("closed event without pull request");
        };
        let Some(merged_by) = pull_request
            .merged_by
            .as_ref()
            .filter(|_| pull_request.merged)
            .map(|account| account.login.as_str())
        else {
            return RouteOutcome::Ignored("closed without merging");
        };
        if !MERGE_BASES.contains(&pull_request.base.name.as_str()) {
            tracing::debug!(
                "pull request #{} merged into {}; on-merge commands only run for main/master",
                pull_request.number,
                pull_request.base.name
            );
            return RouteOutcome::Ignored("merged outside main/master");
        }
        let commands = on_merge_commands(pull_request);
        if commands.is_empty() {
            return RouteOutcome::Ignored("no on-merge commands");
        }

        let mut reports = Vec::with_capacity(commands.len());
        for command in commands {
            let mention = match MentionContext::from_merged_pull_request(event, pull_request, merged_by) {
                Ok(mention) => mention,
                Err(error) => {
                    tracing::warn!("cannot run on-merge commands: {error}");
                    return RouteOutcome::Ignored("malformed pull request payload");
                }
            };
            tracing::info!(
                "running on-merge `{command}` for #{} as {merged_by}",
                pull_request.number
            );
            let body = format!("@{} {command}", self.dispatcher.bot_name());
            reports.push(self.dispatcher.dispatch(mention, &body).await);
        }
        RouteOutcome::Dispatched(reports)
    }
}

/// Commands attached to a pull request through `on-merge:` lines in its
/// label descriptions and milestone description.
///
/// In label descriptions `&` separates lines, since GitHub keeps label
/// descriptions on one line.
#[must_use]
pub fn on_merge_commands(pull_request: &WebhookPullRequest) -> Vec<String> {
    let label_text = pull_request
        .labels
        .iter()
        .filter_map(|label| label.description.as_deref())
        .map(|description| description.replace('&', "\n"));
    let milestone_text = pull_request
        .milestone
        .as_ref()
        .and_then(|milestone| milestone.description.clone());

    label_text
        .chain(milestone_text)
        .flat_map(|text| {
            text.lines()
                .filter_map(|line| line.trim().strip_prefix(ON_MERGE_PREFIX))
                .map(str::trim)
                .filter(|command| !command.is_empty())
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .collect()
}
