//! `migrate`: moves an issue to another repository.
//!
//! The command suspends on the target repository. With a session there it
//! recreates the issue, its comments, and whichever labels the target also
//! defines, then closes the original.

use std::collections::HashMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use crate::commands::{
    CommandContext, MultiPhaseCommand, Phase, SecondaryGrant, SuspensionRequest, SuspensionToken,
};
use crate::github::{GitHubError, IssueState, RepositoryClient, RepositorySlug};

/// Bare `#123` references at the start of the text or after `:`, `,`, or
/// whitespace. `owner/repo#123` already points somewhere and is left alone.
#[expect(clippy::expect_used, reason = "the pattern is a literal")]
fn bare_reference() -> &'static Regex {
    static PATTERN: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(^|[:,\s])(#\d+)\b").expect("reference pattern is valid")
    });
    &PATTERN
}

/// Qualifies bare issue references in `body` with `origin`, so they keep
/// pointing at the original repository once moved.
///
/// # Example
///
/// ```
/// use butler::commands::builtin::relink_body;
/// use butler::github::RepositorySlug;
///
/// let origin = RepositorySlug::parse("octo/hello").expect("valid slug");
/// assert_eq!(
///     relink_body("see #12, other/repo#3", &origin),
///     "see octo/hello#12, other/repo#3"
/// );
/// ```
#[must_use]
pub fn relink_body(body: &str, origin: &RepositorySlug) -> String {
    bare_reference()
        .replace_all(body, format!("${{1}}{origin}${{2}}").as_str())
        .into_owned()
}

fn migrated_issue_body(context: &CommandContext) -> String {
    let mention = &context.mention;
    format!(
        "{}\n\n----\n\nOriginally opened as {}#{} by @{}, migration requested by @{}\n",
        relink_body(&mention.thread.body, &mention.repository),
        mention.repository,
        mention.thread.number,
        mention.thread.author,
        mention.requester
    )
}

fn migrated_comment_body(author: &str, url: &str, body: &str, origin: &RepositorySlug) -> String {
    format!("[`@{author}` commented]({url}): {}", relink_body(body, origin))
}

/// The `migrate` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct Migrate;

#[async_trait]
impl MultiPhaseCommand for Migrate {
    async fn start(&self, context: &CommandContext) -> Result<Phase, GitHubError> {
        if context.mention.thread.is_pull_request {
            context.reply("Only issues can be migrated.").await?;
            return Ok(Phase::Done);
        }
        let raw = context.arguments();
        let target = raw.strip_prefix("to ").unwrap_or(raw).trim();
        if target.is_empty() {
            context
                .reply("Tell me where to migrate this issue: `migrate to owner/name`.")
                .await?;
            return Ok(Phase::Done);
        }
        Ok(Phase::Suspend(SuspensionRequest::new(target)))
    }

    async fn resume(
        &self,
        context: &CommandContext,
        token: SuspensionToken,
        grant: SecondaryGrant,
    ) -> Result<(), GitHubError> {
        let session = match grant {
            SecondaryGrant::Denied(reason) => {
                tracing::info!("migration of {} to {} refused: {reason}", context.mention.repository, token.target());
                return context
                    .reply(&format!(
                        "I'm afraid I can't do that. Maybe I need to be installed on target repository?\n\
                         Click [here](https://github.com/apps/{}/installations/new) to do that.",
                        context.bot_name
                    ))
                    .await;
            }
            SecondaryGrant::Session(session) => session,
        };
        let target = token
            .repository()
            .cloned()
            .ok_or_else(|| GitHubError::InvalidRepository(token.target().to_owned()))?;
        let origin = context.client();
        let destination = RepositoryClient::new(&session, &target);
        let thread = &context.mention.thread;

        let (labels, unset) = if thread.labels.is_empty() {
            (Vec::new(), Vec::new())
        } else {
            let available = destination.labels().await?;
            split_labels(&thread.label_names(), available.into_iter().map(|label| label.name))
        };

        let created = destination
            .create_issue(&thread.title, &migrated_issue_body(context), &labels)
            .await?;

        for comment in origin.issue_comments(thread.number).await? {
            if Some(comment.id) == context.mention.trigger_comment_id {
                continue;
            }
            let body = migrated_comment_body(
                &comment.user.login,
                comment.html_url.as_deref().unwrap_or_default(),
                comment.body.as_deref().unwrap_or_default(),
                &context.mention.repository,
            );
            destination.post_comment(created.number, &body).await?;
        }

        if !unset.is_empty() {
            destination
                .post_comment(
                    created.number,
                    &format!("I was not able to apply the following label(s): {}", unset.join(",")),
                )
                .await?;
        }

        context
            .reply(&format!("Done as {target}#{}.", created.number))
            .await?;
        origin.set_issue_state(thread.number, IssueState::Closed).await?;
        tracing::info!(
            "migrated {}#{} to {target}#{}",
            context.mention.repository,
            thread.number,
            created.number
        );
        Ok(())
    }
}

/// Splits `wanted` into labels the target defines (in the target's casing)
/// and labels it lacks.
fn split_labels(
    wanted: &[String],
    available: impl Iterator<Item = String>,
) -> (Vec<String>, Vec<String>) {
    let by_lowercase: HashMap<String, String> =
        available.map(|name| (name.to_lowercase(), name)).collect();
    let mut present = Vec::new();
    let mut missing = Vec::new();
    for name in wanted {
        match by_lowercase.get(&name.to_lowercase()) {
            Some(canonical) => present.push(canonical.clone()),
            None => missing.push(name.clone()),
        }
    }
    (present, missing)
}
