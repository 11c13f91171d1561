//! `merge`.

use async_trait::async_trait;

use crate::commands::{Command, CommandContext};
use crate::github::GitHubError;

/// Merges the pull request at the head GitHub last reported.
#[derive(Debug, Default, Clone, Copy)]
pub struct Merge;

#[async_trait]
impl Command for Merge {
    async fn execute(&self, context: &CommandContext) -> Result<(), GitHubError> {
        let thread = &context.mention.thread;
        if !thread.is_pull_request {
            return context.reply("I can only merge pull requests.").await;
        }

        let client = context.client();
        let detail = client.pull_request(thread.number).await?;
        match detail.mergeable {
            Some(true) => {
                tracing::info!(
                    "merging {}#{} at {}",
                    context.mention.repository,
                    detail.number,
                    detail.head_sha
                );
                client.merge_pull_request(detail.number, &detail.head_sha).await
            }
            Some(false) => {
                context
                    .reply("GitHub says this pull request cannot be merged. Please resolve the conflicts or failing requirements first.")
                    .await
            }
            None => {
                context
                    .reply("GitHub is still working out whether this pull request can be merged. Please ask again in a moment.")
                    .await
            }
        }
    }
}
