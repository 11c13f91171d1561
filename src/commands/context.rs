//! What a handler receives when it runs.

use std::sync::Arc;

use serde_json::Value;

use crate::auth::TenantSession;
use crate::dispatch::{MentionContext, WorkerPool};
use crate::github::{GitHubError, RepositoryClient};

/// Per-invocation handler input.
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Session on the repository the mention was posted in.
    pub session: Arc<TenantSession>,
    /// Where and by whom the bot was addressed.
    pub mention: Arc<MentionContext>,
    /// Argument text following the command name.
    pub arguments: Option<String>,
    /// Per-command configuration from a policy grant.
    pub local_config: Option<Value>,
    /// Pool for slow work.
    pub workers: WorkerPool,
    /// Bot login without `@`.
    pub bot_name: String,
}

impl CommandContext {
    /// Endpoint helpers for the mention's repository.
    #[must_use]
    pub fn client(&self) -> RepositoryClient<'_> {
        RepositoryClient::new(&self.session, &self.mention.repository)
    }

    /// Argument text, empty when none was given.
    #[must_use]
    pub fn arguments(&self) -> &str {
        self.arguments.as_deref().unwrap_or_default()
    }

    /// Login of the requester.
    #[must_use]
    pub fn requester(&self) -> &str {
        &self.mention.requester
    }

    /// Posts `body` on the mention's thread.
    ///
    /// # Errors
    ///
    /// Returns session and API errors.
    pub async fn reply(&self, body: &str) -> Result<(), GitHubError> {
        self.client()
            .post_comment(self.mention.thread.number, body)
            .await
    }
}
