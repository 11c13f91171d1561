//! `open` and `close`.

use async_trait::async_trait;

use crate::commands::{Command, CommandContext};
use crate::github::{GitHubError, IssueState};

/// Moves the mention's thread to a fixed state.
#[derive(Debug, Clone, Copy)]
pub struct SetState {
    state: IssueState,
}

impl SetState {
    /// Creates the command for `state`.
    #[must_use]
    pub const fn new(state: IssueState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Command for SetState {
    async fn execute(&self, context: &CommandContext) -> Result<(), GitHubError> {
        context
            .client()
            .set_issue_state(context.mention.thread.number, self.state)
            .await
    }
}
