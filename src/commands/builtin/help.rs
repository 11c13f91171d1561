//! `help`.

use std::fmt::Write as _;

use async_trait::async_trait;

use crate::commands::{Command, CommandContext, CommandSpec};
use crate::github::GitHubError;

/// Lists the registered commands, frozen when the registry was built.
#[derive(Debug, Clone)]
pub struct Help {
    listing: Vec<(String, CommandSpec)>,
}

impl Help {
    /// Creates the command over `(name, spec)` pairs.
    #[must_use]
    pub fn new(mut listing: Vec<(String, CommandSpec)>) -> Self {
        listing.sort_by(|left, right| left.0.cmp(&right.0));
        Self { listing }
    }

    /// Markdown table of commands.
    #[must_use]
    pub fn render(&self, bot_name: &str) -> String {
        let mut text = format!(
            "The following commands are available; mention @{bot_name} followed by one of them.\n\n\
             | command | permission | description |\n|---|---|---|\n"
        );
        for (name, spec) in &self.listing {
            let alias_note = if *name == spec.name {
                String::new()
            } else {
                format!(" (same as `{}`)", spec.name)
            };
            let override_note = if spec.allow_pr_author_override {
                ", or pull request author"
            } else {
                ""
            };
            let _infallible = writeln!(
                text,
                "| `{name}` | {}{override_note} | {}{alias_note} |",
                spec.min_scope, spec.summary
            );
        }
        text
    }
}

#[async_trait]
impl Command for Help {
    async fn execute(&self, context: &CommandContext) -> Result<(), GitHubError> {
        context.reply(&self.render(&context.bot_name)).await
    }
}
