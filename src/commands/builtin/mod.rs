//! The stock command set.

mod backport;
mod greetings;
mod help;
mod issue_state;
mod labels;
mod merge;
mod migrate;

use std::sync::Arc;

pub use backport::{Backport, BackportPlan, MANUAL_BACKPORT_LABEL};
pub use greetings::{Hello, Party, Say, Zen};
pub use help::Help;
pub use issue_state::SetState;
pub use labels::{LabelSelection, Ready, Tag, Untag, parse_label_arguments};
pub use merge::Merge;
pub use migrate::{Migrate, relink_body};

use super::{CommandSpec, RegistryBuilder};
use crate::github::IssueState;
use crate::permissions::PermissionLevel;

/// Adds every built-in command to `builder`, `help` last so it can list the
/// rest.
#[must_use]
pub fn register_all(builder: RegistryBuilder) -> RegistryBuilder {
    let populated = builder
        .single(
            CommandSpec::new("hello", PermissionLevel::None, "say hello"),
            Arc::new(Hello),
        )
        .single(
            CommandSpec::new("zen", PermissionLevel::None, "post the Zen of Python"),
            Arc::new(Zen),
        )
        .single(
            CommandSpec::new("party", PermissionLevel::None, "celebrate"),
            Arc::new(Party),
        )
        .single(
            CommandSpec::new("say", PermissionLevel::Write, "repeat the arguments"),
            Arc::new(Say),
        )
        .single(
            CommandSpec::new("close", PermissionLevel::Write, "close this issue"),
            Arc::new(SetState::new(IssueState::Closed)),
        )
        .single(
            CommandSpec::new("open", PermissionLevel::Write, "reopen this issue"),
            Arc::new(SetState::new(IssueState::Open)),
        )
        .single(
            CommandSpec::new("merge", PermissionLevel::Write, "merge this pull request"),
            Arc::new(Merge),
        )
        .single(
            CommandSpec::new(
                "ready",
                PermissionLevel::Write,
                "mark this pull request as ready for review",
            )
            .with_author_override(),
            Arc::new(Ready),
        )
        .single(
            CommandSpec::new("tag", PermissionLevel::Admin, "tag label[, label...]"),
            Arc::new(Tag),
        )
        .single(
            CommandSpec::new("untag", PermissionLevel::Admin, "untag label[, label...]"),
            Arc::new(Untag),
        )
        .multi_phase(
            CommandSpec::new("migrate", PermissionLevel::Write, "migrate [to] owner/name"),
            Arc::new(Migrate),
        )
        .single(
            CommandSpec::new("backport", PermissionLevel::Write, "backport [to] branch"),
            Arc::new(Backport),
        )
        .alias("safe_backport", "backport");

    let help_spec = CommandSpec::new("help", PermissionLevel::None, "list commands");
    let mut listing = populated.listing();
    listing.push((help_spec.name.clone(), help_spec.clone()));
    populated.single(help_spec, Arc::new(Help::new(listing)))
}
