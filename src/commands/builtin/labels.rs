//! `tag`, `untag`, and `ready`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::commands::{Command, CommandContext};
use crate::github::{GitHubError, RepositoryClient};

const NEED_REVIEW: &str = "need review";
const WAITING_FOR_AUTHOR: &str = "waiting for author";

/// Splits `tag` arguments into label names: comma-separated words followed by
/// any quoted names. Single and double quotes are equivalent.
#[must_use]
pub fn parse_label_arguments(arguments: &str) -> Vec<String> {
    let normalised = arguments.replace('\'', "\"");
    let segments: Vec<&str> = normalised.split('"').collect();
    let count = segments.len();
    let mut plain = Vec::new();
    let mut quoted = Vec::new();
    let mut inside_quotes = false;
    for (index, segment) in segments.into_iter().enumerate() {
        let is_last = index + 1 == count;
        if inside_quotes && !is_last {
            if !segment.is_empty() {
                quoted.push(segment.to_owned());
            }
        } else {
            plain.extend(
                segment
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(str::to_owned),
            );
        }
        inside_quotes = !inside_quotes;
    }
    plain.extend(quoted);
    plain
}

/// Which requested labels may be applied, after matching against the
/// repository's labels and the grant's `only`/`any` configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelection {
    /// Canonical names to apply.
    pub apply: Vec<String>,
    /// Requested names that were refused or unknown.
    pub refused: Vec<String>,
}

impl LabelSelection {
    /// Matches `requested` case-insensitively against `known` and filters the
    /// matches through `local_config`.
    #[must_use]
    pub fn select(requested: &[String], known: &[String], local_config: Option<&Value>) -> Self {
        let by_lowercase: HashMap<String, &String> = known
            .iter()
            .map(|name| (name.to_lowercase(), name))
            .collect();

        let mut selection = Self::default();
        for name in requested {
            match by_lowercase.get(&name.to_lowercase()) {
                Some(canonical) => selection.apply.push((*canonical).clone()),
                None => selection.refused.push(name.clone()),
            }
        }

        if let Some(only) = restriction(local_config) {
            let (allowed, refused): (Vec<String>, Vec<String>) = selection
                .apply
                .into_iter()
                .partition(|name| only.contains(&name.to_lowercase()));
            selection.apply = allowed;
            selection.refused.extend(refused);
        }
        selection
    }
}

/// The lower-cased `only` list, unless `any` is set or the list is empty.
fn restriction(local_config: Option<&Value>) -> Option<Vec<String>> {
    let config = local_config?;
    if config.get("any").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }
    let only: Vec<String> = config
        .get("only")?
        .as_array()?
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_lowercase)
        .collect();
    (!only.is_empty()).then_some(only)
}

/// `tag`: applies existing labels.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tag;

#[async_trait]
impl Command for Tag {
    async fn execute(&self, context: &CommandContext) -> Result<(), GitHubError> {
        let requested = parse_label_arguments(context.arguments());
        if requested.is_empty() {
            return Ok(());
        }
        let client = context.client();
        let known: Vec<String> = client
            .labels()
            .await?
            .into_iter()
            .map(|label| label.name)
            .collect();
        let selection = LabelSelection::select(&requested, &known, context.local_config.as_ref());
        tracing::debug!(
            "tag on {}: applying {:?}, refusing {:?}",
            context.mention.repository,
            selection.apply,
            selection.refused
        );

        let issue = context.mention.thread.number;
        if !selection.apply.is_empty() {
            client.add_labels(issue, &selection.apply).await?;
        }
        if !selection.refused.is_empty() {
            context
                .reply(&format!(
                    "Aww {}, I was not able to apply the following label(s): `{}`. Either they \
                     are not existing labels on this repository or you do not have the \
                     permission to apply them. I tried matching them regardless of casing, but \
                     could not find matching labels.",
                    context.requester(),
                    selection.refused.join("`,`")
                ))
                .await?;
        }
        Ok(())
    }
}

/// `untag`: removes labels, ignoring ones that are not applied.
#[derive(Debug, Default, Clone, Copy)]
pub struct Untag;

#[async_trait]
impl Command for Untag {
    async fn execute(&self, context: &CommandContext) -> Result<(), GitHubError> {
        let names: Vec<&str> = context
            .arguments()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect();
        let client = context.client();
        let mut failed = Vec::new();
        for name in names {
            if let Err(error) = remove(client, context.mention.thread.number, name).await {
                if error.is_credential_failure() {
                    return Err(error);
                }
                failed.push(name);
            }
        }
        if !failed.is_empty() {
            tracing::warn!("could not remove labels {failed:?} from {}", context.mention.repository);
        }
        Ok(())
    }
}

/// `ready`: asks for review and stops waiting on the author.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ready;

#[async_trait]
impl Command for Ready {
    async fn execute(&self, context: &CommandContext) -> Result<(), GitHubError> {
        let client = context.client();
        let issue = context.mention.thread.number;
        client.add_labels(issue, &[NEED_REVIEW.to_owned()]).await?;
        remove(client, issue, WAITING_FOR_AUTHOR).await
    }
}

/// Removes `name`, treating an unapplied label as success.
async fn remove(client: RepositoryClient<'_>, issue: u64, name: &str) -> Result<(), GitHubError> {
    match client.remove_label(issue, name).await {
        Err(error) if error.is_not_found() => Ok(()),
        other => other,
    }
}
