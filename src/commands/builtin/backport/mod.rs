//! `backport`: replays a merged pull request onto a maintenance branch.
//!
//! The GitHub-side preparation (branch resolution, fork) runs inline. The git
//! work and the resulting pull request run on the worker pool so intake is
//! never held up by a clone.

mod git;

use std::sync::Arc;

use async_trait::async_trait;

pub use git::{CherryPick, PickOutcome, RemoteCredentials, RemoteSpec};

use crate::auth::{PersonalAccount, TenantSession};
use crate::commands::{Command, CommandContext};
use crate::dispatch::{MentionContext, WorkerPool};
use crate::github::{GitHubError, RepositoryClient};

/// Label marking pull requests whose backport needs a human.
pub const MANUAL_BACKPORT_LABEL: &str = "Still Needs Manual Backport";

const TOKEN_USERNAME: &str = "x-access-token";

/// Derives the maintenance branch from a milestone title by replacing the
/// last dotted component with `x`, so `4.2.1` becomes `4.2.x`.
#[must_use]
pub fn branch_from_milestone(title: &str) -> Option<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return None;
    }
    let prefix = trimmed.rsplit_once('.').map_or("", |(head, _)| head);
    Some(if prefix.is_empty() {
        "x".to_owned()
    } else {
        format!("{prefix}.x")
    })
}

/// Everything needed to describe one backport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackportPlan {
    /// Number of the merged pull request.
    pub number: u64,
    /// Its title.
    pub title: String,
    /// Branch to backport onto.
    pub branch: String,
    /// Its merge commit.
    pub merge_sha: String,
    /// Milestone to copy onto the backport.
    pub milestone: Option<u64>,
    /// Labels to copy onto the backport.
    pub labels: Vec<String>,
}

impl BackportPlan {
    /// Message of the backport commit, also the pull request body.
    #[must_use]
    pub fn commit_message(&self) -> String {
        format!("Backport PR #{}: {}", self.number, self.title)
    }

    /// Title of the backport pull request.
    #[must_use]
    pub fn pull_request_title(&self) -> String {
        format!(
            "Backport PR #{} on branch {} ({})",
            self.number, self.branch, self.title
        )
    }

    /// Branch pushed to the fork.
    #[must_use]
    pub fn remote_branch(&self) -> String {
        format!("auto-backport-of-pr-{}-on-{}", self.number, self.branch)
    }

    fn conflict_instructions(&self) -> String {
        format!(
            "There seems to be a conflict, please backport manually. Here are approximate instructions:\n\n\
             1. Check out the backport branch and update it.\n\n\
             ```\ngit checkout {branch}\ngit pull\n```\n\n\
             2. Cherry-pick the first parent of this pull request's merge onto it:\n\n\
             ```\ngit cherry-pick -x -m1 {sha}\n```\n\n\
             3. Fix the conflicts and commit:\n\n\
             ```\ngit commit -am {message:?}\n```\n\n\
             4. Push to a named branch:\n\n\
             ```\ngit push YOURFORK {branch}:{remote}\n```\n\n\
             5. Open a pull request against `{branch}`. I would have named it:\n\n\
             > \"{title}\"\n\n\
             and applied the same labels and milestone.\n\n\
             Remember to remove the `{label}` label once that pull request is merged.",
            branch = self.branch,
            sha = self.merge_sha,
            message = self.commit_message(),
            remote = self.remote_branch(),
            title = self.pull_request_title(),
            label = MANUAL_BACKPORT_LABEL,
        )
    }
}

/// The `backport` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct Backport;

#[async_trait]
impl Command for Backport {
    async fn execute(&self, context: &CommandContext) -> Result<(), GitHubError> {
        let Some(personal) = context.session.personal_account().cloned() else {
            tracing::warn!("backport requested on {} without a personal account", context.mention.repository);
            return context
                .reply("I can't backport here: no personal account is configured for opening backport pull requests.")
                .await;
        };
        let thread = &context.mention.thread;
        if !thread.is_pull_request {
            return context.reply("Only pull requests can be backported.").await;
        }

        let client = context.client();
        let info = client.repository_info().await?;
        let branches: Vec<String> = client
            .branches()
            .await?
            .into_iter()
            .map(|branch| branch.name)
            .collect();
        let detail = client.pull_request(thread.number).await?;
        let Some(merge_sha) = detail.merge_commit_sha.clone() else {
            return context
                .reply("This pull request has no merge commit yet, so there is nothing to backport.")
                .await;
        };

        let raw = context.arguments();
        let requested = raw.strip_prefix("to ").unwrap_or(raw).trim();
        let mut branch = match requested.strip_suffix('.') {
            Some(stripped) if !branches.iter().any(|known| known == requested) => {
                stripped.to_owned()
            }
            _ => requested.to_owned(),
        };
        if branch.is_empty() {
            let milestone = detail.milestone.as_ref().or(thread.milestone.as_ref());
            match milestone.and_then(|found| branch_from_milestone(&found.title)) {
                Some(inferred) => {
                    tracing::info!("inferred backport branch {inferred} from the milestone");
                    branch = inferred;
                }
                None => {
                    return context
                        .reply("Which branch should I backport to? Try `backport to <branch>`.")
                        .await;
                }
            }
        }
        let branch_known = branches.contains(&branch);
        if !branch_known {
            tracing::warn!("backport target {branch} is not a branch of {}", context.mention.repository);
        }

        let labels_source = if detail.labels.is_empty() {
            &thread.labels
        } else {
            &detail.labels
        };
        let plan = BackportPlan {
            number: detail.number,
            title: detail.title.clone(),
            branch,
            merge_sha,
            milestone: detail.milestone.as_ref().map(|milestone| milestone.number),
            labels: labels_source
                .iter()
                .map(|label| label.name.clone())
                .filter(|name| name != MANUAL_BACKPORT_LABEL)
                .collect(),
        };

        let fork = client.fork_as_personal().await?;
        let token = context.session.token().await?;
        let origin_url = info
            .clone_url
            .unwrap_or_else(|| format!("https://github.com/{}.git", context.mention.repository));

        let job = BackportJob {
            session: Arc::clone(&context.session),
            mention: Arc::clone(&context.mention),
            pick: CherryPick {
                origin: RemoteSpec {
                    url: origin_url,
                    credentials: Some(RemoteCredentials::new(TOKEN_USERNAME.to_owned(), token)),
                },
                fork: RemoteSpec {
                    url: fork.clone_url,
                    credentials: Some(RemoteCredentials::new(
                        personal.login().to_owned(),
                        personal.token().clone(),
                    )),
                },
                branch: plan.branch.clone(),
                default_branch: info.default_branch,
                commit: plan.merge_sha.clone(),
                remote_branch: plan.remote_branch(),
                message: plan.commit_message(),
                committer_name: format!("{}[bot]", context.bot_name),
                committer_email: format!("{}[bot]@users.noreply.github.com", context.bot_name),
            },
            plan,
            personal,
            branch_known,
        };
        let label = format!(
            "backport of {}#{} to {}",
            context.mention.repository, job.plan.number, job.plan.branch
        );
        context.workers.submit(label, job.run())
    }
}

/// The part of a backport that runs on the worker pool.
struct BackportJob {
    session: Arc<TenantSession>,
    mention: Arc<MentionContext>,
    pick: CherryPick,
    plan: BackportPlan,
    personal: PersonalAccount,
    branch_known: bool,
}

impl BackportJob {
    async fn run(self) -> Result<(), GitHubError> {
        let pick = self.pick.clone();
        let outcome = WorkerPool::run_blocking(move || pick.run()).await;
        let client = RepositoryClient::new(&self.session, &self.mention.repository);
        let issue = self.mention.thread.number;

        match outcome {
            Ok(PickOutcome::AlreadyApplied) => {
                client
                    .post_comment(
                        issue,
                        "This seems to be already backported (the cherry-pick is empty). I won't do anything.",
                    )
                    .await
            }
            Ok(PickOutcome::Conflict) => {
                client
                    .post_comment(issue, &self.plan.conflict_instructions())
                    .await?;
                client
                    .add_labels(issue, &[MANUAL_BACKPORT_LABEL.to_owned()])
                    .await
            }
            Ok(PickOutcome::Pushed) => self.open_pull_request(client).await,
            Err(error) => {
                let hint = if self.branch_known {
                    ""
                } else {
                    "\n\nIt seems that the branch you are trying to backport to does not exist."
                };
                client
                    .post_comment(
                        issue,
                        &format!("Something went wrong backporting this pull request; please have a look at my logs.{hint}"),
                    )
                    .await?;
                Err(error)
            }
        }
    }

    async fn open_pull_request(&self, client: RepositoryClient<'_>) -> Result<(), GitHubError> {
        let head = format!("{}:{}", self.personal.login(), self.plan.remote_branch());
        let created = client
            .open_pull_request_as_personal(
                &self.plan.pull_request_title(),
                &self.plan.commit_message(),
                &head,
                &self.plan.branch,
            )
            .await?;
        client
            .update_issue(created.number, self.plan.milestone, &self.plan.labels)
            .await?;
        tracing::info!(
            "backported {}#{} as #{}",
            self.mention.repository,
            self.plan.number,
            created.number
        );
        Ok(())
    }
}
