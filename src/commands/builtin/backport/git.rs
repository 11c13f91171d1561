//! The git half of a backport: fetch, cherry-pick in memory, push.
//!
//! Everything here blocks and runs inside `spawn_blocking`. The scratch
//! repository is bare and lives in a temporary directory removed on drop.

use git2::{Cred, FetchOptions, Oid, PushOptions, RemoteCallbacks, Repository, Signature};
use secrecy::{ExposeSecret, SecretString};

use crate::github::GitHubError;

const LOCAL_BRANCH: &str = "refs/heads/backport";

/// HTTPS basic credentials for one remote.
#[derive(Clone)]
pub struct RemoteCredentials {
    username: String,
    secret: SecretString,
}

impl RemoteCredentials {
    /// Wraps a username and token.
    #[must_use]
    pub const fn new(username: String, secret: SecretString) -> Self {
        Self { username, secret }
    }
}

impl std::fmt::Debug for RemoteCredentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RemoteCredentials")
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// A remote URL with optional credentials.
#[derive(Debug, Clone)]
pub struct RemoteSpec {
    /// Clone URL or local path.
    pub url: String,
    /// Credentials, when the remote needs them.
    pub credentials: Option<RemoteCredentials>,
}

/// What happened when the commit was replayed onto the branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickOutcome {
    /// The commit applied and was pushed to the fork.
    Pushed,
    /// The branch already contains the change.
    AlreadyApplied,
    /// The change does not apply cleanly.
    Conflict,
}

/// One cherry-pick of `commit` onto `branch`, pushed to `remote_branch` on
/// the fork.
#[derive(Debug, Clone)]
pub struct CherryPick {
    /// Repository the pull request was merged into.
    pub origin: RemoteSpec,
    /// Fork receiving the backport branch.
    pub fork: RemoteSpec,
    /// Branch to backport onto.
    pub branch: String,
    /// Default branch, fetched so the merge commit is reachable.
    pub default_branch: String,
    /// Merge commit of the pull request.
    pub commit: String,
    /// Branch name to create on the fork.
    pub remote_branch: String,
    /// Message of the backport commit.
    pub message: String,
    /// Committer name.
    pub committer_name: String,
    /// Committer email.
    pub committer_email: String,
}

impl CherryPick {
    /// Runs the cherry-pick in a scratch repository.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Git`] when fetching, committing, or pushing
    /// fails, and [`GitHubError::Io`] when the scratch directory cannot be
    /// created.
    pub fn run(&self) -> Result<PickOutcome, GitHubError> {
        let scratch = tempfile::tempdir()?;
        let repository = Repository::init_bare(scratch.path())?;
        self.fetch(&repository)?;

        let ours = repository
            .find_reference(&format!("refs/remotes/origin/{}", self.branch))?
            .peel_to_commit()?;
        let picked = repository.find_commit(Oid::from_str(&self.commit)?)?;
        let mainline = u32::from(picked.parent_count() > 1);
        tracing::debug!(
            "cherry-picking {} onto {} (mainline {mainline})",
            self.commit,
            self.branch
        );

        let mut index = repository.cherrypick_commit(&picked, &ours, mainline, None)?;
        if index.has_conflicts() {
            return Ok(PickOutcome::Conflict);
        }
        let tree_id = index.write_tree_to(&repository)?;
        if tree_id == ours.tree_id() {
            return Ok(PickOutcome::AlreadyApplied);
        }

        let tree = repository.find_tree(tree_id)?;
        let committer = Signature::now(&self.committer_name, &self.committer_email)?;
        repository.commit(
            Some(LOCAL_BRANCH),
            &picked.author(),
            &committer,
            &self.message,
            &tree,
            &[&ours],
        )?;
        self.push(&repository)?;
        Ok(PickOutcome::Pushed)
    }

    fn fetch(&self, repository: &Repository) -> Result<(), GitHubError> {
        let mut remote = repository.remote("origin", &self.origin.url)?;
        let mut refspecs = vec![tracking_refspec(&self.branch)];
        if self.default_branch != self.branch {
            refspecs.push(tracking_refspec(&self.default_branch));
        }
        let mut options = FetchOptions::new();
        options.remote_callbacks(callbacks(self.origin.credentials.as_ref()));
        remote.fetch(&refspecs, Some(&mut options), None)?;

        let known = Oid::from_str(&self.commit)
            .ok()
            .is_some_and(|oid| repository.find_commit(oid).is_ok());
        if !known {
            tracing::debug!("{} not reachable from fetched branches; fetching it directly", self.commit);
            let mut direct = FetchOptions::new();
            direct.remote_callbacks(callbacks(self.origin.credentials.as_ref()));
            remote.fetch(&[self.commit.as_str()], Some(&mut direct), None)?;
        }
        Ok(())
    }

    fn push(&self, repository: &Repository) -> Result<(), GitHubError> {
        let mut remote = repository.remote_anonymous(&self.fork.url)?;
        let mut remote_callbacks = callbacks(self.fork.credentials.as_ref());
        remote_callbacks.push_update_reference(|reference, status| match status {
            Some(message) => Err(git2::Error::from_str(&format!(
                "push of {reference} rejected: {message}"
            ))),
            None => Ok(()),
        });
        let mut options = PushOptions::new();
        options.remote_callbacks(remote_callbacks);
        let refspec = format!("+{LOCAL_BRANCH}:refs/heads/{}", self.remote_branch);
        remote.push(&[refspec.as_str()], Some(&mut options))?;
        Ok(())
    }
}

fn tracking_refspec(branch: &str) -> String {
    format!("+refs/heads/{branch}:refs/remotes/origin/{branch}")
}

fn callbacks(credentials: Option<&RemoteCredentials>) -> RemoteCallbacks<'_> {
    let mut remote_callbacks = RemoteCallbacks::new();
    if let Some(found) = credentials {
        remote_callbacks.credentials(move |_url, _username, _allowed| {
            Cred::userpass_plaintext(&found.username, found.secret.expose_secret())
        });
    }
    remote_callbacks
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use git2::{Oid, Repository, Signature};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::{CherryPick, PickOutcome, RemoteSpec};

    struct Origin {
        _dir: TempDir,
        path: String,
        change: Oid,
        merge: Oid,
    }

    fn commit(
        repository: &Repository,
        branch: &str,
        parents: &[Oid],
        files: &[(&str, &str)],
        message: &str,
    ) -> Oid {
        let parent_commits: Vec<git2::Commit<'_>> = parents
            .iter()
            .map(|oid| repository.find_commit(*oid).expect("parent exists"))
            .collect();
        let base_tree = parent_commits
            .first()
            .map(|parent| parent.tree().expect("parent tree"));
        let mut builder = repository
            .treebuilder(base_tree.as_ref())
            .expect("tree builder");
        for (path, content) in files {
            let blob = repository.blob(content.as_bytes()).expect("blob");
            builder.insert(path, blob, 0o100_644).expect("insert");
        }
        let tree = repository
            .find_tree(builder.write().expect("write tree"))
            .expect("tree");
        let signature = Signature::now("Alice", "alice@example.com").expect("signature");
        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();
        repository
            .commit(
                Some(format!("refs/heads/{branch}").as_str()),
                &signature,
                &signature,
                message,
                &tree,
                &parent_refs,
            )
            .expect("commit")
    }

    /// `main`: A - B - M (merge of F); `4.x` at A; `4.x-done` already has B's
    /// change; `3.x` conflicts with B.
    #[fixture]
    fn origin() -> Origin {
        let dir = tempfile::tempdir().expect("temp dir");
        let repository = Repository::init_bare(dir.path()).expect("init origin");
        let base = commit(&repository, "main", &[], &[("a.txt", "one\n")], "A");
        let change = commit(&repository, "main", &[base], &[("b.txt", "new\n")], "B");
        let feature = commit(&repository, "feature", &[base], &[("c.txt", "feature\n")], "F");
        let merge = commit(
            &repository,
            "main",
            &[change, feature],
            &[("c.txt", "feature\n")],
            "Merge F",
        );
        commit(&repository, "4.x", &[], &[("a.txt", "one\n")], "A'");
        commit(&repository, "4.x-done", &[base], &[("b.txt", "new\n")], "B'");
        commit(&repository, "3.x", &[base], &[("b.txt", "other\n")], "D");
        Origin {
            path: dir.path().to_string_lossy().into_owned(),
            _dir: dir,
            change,
            merge,
        }
    }

    fn pick(origin: &Origin, fork: &Path, branch: &str, commit: Oid) -> CherryPick {
        CherryPick {
            origin: RemoteSpec {
                url: origin.path.clone(),
                credentials: None,
            },
            fork: RemoteSpec {
                url: fork.to_string_lossy().into_owned(),
                credentials: None,
            },
            branch: branch.to_owned(),
            default_branch: "main".to_owned(),
            commit: commit.to_string(),
            remote_branch: format!("auto-backport-of-pr-1-on-{branch}"),
            message: "Backport PR #1: Add b".to_owned(),
            committer_name: "butler[bot]".to_owned(),
            committer_email: "butler@users.noreply.github.com".to_owned(),
        }
    }

    fn fork() -> (TempDir, Repository) {
        let dir = tempfile::tempdir().expect("temp dir");
        let repository = Repository::init_bare(dir.path()).expect("init fork");
        (dir, repository)
    }

    fn pushed_files(fork: &Repository, branch: &str) -> Vec<String> {
        let tree = fork
            .find_reference(&format!("refs/heads/auto-backport-of-pr-1-on-{branch}"))
            .expect("backport branch pushed")
            .peel_to_tree()
            .expect("tree");
        tree.iter()
            .filter_map(|entry| entry.name().map(str::to_owned))
            .collect()
    }

    #[rstest]
    fn plain_commit_is_replayed_and_pushed(origin: Origin) {
        let (dir, fork_repository) = fork();

        let outcome = pick(&origin, dir.path(), "4.x", origin.change)
            .run()
            .expect("cherry-pick should run");

        assert_eq!(outcome, PickOutcome::Pushed);
        assert_eq!(pushed_files(&fork_repository, "4.x"), vec!["a.txt", "b.txt"]);
        let head = fork_repository
            .find_reference("refs/heads/auto-backport-of-pr-1-on-4.x")
            .and_then(|reference| reference.peel_to_commit())
            .expect("commit pushed");
        assert_eq!(head.message(), Some("Backport PR #1: Add b"));
        assert_eq!(head.author().name(), Some("Alice"));
    }

    #[rstest]
    fn merge_commit_uses_first_parent(origin: Origin) {
        let (dir, fork_repository) = fork();

        let outcome = pick(&origin, dir.path(), "4.x", origin.merge)
            .run()
            .expect("cherry-pick should run");

        assert_eq!(outcome, PickOutcome::Pushed);
        assert_eq!(pushed_files(&fork_repository, "4.x"), vec!["a.txt", "c.txt"]);
    }

    #[rstest]
    fn existing_change_is_reported_as_applied(origin: Origin) {
        let (dir, fork_repository) = fork();

        let outcome = pick(&origin, dir.path(), "4.x-done", origin.change)
            .run()
            .expect("cherry-pick should run");

        assert_eq!(outcome, PickOutcome::AlreadyApplied);
        assert!(
            fork_repository.references().expect("refs").next().is_none(),
            "nothing should be pushed"
        );
    }

    #[rstest]
    fn conflicting_change_is_reported(origin: Origin) {
        let (dir, _fork_repository) = fork();

        let outcome = pick(&origin, dir.path(), "3.x", origin.change)
            .run()
            .expect("cherry-pick should run");

        assert_eq!(outcome, PickOutcome::Conflict);
    }

    #[rstest]
    fn unknown_branch_is_a_git_error(origin: Origin) {
        let (dir, _fork_repository) = fork();

        let result = pick(&origin, dir.path(), "9.x", origin.change).run();

        assert!(
            matches!(result, Err(crate::github::GitHubError::Git { .. })),
            "expected Git error, got {result:?}"
        );
    }
}
