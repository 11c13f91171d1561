//! Commands the bot can run and the registry that names them.
//!
//! A command is either single-phase ([`Command`]) or multi-phase
//! ([`MultiPhaseCommand`]). Multi-phase commands may suspend exactly once to
//! ask for a session on a second repository; see [`suspension`].

pub mod builtin;
pub mod context;
pub mod parser;
pub mod suspension;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

pub use context::CommandContext;
pub use parser::{Invocation, MentionParser};
pub use suspension::{Phase, SecondaryGrant, SuspensionRequest, SuspensionToken};

use crate::github::GitHubError;
use crate::permissions::PermissionLevel;

/// Static description of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Lower-case command name.
    pub name: String,
    /// Collaborator permission needed without any other grant.
    pub min_scope: PermissionLevel,
    /// Whether the author of a pull request from their own repository may run
    /// the command regardless of scope.
    pub allow_pr_author_override: bool,
    /// One-line description for `help`.
    pub summary: String,
}

impl CommandSpec {
    /// Describes a command without the author override.
    #[must_use]
    pub fn new(name: &str, min_scope: PermissionLevel, summary: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            min_scope,
            allow_pr_author_override: false,
            summary: summary.to_owned(),
        }
    }

    /// Enables the pull request author override.
    #[must_use]
    pub const fn with_author_override(mut self) -> Self {
        self.allow_pr_author_override = true;
        self
    }
}

/// A command that runs to completion in one step.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Command: Send + Sync {
    /// Runs the command.
    async fn execute(&self, context: &CommandContext) -> Result<(), GitHubError>;
}

/// A command that may need a session on a second repository.
#[async_trait]
pub trait MultiPhaseCommand: Send + Sync {
    /// Runs until the command either finishes or needs another repository.
    async fn start(&self, context: &CommandContext) -> Result<Phase, GitHubError>;

    /// Finishes the command once access to the requested repository has been
    /// granted or denied. A denial is not an error.
    async fn resume(
        &self,
        context: &CommandContext,
        token: SuspensionToken,
        grant: SecondaryGrant,
    ) -> Result<(), GitHubError>;
}

/// How a registered command runs.
#[derive(Clone)]
pub enum Handler {
    /// Single step.
    Single(Arc<dyn Command>),
    /// Start, at most one suspension, resume.
    MultiPhase(Arc<dyn MultiPhaseCommand>),
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(match self {
            Self::Single(_) => "Handler::Single",
            Self::MultiPhase(_) => "Handler::MultiPhase",
        })
    }
}

/// A command as the registry stores it.
#[derive(Debug, Clone)]
pub struct RegisteredCommand {
    /// Name, scope, and override flag.
    pub spec: CommandSpec,
    /// The implementation.
    pub handler: Handler,
}

/// Collects commands before freezing them into a [`CommandRegistry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    commands: HashMap<String, Arc<RegisteredCommand>>,
}

impl RegistryBuilder {
    /// Registers a single-phase command under its spec name.
    #[must_use]
    pub fn single(self, spec: CommandSpec, command: Arc<dyn Command>) -> Self {
        self.register(spec, Handler::Single(command))
    }

    /// Registers a multi-phase command under its spec name.
    #[must_use]
    pub fn multi_phase(self, spec: CommandSpec, command: Arc<dyn MultiPhaseCommand>) -> Self {
        self.register(spec, Handler::MultiPhase(command))
    }

    /// Registers `alias` for an already registered command. Unknown targets
    /// are ignored with a warning.
    #[must_use]
    pub fn alias(mut self, alias: &str, existing: &str) -> Self {
        match self.commands.get(&existing.to_lowercase()).cloned() {
            Some(command) => {
                self.commands.insert(alias.to_lowercase(), command);
            }
            None => tracing::warn!("cannot alias {alias} to unknown command {existing}"),
        }
        self
    }

    /// Registers `spec` with `handler`, replacing any command of that name.
    #[must_use]
    pub fn register(mut self, spec: CommandSpec, handler: Handler) -> Self {
        let name = spec.name.clone();
        if self
            .commands
            .insert(name.clone(), Arc::new(RegisteredCommand { spec, handler }))
            .is_some()
        {
            tracing::debug!("command {name} registered twice; keeping the later one");
        }
        self
    }

    /// `(name, spec)` pairs registered so far, sorted by name.
    #[must_use]
    pub fn listing(&self) -> Vec<(String, CommandSpec)> {
        let mut entries: Vec<(String, CommandSpec)> = self
            .commands
            .iter()
            .map(|(name, command)| (name.clone(), command.spec.clone()))
            .collect();
        entries.sort_by(|left, right| left.0.cmp(&right.0));
        entries
    }

    /// Freezes the registry.
    #[must_use]
    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            commands: self.commands,
        }
    }
}

/// Immutable name-to-command map. Lookup is case-insensitive.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    commands: HashMap<String, Arc<RegisteredCommand>>,
}

impl CommandRegistry {
    /// Starts an empty registry.
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The stock command set, with `help` describing everything else.
    #[must_use]
    pub fn builtin() -> Self {
        builtin::register_all(Self::builder()).build()
    }

    /// Looks up `name` case-insensitively.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<RegisteredCommand>> {
        self.commands.get(&name.to_lowercase()).cloned()
    }

    /// Registered names, aliases included, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.commands.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered names, aliases included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::{CommandRegistry, CommandSpec, Handler, MockCommand};
    use crate::permissions::PermissionLevel;

    #[rstest]
    fn lookup_ignores_case_and_follows_aliases() {
        let registry = CommandRegistry::builder()
            .single(
                CommandSpec::new("Backport", PermissionLevel::Write, "backport"),
                Arc::new(MockCommand::new()),
            )
            .alias("safe_backport", "backport")
            .build();

        let primary = registry.get("BACKPORT").expect("primary name resolves");
        let alias = registry.get("Safe_Backport").expect("alias resolves");

        assert_eq!(primary.spec.name, "backport");
        assert_eq!(alias.spec, primary.spec);
        assert!(registry.get("frontport").is_none(), "unknown name");
    }

    #[rstest]
    fn alias_to_unknown_command_is_ignored() {
        let registry = CommandRegistry::builder().alias("x", "missing").build();

        assert!(registry.is_empty());
    }

    #[rstest]
    fn builtin_registry_has_expected_scopes() {
        let registry = CommandRegistry::builtin();
        let scope = |name: &str| {
            registry
                .get(name)
                .map(|command| command.spec.min_scope)
                .expect("command should be registered")
        };

        assert_eq!(scope("hello"), PermissionLevel::None);
        assert_eq!(scope("help"), PermissionLevel::None);
        assert_eq!(scope("say"), PermissionLevel::Write);
        assert_eq!(scope("merge"), PermissionLevel::Write);
        assert_eq!(scope("tag"), PermissionLevel::Admin);
        assert_eq!(scope("untag"), PermissionLevel::Admin);
        assert_eq!(scope("backport"), PermissionLevel::Write);
        assert_eq!(scope("safe_backport"), PermissionLevel::Write);

        let ready = registry.get("ready").expect("ready is registered");
        assert!(ready.spec.allow_pr_author_override, "ready allows authors");

        let migrate = registry.get("migrate").expect("migrate is registered");
        assert!(
            matches!(migrate.handler, Handler::MultiPhase(_)),
            "migrate suspends on its target"
        );
    }
}
