//! Turning mentions into authorized command runs.
//!
//! The [`Dispatcher`] parses a comment, authorizes each invocation against
//! the repository it was posted in, and runs the handler. A multi-phase
//! handler may suspend once; the dispatcher then resolves the requested
//! repository through the tenant directory, checks the requester's access
//! there, and resumes the handler with either a live session or the deny
//! marker. Invocations of one comment run one after another.

pub mod mention;
pub mod router;
pub mod worker_pool;

use std::sync::Arc;

pub use mention::{MentionContext, ThreadInfo};
pub use router::{Delivery, EventRouter, RouteOutcome};
pub use worker_pool::{DEFAULT_POOL_SIZE, WorkerPool};

use crate::auth::{SessionCache, TenantSession};
use crate::commands::{
    CommandContext, CommandRegistry, Handler, Invocation, MentionParser, MultiPhaseCommand, Phase,
    RegisteredCommand, SecondaryGrant, SuspensionToken,
};
use crate::directory::TenantDirectory;
use crate::github::{GitHubError, InstallationId, RepositoryClient};
use crate::permissions::{
    Authorization, AuthorizationRequest, DenialReason, PermissionEvaluator, PullRequestContext,
};
use crate::telemetry::{TelemetryEvent, TelemetrySink};

const FAILURE_MESSAGE: &str =
    "Something went wrong while running that command. A maintainer can find the details in my logs.";

/// The comment posted when an invocation is refused.
#[must_use]
pub fn denial_message(requester: &str) -> String {
    format!(
        "Awww, sorry {requester} you do not seem to be allowed to do that, please ask a repository maintainer."
    )
}

/// What happened to one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// The handler ran to completion.
    Completed,
    /// The requester was refused and told so.
    Denied,
    /// No command of that name is registered.
    UnknownCommand,
    /// Authorization or the handler failed.
    Failed {
        /// Diagnostic detail.
        message: String,
    },
}

/// Outcomes of one comment, in invocation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// `(command as written, outcome)` pairs.
    pub outcomes: Vec<(String, InvocationOutcome)>,
}

impl DispatchReport {
    /// True when the comment held no invocation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of invocations with `outcome`.
    #[must_use]
    pub fn count(&self, outcome: &InvocationOutcome) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, recorded)| recorded == outcome)
            .count()
    }
}

/// Shared state every invocation reads.
pub struct Dispatcher {
    sessions: Arc<SessionCache>,
    directory: Arc<TenantDirectory>,
    registry: CommandRegistry,
    evaluator: PermissionEvaluator,
    parser: MentionParser,
    workers: WorkerPool,
    telemetry: Arc<dyn TelemetrySink>,
    bot_name: String,
}

impl Dispatcher {
    /// Assembles a dispatcher for the bot called `bot_name`.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] when no mention pattern can be
    /// built from `bot_name`.
    pub fn new(
        sessions: Arc<SessionCache>,
        directory: Arc<TenantDirectory>,
        registry: CommandRegistry,
        evaluator: PermissionEvaluator,
        workers: WorkerPool,
        telemetry: Arc<dyn TelemetrySink>,
        bot_name: &str,
    ) -> Result<Self, GitHubError> {
        let parser = MentionParser::new(bot_name)?;
        Ok(Self {
            sessions,
            directory,
            registry,
            evaluator,
            parser,
            workers,
            telemetry,
            bot_name: bot_name.trim().trim_start_matches('@').to_owned(),
        })
    }

    /// Bot login without `@`.
    #[must_use]
    pub fn bot_name(&self) -> &str {
        &self.bot_name
    }

    /// Parser for this bot's mentions.
    #[must_use]
    pub const fn parser(&self) -> &MentionParser {
        &self.parser
    }

    /// The tenant directory.
    #[must_use]
    pub const fn directory(&self) -> &Arc<TenantDirectory> {
        &self.directory
    }

    /// The worker pool handlers submit slow work to.
    #[must_use]
    pub const fn workers(&self) -> &WorkerPool {
        &self.workers
    }

    /// Runs every invocation in `body`, in order.
    ///
    /// Nothing here returns an error: denials, unknown commands and handler
    /// failures are recorded in the report, and the requester is told about
    /// denials and failures in a comment. A credential failure ends the
    /// comment; the invocations after it are not attempted.
    pub async fn dispatch(&self, mention: MentionContext, body: &str) -> DispatchReport {
        let invocations = self.parser.parse(body);
        let mut report = DispatchReport::default();
        if invocations.is_empty() {
            return report;
        }

        let mention = Arc::new(mention);
        let session = self.sessions.session_for(mention.installation);
        let pull_request = pull_request_context(&session, &mention).await;

        for invocation in invocations {
            match self
                .run_invocation(&session, &mention, pull_request.as_ref(), &invocation)
                .await
            {
                Ok(outcome) => report.outcomes.push((invocation.command, outcome)),
                Err(error) => {
                    self.credential_failure(&session, &mention, &invocation.command, &error)
                        .await;
                    report.outcomes.push((
                        invocation.command,
                        InvocationOutcome::Failed {
                            message: error.to_string(),
                        },
                    ));
                    break;
                }
            }
        }
        report
    }

    /// Runs one invocation. Only credential failures are returned as errors.
    async fn run_invocation(
        &self,
        session: &Arc<TenantSession>,
        mention: &Arc<MentionContext>,
        pull_request: Option<&PullRequestContext>,
        invocation: &Invocation,
    ) -> Result<InvocationOutcome, GitHubError> {
        let Some(command) = self.registry.get(&invocation.command) else {
            tracing::info!(
                "{} asked for unknown command {:?} on {}",
                mention.requester,
                invocation.command,
                mention.repository
            );
            return Ok(InvocationOutcome::UnknownCommand);
        };
        self.telemetry.record(TelemetryEvent::MentionDispatched {
            repository: mention.repository.to_string(),
            requester: mention.requester.clone(),
            command: command.spec.name.clone(),
        });

        let request = AuthorizationRequest {
            command: &command.spec,
            repository: &mention.repository,
            requester: &mention.requester,
            pull_request,
        };
        let local_config = match self.evaluator.authorize(session, &request).await {
            Ok(Authorization::Granted { rule, local_config }) => {
                tracing::debug!(
                    "{} may run {} on {} ({rule:?})",
                    mention.requester,
                    command.spec.name,
                    mention.repository
                );
                local_config
            }
            Ok(Authorization::Denied(reason)) => {
                self.deny(session, mention, &command, &reason).await;
                return Ok(InvocationOutcome::Denied);
            }
            Err(error) => return Err(error),
        };

        let context = CommandContext {
            session: Arc::clone(session),
            mention: Arc::clone(mention),
            arguments: invocation.arguments.clone(),
            local_config,
            workers: self.workers.clone(),
            bot_name: self.bot_name.clone(),
        };
        let result = match &command.handler {
            Handler::Single(handler) => handler.execute(&context).await,
            Handler::MultiPhase(handler) => {
                self.run_multi_phase(handler.as_ref(), &context, pull_request)
                    .await
            }
        };
        match result {
            Ok(()) => Ok(InvocationOutcome::Completed),
            Err(error) if error.is_credential_failure() => Err(error),
            Err(error) => Ok(fail(session, mention, &command, &error).await),
        }
    }

    async fn run_multi_phase(
        &self,
        handler: &dyn MultiPhaseCommand,
        context: &CommandContext,
        pull_request: Option<&PullRequestContext>,
    ) -> Result<(), GitHubError> {
        let Phase::Suspend(request) = handler.start(context).await? else {
            return Ok(());
        };
        let token = request.into_token();
        let grant = self
            .negotiate(&token, context.requester(), pull_request)
            .await;
        handler.resume(context, token, grant).await
    }

    /// Resolves a suspension into a secondary session or the deny marker.
    async fn negotiate(
        &self,
        token: &SuspensionToken,
        requester: &str,
        pull_request: Option<&PullRequestContext>,
    ) -> SecondaryGrant {
        let Some(target) = token.repository() else {
            tracing::info!("suspension target {:?} is not owner/name", token.target());
            return SecondaryGrant::Denied(DenialReason::InvalidTarget {
                target: token.target().to_owned(),
            });
        };
        let Some(installation) = self.directory.resolve(target).await else {
            tracing::info!("no installation covers {target}; resuming with the deny marker");
            return SecondaryGrant::Denied(DenialReason::NotInstalled {
                target: target.to_string(),
            });
        };

        let session = self.sessions.session_for(installation);
        match self
            .evaluator
            .authorize_secondary(&session, target, requester, pull_request)
            .await
        {
            Ok(Authorization::Granted { rule, .. }) => {
                tracing::debug!("{requester} granted {target} via installation {installation} ({rule:?})");
                SecondaryGrant::Session(session)
            }
            Ok(Authorization::Denied(reason)) => {
                tracing::info!("{requester} denied access to {target}: {reason}");
                SecondaryGrant::Denied(reason)
            }
            Err(error) => {
                tracing::error!("credential failure on installation {installation} for {target}: {error}");
                self.retire_if_forbidden(&error);
                SecondaryGrant::Denied(DenialReason::LookupFailed {
                    message: error.to_string(),
                })
            }
        }
    }

    /// Marks a revoked installation stale so later lookups stop resolving to
    /// it.
    fn retire_if_forbidden(&self, error: &GitHubError) {
        if let GitHubError::InstallationForbidden { installation_id } = error {
            self.directory.mark_stale(InstallationId::new(*installation_id));
        }
    }

    /// Logs a credential failure and answers on the origin thread when its
    /// own installation is still usable.
    async fn credential_failure(
        &self,
        session: &TenantSession,
        mention: &MentionContext,
        command: &str,
        error: &GitHubError,
    ) {
        tracing::error!(
            "credential failure running {command} on {}; skipping the rest of the comment: {error}",
            mention.repository
        );
        self.retire_if_forbidden(error);
        let origin_usable = matches!(
            error,
            GitHubError::InstallationForbidden { installation_id }
                if InstallationId::new(*installation_id) != mention.installation
        );
        if origin_usable {
            post(session, mention, FAILURE_MESSAGE).await;
        }
    }

    async fn deny(
        &self,
        session: &TenantSession,
        mention: &MentionContext,
        command: &RegisteredCommand,
        reason: &DenialReason,
    ) {
        tracing::info!(
            "{} may not run {} on {}: {reason}",
            mention.requester,
            command.spec.name,
            mention.repository
        );
        self.telemetry.record(TelemetryEvent::InvocationDenied {
            repository: mention.repository.to_string(),
            requester: mention.requester.clone(),
            command: command.spec.name.clone(),
        });
        post(session, mention, &denial_message(&mention.requester)).await;
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Dispatcher")
            .field("bot_name", &self.bot_name)
            .field("commands", &self.registry.len())
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

async fn pull_request_context(
    session: &TenantSession,
    mention: &MentionContext,
) -> Option<PullRequestContext> {
    if !mention.thread.is_pull_request {
        return None;
    }
    RepositoryClient::new(session, &mention.repository)
        .pull_request(mention.thread.number)
        .await
        .map(|detail| PullRequestContext {
            author: detail.author,
            head_repository: detail.head_repository,
            head_owner: detail.head_owner,
            maintainer_can_modify: detail.maintainer_can_modify,
        })
        .inspect_err(|error| {
            tracing::warn!(
                "could not read pull request {}#{}; no author overrides apply: {error}",
                mention.repository,
                mention.thread.number
            );
        })
        .ok()
}

async fn post(session: &TenantSession, mention: &MentionContext, body: &str) {
    if let Err(error) = RepositoryClient::new(session, &mention.repository)
        .post_comment(mention.thread.number, body)
        .await
    {
        tracing::warn!(
            "could not comment on {}#{}: {error}",
            mention.repository,
            mention.thread.number
        );
    }
}

async fn fail(
    session: &TenantSession,
    mention: &MentionContext,
    command: &RegisteredCommand,
    error: &GitHubError,
) -> InvocationOutcome {
    tracing::warn!(
        "{} failed on {}#{}: {error}",
        command.spec.name,
        mention.repository,
        mention.thread.number
    );
    post(session, mention, FAILURE_MESSAGE).await;
    InvocationOutcome::Failed {
        message: error.to_string(),
    }
}
