//! The long-lived owner of every shared component.
//!
//! A [`Service`] is built once at startup. It owns the session cache, the
//! tenant directory, the dispatcher and the worker pool, and it consumes the
//! webhook queue one delivery at a time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::auth::{Clock, CredentialIssuer, PersonalAccount, SessionCache, SystemClock};
use crate::commands::CommandRegistry;
use crate::config::ButlerConfig;
use crate::directory::{DirectorySummary, TenantDirectory};
use crate::dispatch::{Delivery, Dispatcher, EventRouter, RouteOutcome, WorkerPool};
use crate::github::{ApiTransport, GitHubError};
use crate::permissions::PermissionEvaluator;
use crate::telemetry::{StderrJsonlTelemetrySink, TelemetrySink, TracingTelemetrySink};

/// Deployment settings the service is assembled from.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Login the bot answers to.
    pub bot_name: String,
    /// Repository path of the policy document.
    pub policy_path: String,
    /// Concurrent background jobs.
    pub worker_pool_size: usize,
    /// Logins whose events are ignored.
    pub denylist: Vec<String>,
    /// Helper account for forks, if configured.
    pub personal: Option<PersonalAccount>,
}

impl ServiceSettings {
    /// Extracts and validates the settings held in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] for a missing bot name or a
    /// half-configured personal account.
    pub fn from_config(config: &ButlerConfig) -> Result<Self, GitHubError> {
        Ok(Self {
            bot_name: config.require_bot_name()?.to_owned(),
            policy_path: config.policy_path.clone(),
            worker_pool_size: config.worker_pool_size,
            denylist: config.denylisted_logins(),
            personal: config.personal_account()?,
        })
    }
}

/// Picks the telemetry sink selected by `telemetry_jsonl`.
#[must_use]
pub fn telemetry_sink(jsonl: bool) -> Arc<dyn TelemetrySink> {
    if jsonl {
        Arc::new(StderrJsonlTelemetrySink)
    } else {
        Arc::new(TracingTelemetrySink)
    }
}

/// Waits at most `grace` for the event loop to finish its backlog.
///
/// Returns the number of deliveries handled, or `None` when the loop
/// panicked or was still busy when the grace period ran out.
pub async fn wait_for_event_loop(event_loop: JoinHandle<usize>, grace: Duration) -> Option<usize> {
    match tokio::time::timeout(grace, event_loop).await {
        Ok(Ok(handled)) => Some(handled),
        Ok(Err(error)) => {
            tracing::error!("event loop ended abnormally: {error}");
            None
        }
        Err(_) => {
            tracing::warn!(
                "event queue not drained within {}s; abandoning the backlog",
                grace.as_secs()
            );
            None
        }
    }
}

/// Shared components of a running bot.
#[derive(Debug)]
pub struct Service {
    directory: Arc<TenantDirectory>,
    router: EventRouter,
    workers: WorkerPool,
}

impl Service {
    /// Assembles the service around `issuer`.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::Configuration`] when the bot name cannot be
    /// turned into a mention pattern.
    pub fn new(
        issuer: Arc<CredentialIssuer>,
        registry: CommandRegistry,
        settings: ServiceSettings,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Result<Self, GitHubError> {
        let sessions = Arc::new(SessionCache::new(
            issuer,
            settings.personal,
            Arc::clone(&telemetry),
        ));
        let directory = Arc::new(TenantDirectory::new(Arc::clone(&sessions)));
        let workers = WorkerPool::new(settings.worker_pool_size);
        let dispatcher = Dispatcher::new(
            sessions,
            Arc::clone(&directory),
            registry,
            PermissionEvaluator::new(settings.policy_path),
            workers.clone(),
            telemetry,
            &settings.bot_name,
        )?;
        let router = EventRouter::new(Arc::new(dispatcher), &settings.denylist);
        Ok(Self {
            directory,
            router,
            workers,
        })
    }

    /// Builds the production service with the built-in commands.
    ///
    /// # Errors
    ///
    /// Propagates configuration errors: missing app id or key, invalid API
    /// base, missing bot name, or a half-configured personal account.
    pub fn from_config(
        config: &ButlerConfig,
        transport: Arc<dyn ApiTransport>,
    ) -> Result<Self, GitHubError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let issuer = Arc::new(CredentialIssuer::new(
            config.app_identity()?,
            transport,
            config.parsed_api_base()?,
            clock,
        ));
        Self::new(
            issuer,
            CommandRegistry::builtin(),
            ServiceSettings::from_config(config)?,
            telemetry_sink(config.telemetry_jsonl),
        )
    }

    /// Performs the startup directory rebuild.
    ///
    /// A failed rebuild is logged and the service keeps running; lookups of
    /// known owners refresh their installation lazily.
    pub async fn start(&self) -> Option<DirectorySummary> {
        self.directory
            .rebuild()
            .await
            .inspect_err(|error| {
                tracing::error!("startup directory rebuild failed: {error}");
            })
            .ok()
    }

    /// Routes one delivery to completion.
    pub async fn handle(&self, delivery: &Delivery) -> RouteOutcome {
        let outcome = self.router.route(delivery).await;
        match &outcome {
            RouteOutcome::Ignored(reason) => {
                tracing::debug!("{} delivery ignored: {reason}", delivery.kind);
            }
            RouteOutcome::Dispatched(reports) => {
                let invocations: usize = reports.iter().map(|report| report.outcomes.len()).sum();
                tracing::info!("{} delivery ran {invocations} invocation(s)", delivery.kind);
            }
            RouteOutcome::Refreshed {
                installation,
                repositories,
            } => tracing::info!("installation {installation} now covers {repositories} repositories"),
            RouteOutcome::MarkedStale(installation) => {
                tracing::debug!("{} delivery retired installation {installation}", delivery.kind);
            }
        }
        outcome
    }

    /// Consumes `queue` sequentially until every sender is gone, and returns
    /// how many deliveries were handled.
    pub async fn run(&self, mut queue: mpsc::Receiver<Delivery>) -> usize {
        let mut handled = 0_usize;
        while let Some(delivery) = queue.recv().await {
            self.handle(&delivery).await;
            handled += 1;
        }
        tracing::info!("event queue closed after {handled} deliveries");
        handled
    }

    /// Gives background jobs `grace` to finish and reports whether they did.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        let settled = self.workers.drain(grace).await;
        if settled {
            tracing::info!("background jobs settled");
        }
        settled
    }

    /// The tenant directory.
    #[must_use]
    pub const fn directory(&self) -> &Arc<TenantDirectory> {
        &self.directory
    }

    /// The worker pool.
    #[must_use]
    pub const fn workers(&self) -> &WorkerPool {
        &self.workers
    }
}
