//! Bounded pool for slow command work.
//!
//! Jobs are spawned immediately but wait on a semaphore, so at most `size`
//! run at once and the rest queue without holding up the event loop.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};

use crate::github::GitHubError;

/// Default number of concurrent jobs.
pub const DEFAULT_POOL_SIZE: usize = 6;

struct PoolState {
    permits: Arc<Semaphore>,
    size: usize,
    pending: AtomicUsize,
    closed: AtomicBool,
    settled: Notify,
}

impl PoolState {
    fn finish_job(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.settled.notify_waiters();
        }
    }
}

/// Cheaply cloneable handle to the shared pool.
#[derive(Clone)]
pub struct WorkerPool {
    state: Arc<PoolState>,
}

impl WorkerPool {
    /// Creates a pool running at most `size` jobs at once (minimum one).
    #[must_use]
    pub fn new(size: usize) -> Self {
        let bounded = size.max(1);
        Self {
            state: Arc::new(PoolState {
                permits: Arc::new(Semaphore::new(bounded)),
                size: bounded,
                pending: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
                settled: Notify::new(),
            }),
        }
    }

    /// Maximum concurrent jobs.
    #[must_use]
    pub fn size(&self) -> usize {
        self.state.size
    }

    /// Jobs queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Queues `job` without waiting for a slot. Failures are logged under
    /// `label`.
    ///
    /// # Errors
    ///
    /// Returns [`GitHubError::WorkerPool`] once the pool is draining.
    pub fn submit<F>(&self, label: impl Into<String>, job: F) -> Result<(), GitHubError>
    where
        F: Future<Output = Result<(), GitHubError>> + Send + 'static,
    {
        let name = label.into();
        if self.state.closed.load(Ordering::Acquire) {
            return Err(GitHubError::WorkerPool {
                message: format!("pool is shutting down; {name} was not queued"),
            });
        }

        self.state.pending.fetch_add(1, Ordering::AcqRel);
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let permit = Arc::clone(&state.permits).acquire_owned().await;
            if permit.is_err() {
                tracing::warn!("worker pool closed before {name} started");
                state.finish_job();
                return;
            }
            tracing::debug!("{name} started");
            match job.await {
                Ok(()) => tracing::info!("{name} finished"),
                Err(error) => tracing::error!("{name} failed: {error}"),
            }
            drop(permit);
            state.finish_job();
        });
        Ok(())
    }

    /// Runs blocking work (git operations) off the async threads.
    ///
    /// # Errors
    ///
    /// Returns the work's own error, or [`GitHubError::WorkerPool`] when the
    /// blocking task panicked or was cancelled.
    pub async fn run_blocking<T, F>(work: F) -> Result<T, GitHubError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, GitHubError> + Send + 'static,
    {
        tokio::task::spawn_blocking(work)
            .await
            .map_err(|error| GitHubError::WorkerPool {
                message: format!("blocking job did not complete: {error}"),
            })?
    }

    /// Stops accepting jobs and waits up to `grace` for queued and running
    /// jobs to finish. Returns true when the pool settled in time.
    pub async fn drain(&self, grace: Duration) -> bool {
        self.state.closed.store(true, Ordering::Release);
        let settled = tokio::time::timeout(grace, async {
            loop {
                let notified = self.state.settled.notified();
                if self.pending() == 0 {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok();
        if !settled {
            tracing::warn!("{} jobs still running after {grace:?}", self.pending());
        }
        settled
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("WorkerPool")
            .field("size", &self.state.size)
            .field("pending", &self.pending())
            .finish()
    }
}
