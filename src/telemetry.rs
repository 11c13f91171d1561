//! Operational telemetry events and sinks.
//!
//! Telemetry carries structured signals that operators aggregate across
//! tenants: which commands are dispatched, which are denied, and how close
//! each installation is to its API quota. Diagnostics for humans go through
//! `tracing` instead.

use std::io;

use serde::{Deserialize, Serialize};

/// A structured telemetry event emitted by the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// A mention produced an invocation of a registered command.
    MentionDispatched {
        /// `owner/name` of the repository the mention was posted in.
        repository: String,
        /// Login of the user who mentioned the bot.
        requester: String,
        /// Lower-cased command name.
        command: String,
    },
    /// An invocation was refused by the permission evaluator.
    InvocationDenied {
        /// `owner/name` of the repository the mention was posted in.
        repository: String,
        /// Login of the user who was refused.
        requester: String,
        /// Lower-cased command name.
        command: String,
    },
    /// A response reported the installation's remaining API quota.
    RateLimitObserved {
        /// Installation whose token made the call.
        installation_id: u64,
        /// Requests allowed in the window.
        limit: u32,
        /// Requests left in the window.
        remaining: u32,
    },
}

/// A sink that can record telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Records a telemetry event.
    fn record(&self, event: TelemetryEvent);
}

/// Telemetry sink that drops all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Records telemetry events to stderr as JSON lines (JSONL).
#[derive(Debug, Default)]
pub struct StderrJsonlTelemetrySink;

impl TelemetrySink for StderrJsonlTelemetrySink {
    fn record(&self, event: TelemetryEvent) {
        let Ok(serialised) = serde_json::to_string(&event) else {
            return;
        };

        let _ignored = writeln_stderr(&serialised);
    }
}

/// Forwards telemetry events to `tracing` at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn record(&self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::MentionDispatched {
                repository,
                requester,
                command,
            } => tracing::debug!(%repository, %requester, %command, "mention dispatched"),
            TelemetryEvent::InvocationDenied {
                repository,
                requester,
                command,
            } => tracing::debug!(%repository, %requester, %command, "invocation denied"),
            TelemetryEvent::RateLimitObserved {
                installation_id,
                limit,
                remaining,
            } => tracing::debug!(installation_id, limit, remaining, "rate limit observed"),
        }
    }
}

fn writeln_stderr(message: &str) -> io::Result<()> {
    use io::Write;

    let mut stderr = io::stderr().lock();
    writeln!(stderr, "{message}")
}
