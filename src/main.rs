//! Butler service entrypoint: webhook server plus event loop.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use butler::service::wait_for_event_loop;
use butler::webhook::{self, WebhookState};
use butler::{ButlerConfig, GitHubError, ReqwestTransport, Service};
use ortho_config::OrthoConfig;
use tokio::net::TcpListener;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("butler stopped: {error}");
            if writeln!(io::stderr().lock(), "{error}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

async fn run() -> Result<(), GitHubError> {
    let config = load_config()?;
    let secret = config.require_webhook_secret()?;
    let address = config.socket_address()?;

    let transport = Arc::new(ReqwestTransport::new()?);
    let service = Arc::new(Service::from_config(&config, transport)?);
    service.start().await;

    let (sender, receiver) = mpsc::channel(config.event_queue_capacity.max(1));
    let event_loop = {
        let consumer = Arc::clone(&service);
        tokio::spawn(async move { consumer.run(receiver).await })
    };

    let terminate = signal(SignalKind::terminate())?;
    let interrupt = signal(SignalKind::interrupt())?;
    let listener = TcpListener::bind(address).await?;
    webhook::serve(
        listener,
        WebhookState::new(secret, sender),
        shutdown_requested(terminate, interrupt),
    )
    .await?;

    // The server dropped the last sender, so the loop ends once the queue
    // is empty or the grace period runs out.
    let grace = config.shutdown_grace();
    wait_for_event_loop(event_loop, grace).await;
    service.shutdown(grace).await;
    Ok(())
}

/// Loads configuration from CLI, environment, and files.
///
/// # Errors
///
/// Returns [`GitHubError::Configuration`] when ortho-config fails to parse
/// arguments or load configuration files.
fn load_config() -> Result<ButlerConfig, GitHubError> {
    ButlerConfig::load().map_err(|error| GitHubError::Configuration {
        message: error.to_string(),
    })
}

async fn shutdown_requested(mut terminate: Signal, mut interrupt: Signal) {
    tokio::select! {
        _ = terminate.recv() => tracing::info!("received SIGTERM"),
        _ = interrupt.recv() => tracing::info!("received SIGINT"),
    }
    tracing::info!("no longer accepting webhooks; draining the event queue");
}
