//! HTTP intake for GitHub webhook deliveries.
//!
//! The endpoint only authenticates, decodes, and enqueues. Deliveries are
//! handled later, one at a time, by the event loop that owns the receiving
//! end of the queue, so a slow command never holds up GitHub's request.

pub mod signature;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::dispatch::router::Delivery;
use crate::github::{GitHubError, WebhookEvent};

/// Header carrying the payload HMAC.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
/// Header naming the event kind.
pub const EVENT_HEADER: &str = "x-github-event";
/// Largest accepted delivery body.
pub const MAX_PAYLOAD_BYTES: usize = 25 * 1024 * 1024;

const LIVENESS: &str = "butler is listening for GitHub webhooks.";

/// Shared state of the webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    secret: Arc<SecretString>,
    queue: mpsc::Sender<Delivery>,
}

impl WebhookState {
    /// Verifies deliveries with `secret` and enqueues them on `queue`.
    #[must_use]
    pub fn new(secret: SecretString, queue: mpsc::Sender<Delivery>) -> Self {
        Self {
            secret: Arc::new(secret),
            queue,
        }
    }
}

impl std::fmt::Debug for WebhookState {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("WebhookState")
            .field("secret", &"[REDACTED]")
            .field("queue_capacity", &self.queue.max_capacity())
            .finish()
    }
}

/// Builds the webhook routes: `POST /webhook`, plus liveness text on `GET /`
/// and `GET /webhook`.
#[must_use]
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/", get(|| async { LIVENESS }))
        .route("/webhook", get(|| async { LIVENESS }).post(receive))
        .with_state(state)
}

/// Serves the webhook routes on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`GitHubError::Io`] when the server fails.
pub async fn serve<F>(listener: TcpListener, state: WebhookState, shutdown: F) -> Result<(), GitHubError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(address) = listener.local_addr() {
        tracing::info!("listening for webhooks on {address}");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(GitHubError::from)
}

async fn receive(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Body,
) -> (StatusCode, &'static str) {
    let Ok(payload) = to_bytes(body, MAX_PAYLOAD_BYTES).await else {
        return (StatusCode::PAYLOAD_TOO_LARGE, "payload too large");
    };

    let verified = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|header| {
            signature::verify(state.secret.expose_secret().as_bytes(), &payload, header)
        });
    if !verified {
        tracing::warn!("rejecting delivery with a missing or invalid signature");
        return (StatusCode::UNAUTHORIZED, "invalid signature");
    }

    let event: WebhookEvent = match serde_json::from_slice(&payload) {
        Ok(event) => event,
        Err(error) => {
            tracing::warn!("rejecting undecodable delivery: {error}");
            return (StatusCode::BAD_REQUEST, "invalid payload");
        }
    };
    let kind = headers
        .get(EVENT_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    match state.queue.try_send(Delivery::new(kind, event)) {
        Ok(()) => (StatusCode::ACCEPTED, "queued"),
        Err(TrySendError::Full(_)) => {
            tracing::warn!("event queue is full; asking GitHub to retry");
            (StatusCode::SERVICE_UNAVAILABLE, "busy")
        }
        Err(TrySendError::Closed(_)) => (StatusCode::SERVICE_UNAVAILABLE, "shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rstest::rstest;
    use secrecy::SecretString;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use super::{EVENT_HEADER, SIGNATURE_HEADER, WebhookState, router, signature};
    use crate::dispatch::router::Delivery;

    const SECRET: &str = "hook-secret";
    const PAYLOAD: &str = r#"{"action":"created","sender":{"login":"carol"}}"#;

    fn webhook_state(capacity: usize) -> (WebhookState, mpsc::Receiver<Delivery>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (
            WebhookState::new(SecretString::from(SECRET.to_owned()), sender),
            receiver,
        )
    }

    fn delivery(body: &str, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::post("/webhook").header(EVENT_HEADER, "issue_comment");
        if let Some(value) = signature {
            builder = builder.header(SIGNATURE_HEADER, value);
        }
        builder
            .body(Body::from(body.to_owned()))
            .expect("request should build")
    }

    fn signed(body: &str) -> Option<String> {
        Some(signature::sign(SECRET.as_bytes(), body.as_bytes()))
    }

    #[rstest]
    #[case::root("/")]
    #[case::webhook("/webhook")]
    #[tokio::test]
    async fn liveness_answers_get(#[case] path: &str) {
        let (state, _receiver) = webhook_state(1);

        let response = router(state)
            .oneshot(Request::get(path).body(Body::empty()).expect("request"))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[rstest]
    #[case::missing(None)]
    #[case::forged(Some("sha256=00".to_owned()))]
    #[case::other_secret(Some(signature::sign(b"nope", PAYLOAD.as_bytes())))]
    #[tokio::test]
    async fn unsigned_deliveries_are_unauthorized(#[case] header: Option<String>) {
        let (state, mut receiver) = webhook_state(1);

        let response = router(state)
            .oneshot(delivery(PAYLOAD, header))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(receiver.try_recv().is_err(), "nothing is queued");
    }

    #[rstest]
    #[tokio::test]
    async fn undecodable_payloads_are_bad_requests() {
        let (state, _receiver) = webhook_state(1);

        let response = router(state)
            .oneshot(delivery("not json", signed("not json")))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[rstest]
    #[tokio::test]
    async fn verified_deliveries_are_queued() {
        let (state, mut receiver) = webhook_state(1);

        let response = router(state)
            .oneshot(delivery(PAYLOAD, signed(PAYLOAD)))
            .await
            .expect("router should respond");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let queued = receiver.try_recv().expect("delivery should be queued");
        assert_eq!(queued.kind, "issue_comment");
        assert_eq!(queued.event.action.as_deref(), Some("created"));
    }

    #[rstest]
    #[tokio::test]
    async fn full_queue_is_service_unavailable() {
        let (state, _receiver) = webhook_state(1);
        let app = router(state);

        let first = app
            .clone()
            .oneshot(delivery(PAYLOAD, signed(PAYLOAD)))
            .await
            .expect("router should respond");
        let second = app
            .oneshot(delivery(PAYLOAD, signed(PAYLOAD)))
            .await
            .expect("router should respond");

        assert_eq!(first.status(), StatusCode::ACCEPTED);
        assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
