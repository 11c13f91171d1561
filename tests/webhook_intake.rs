//! The webhook server over a real socket.

use std::net::SocketAddr;
use std::time::Duration;

use butler::dispatch::Delivery;
use butler::github::models::test_support::CommentEventBuilder;
use butler::webhook::{self, EVENT_HEADER, SIGNATURE_HEADER, WebhookState, signature};
use rstest::rstest;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const SECRET: &str = "intake-secret";

struct RunningServer {
    address: SocketAddr,
    queue: mpsc::Receiver<Delivery>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<(), butler::GitHubError>>,
}

async fn start_server(capacity: usize) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let address = listener.local_addr().expect("listener address");
    let (sender, queue) = mpsc::channel(capacity);
    let (stop, stopped) = oneshot::channel::<()>();
    let state = WebhookState::new(SecretString::from(SECRET.to_owned()), sender);
    let handle = tokio::spawn(webhook::serve(listener, state, async move {
        let _stop_signal = stopped.await;
    }));
    RunningServer {
        address,
        queue,
        stop,
        handle,
    }
}

async fn post(address: SocketAddr, body: &str, signed_with: Option<&str>) -> reqwest::StatusCode {
    let mut request = reqwest::Client::new()
        .post(format!("http://{address}/webhook"))
        .header(EVENT_HEADER, "issue_comment")
        .header("content-type", "application/json")
        .body(body.to_owned());
    if let Some(secret) = signed_with {
        request = request.header(
            SIGNATURE_HEADER,
            signature::sign(secret.as_bytes(), body.as_bytes()),
        );
    }
    request.send().await.expect("request should complete").status()
}

fn comment_payload() -> String {
    CommentEventBuilder::new("octo/hello", "carol", "@butler hello")
        .installation(5)
        .to_json()
        .to_string()
}

#[rstest]
#[tokio::test]
async fn signed_delivery_is_queued_with_its_event_kind() {
    let mut server = start_server(4).await;
    let body = comment_payload();

    let status = post(server.address, &body, Some(SECRET)).await;

    assert_eq!(status, reqwest::StatusCode::ACCEPTED);
    let delivery = tokio::time::timeout(Duration::from_secs(5), server.queue.recv())
        .await
        .expect("delivery should arrive")
        .expect("queue should be open");
    assert_eq!(delivery.kind, "issue_comment");
    assert_eq!(delivery.event.installation.map(|found| found.id), Some(5));
    server.stop.send(()).expect("server should be running");
    server
        .handle
        .await
        .expect("server task should join")
        .expect("server should stop cleanly");
}

#[rstest]
#[case::unsigned(None)]
#[case::wrong_secret(Some("not-the-secret"))]
#[tokio::test]
async fn unverified_delivery_is_rejected_and_not_queued(#[case] signed_with: Option<&str>) {
    let mut server = start_server(4).await;

    let status = post(server.address, &comment_payload(), signed_with).await;

    assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
    assert!(server.queue.try_recv().is_err(), "nothing should be queued");
    server.stop.send(()).expect("server should be running");
}

#[rstest]
#[tokio::test]
async fn liveness_text_is_served() {
    let server = start_server(1).await;

    let response = reqwest::get(format!("http://{}/", server.address))
        .await
        .expect("request should complete");

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let text = response.text().await.expect("body should read");
    assert!(text.contains("butler"), "unexpected liveness text {text:?}");
    server.stop.send(()).expect("server should be running");
}

#[rstest]
#[tokio::test]
async fn stopping_the_server_closes_the_queue() {
    let mut server = start_server(1).await;

    server.stop.send(()).expect("server should be running");
    server
        .handle
        .await
        .expect("server task should join")
        .expect("server should stop cleanly");

    assert!(
        server.queue.recv().await.is_none(),
        "the last sender should be dropped with the server"
    );
}
