//! Directory rebuilds and installation events against a wiremock GitHub.

mod support;

use std::sync::Arc;

use butler::commands::CommandRegistry;
use butler::dispatch::{Delivery, RouteOutcome};
use butler::github::{InstallationId, RepositorySlug, WebhookEvent};
use butler::service::{Service, ServiceSettings};
use butler::telemetry::NoopTelemetrySink;
use rstest::rstest;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{system_issuer, token_endpoint};

fn settings() -> ServiceSettings {
    ServiceSettings {
        bot_name: "butler".to_owned(),
        policy_path: ".butler.yml".to_owned(),
        worker_pool_size: 1,
        denylist: Vec::new(),
        personal: None,
    }
}

fn repositories(names: &[&str]) -> Value {
    let repositories: Vec<Value> = names
        .iter()
        .map(|name| {
            let owner = name.split('/').next().unwrap_or_default();
            json!({ "full_name": name, "owner": { "login": owner } })
        })
        .collect();
    json!({ "total_count": repositories.len(), "repositories": repositories })
}

fn repositories_of(token: &str, names: &[&str]) -> Mock {
    Mock::given(method("GET"))
        .and(path("/installation/repositories"))
        .and(header("authorization", format!("Bearer {token}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(repositories(names)))
}

/// Installation 1 (`octo`) and installation 42 (`org`).
async fn two_tenants() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/installations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "account": {"login": "octo"}},
            {"id": 42, "account": {"login": "org"}}
        ])))
        .mount(&server)
        .await;
    token_endpoint(1, "ghs_one").mount(&server).await;
    token_endpoint(42, "ghs_org").mount(&server).await;
    server
}

fn service(server: &MockServer) -> Service {
    Service::new(
        system_issuer(server),
        CommandRegistry::builtin(),
        settings(),
        Arc::new(NoopTelemetrySink),
    )
    .expect("service should build")
}

fn slug(value: &str) -> RepositorySlug {
    RepositorySlug::parse(value).expect("valid slug")
}

fn installation_event(kind: &str, action: &str, id: u64) -> Delivery {
    let event: WebhookEvent = serde_json::from_value(json!({
        "action": action,
        "installation": {"id": id},
        "sender": {"login": "org-admin"}
    }))
    .expect("payload should decode");
    Delivery::new(kind, event)
}

#[rstest]
#[tokio::test]
async fn startup_rebuild_maps_every_tenant() {
    let server = two_tenants().await;
    repositories_of("ghs_one", &["octo/hello", "Octo/World"])
        .mount(&server)
        .await;
    repositories_of("ghs_org", &["org/other"]).mount(&server).await;
    let service = service(&server);

    let summary = service.start().await.expect("rebuild should succeed");

    assert_eq!(summary.installations, 2);
    assert_eq!(summary.repositories, 3);
    let directory = service.directory();
    assert_eq!(directory.resolve(&slug("octo/world")).await, Some(InstallationId::new(1)));
    assert_eq!(directory.resolve(&slug("ORG/Other")).await, Some(InstallationId::new(42)));
    assert_eq!(directory.resolve(&slug("stranger/repo")).await, None);
}

#[rstest]
#[tokio::test]
async fn rebuilding_twice_yields_the_same_mapping() {
    let server = two_tenants().await;
    repositories_of("ghs_one", &["octo/hello"]).mount(&server).await;
    repositories_of("ghs_org", &["org/other"]).mount(&server).await;
    let service = service(&server);

    let first = service.start().await.expect("first rebuild");
    let second = service.start().await.expect("second rebuild");

    assert_eq!(first, second);
    assert_eq!(service.directory().len(), 2);
}

#[rstest]
#[tokio::test]
async fn added_repositories_are_picked_up_from_the_event() {
    let server = two_tenants().await;
    repositories_of("ghs_one", &["octo/hello"]).mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/installation/repositories"))
        .and(header("authorization", "Bearer ghs_org"))
        .respond_with(ResponseTemplate::new(200).set_body_json(repositories(&["org/other"])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    repositories_of("ghs_org", &["org/other", "org/fresh"])
        .mount(&server)
        .await;
    let service = service(&server);
    service.start().await.expect("rebuild should succeed");
    assert!(service.directory().lookup("org/fresh").is_none());

    let outcome = service
        .handle(&installation_event("installation_repositories", "added", 42))
        .await;

    assert_eq!(
        outcome,
        RouteOutcome::Refreshed {
            installation: InstallationId::new(42),
            repositories: 2
        }
    );
    assert_eq!(service.directory().lookup("org/fresh"), Some(InstallationId::new(42)));
}

#[rstest]
#[tokio::test]
async fn deleted_installation_stops_resolving() {
    let server = two_tenants().await;
    repositories_of("ghs_one", &["octo/hello"]).mount(&server).await;
    repositories_of("ghs_org", &["org/other"]).mount(&server).await;
    let service = service(&server);
    service.start().await.expect("rebuild should succeed");

    let outcome = service
        .handle(&installation_event("installation", "deleted", 42))
        .await;

    assert_eq!(outcome, RouteOutcome::MarkedStale(InstallationId::new(42)));
    assert_eq!(service.directory().lookup("org/other"), None);
    assert_eq!(service.directory().lookup("octo/hello"), Some(InstallationId::new(1)));
}

#[rstest]
#[tokio::test]
async fn forbidden_tenant_is_skipped_during_rebuild() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app/installations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "account": {"login": "octo"}},
            {"id": 3, "account": {"login": "gone"}}
        ])))
        .mount(&server)
        .await;
    token_endpoint(1, "ghs_one").mount(&server).await;
    Mock::given(method("POST"))
        .and(path("/app/installations/3/access_tokens"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "suspended"})))
        .mount(&server)
        .await;
    repositories_of("ghs_one", &["octo/hello"]).mount(&server).await;
    let service = service(&server);

    let summary = service.start().await.expect("rebuild should succeed");

    assert_eq!(summary.forbidden, 1);
    assert_eq!(summary.repositories, 1);
}
