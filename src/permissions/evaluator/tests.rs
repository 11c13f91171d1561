//! Unit tests for authorization precedence and fail-closed behaviour.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::StatusCode;
use rstest::rstest;
use serde_json::json;

use super::{
    Authorization, AuthorizationRequest, DenialReason, GrantRule, PermissionEvaluator,
    PullRequestContext,
};
use crate::auth::TenantSession;
use crate::auth::test_support::{hour_from, issuer_with, json_response, token_body};
use crate::commands::CommandSpec;
use crate::github::{ApiRequest, GitHubError, InstallationId, MockApiTransport, RepositorySlug};
use crate::permissions::PermissionLevel;
use crate::telemetry::NoopTelemetrySink;

const POLICY: &str = "
usr_denylist: [mallory]
users:
  carol:
    can: [tag]
    config:
      tag: { only: [bug] }
";

/// What the fake repository answers for permission and policy reads.
#[derive(Clone)]
struct Repo {
    permission: (StatusCode, String),
    policy: Option<(StatusCode, String)>,
    exchange: StatusCode,
}

impl Repo {
    fn with_permission(level: &str) -> Self {
        Self {
            permission: (StatusCode::OK, json!({ "permission": level }).to_string()),
            policy: None,
            exchange: StatusCode::CREATED,
        }
    }

    fn policy(mut self, source: &str) -> Self {
        let body = json!({ "content": STANDARD.encode(source), "encoding": "base64" });
        self.policy = Some((StatusCode::OK, body.to_string()));
        self
    }

    fn policy_status(mut self, status: StatusCode) -> Self {
        self.policy = Some((status, r#"{"message":"boom"}"#.to_owned()));
        self
    }

    fn permission_status(mut self, status: StatusCode) -> Self {
        self.permission = (status, r#"{"message":"boom"}"#.to_owned());
        self
    }

    fn answer(&self, request: &ApiRequest) -> Result<crate::github::ApiResponse, GitHubError> {
        let path = request.url.path();
        if path.ends_with("/access_tokens") {
            return Ok(json_response(
                self.exchange,
                &token_body("ghs_eval", hour_from(chrono::Utc::now())),
            ));
        }
        if path.contains("/collaborators/") {
            let (status, body) = &self.permission;
            return Ok(json_response(*status, body));
        }
        if path.contains("/contents/") {
            return Ok(match &self.policy {
                Some((status, body)) => json_response(*status, body),
                None => json_response(StatusCode::NOT_FOUND, r#"{"message":"Not Found"}"#),
            });
        }
        Ok(json_response(StatusCode::NOT_FOUND, "{}"))
    }

    /// Builds a session whose transport panics if the policy is read more
    /// often than `policy_reads`.
    fn session(self, policy_reads: usize) -> TenantSession {
        let mut transport = MockApiTransport::new();
        let for_policy = self.clone();
        transport
            .expect_send()
            .withf(|request| request.url.path().contains("/contents/"))
            .times(policy_reads)
            .returning(move |request| for_policy.answer(&request));
        transport
            .expect_send()
            .withf(|request| !request.url.path().contains("/contents/"))
            .returning(move |request| self.answer(&request));
        TenantSession::new(
            InstallationId::new(1),
            issuer_with(transport),
            None,
            Arc::new(NoopTelemetrySink),
        )
    }
}

fn repository() -> RepositorySlug {
    RepositorySlug::parse("octo/hello").expect("slug should parse")
}

fn pull_request(author: &str, head: &str, maintainer_can_modify: bool) -> PullRequestContext {
    let owner = head.split('/').next().map(str::to_owned);
    PullRequestContext {
        author: author.to_owned(),
        head_repository: Some(head.to_owned()),
        head_owner: owner,
        maintainer_can_modify,
    }
}

async fn authorize(
    session: &TenantSession,
    command: &CommandSpec,
    requester: &str,
    context: Option<&PullRequestContext>,
) -> Result<Authorization, GitHubError> {
    let repository = repository();
    PermissionEvaluator::new(".butler.yml")
        .authorize(
            session,
            &AuthorizationRequest {
                command,
                repository: &repository,
                requester,
                pull_request: context,
            },
        )
        .await
}

#[rstest]
#[case::none_vs_none("none", PermissionLevel::None, true)]
#[case::read_vs_write("read", PermissionLevel::Write, false)]
#[case::triage_vs_read("triage", PermissionLevel::Read, true)]
#[case::write_vs_write("write", PermissionLevel::Write, true)]
#[case::maintain_vs_admin("maintain", PermissionLevel::Admin, false)]
#[case::admin_vs_admin("admin", PermissionLevel::Admin, true)]
#[tokio::test]
async fn static_scope_decides_when_no_policy_grants(
    #[case] level: &str,
    #[case] scope: PermissionLevel,
    #[case] allowed: bool,
) {
    let reads = usize::from(!allowed);
    let session = Repo::with_permission(level).session(reads);
    let command = CommandSpec::new("cmd", scope, "test command");

    let decision = authorize(&session, &command, "dave", None)
        .await
        .expect("no credential failure");

    assert_eq!(decision.is_allowed(), allowed, "{level} against {scope}");
}

#[rstest]
#[tokio::test]
async fn raising_permission_never_revokes_a_grant() {
    let command = CommandSpec::new("merge", PermissionLevel::Write, "merge");
    let mut previously_allowed = false;

    for level in ["none", "read", "write", "admin"] {
        let policy_reads = usize::from(matches!(level, "none" | "read"));
        let session = Repo::with_permission(level).session(policy_reads);
        let allowed = authorize(&session, &command, "dave", None)
            .await
            .expect("no credential failure")
            .is_allowed();
        assert!(allowed || !previously_allowed, "{level} revoked an earlier grant");
        previously_allowed = allowed;
    }
    assert!(previously_allowed, "admin should be allowed");
}

#[rstest]
#[tokio::test]
async fn owning_author_override_skips_the_policy() {
    let session = Repo::with_permission("read").session(0);
    let command =
        CommandSpec::new("ready", PermissionLevel::Write, "mark ready").with_author_override();
    let context = pull_request("Erin", "erin/hello", false);

    let decision = authorize(&session, &command, "erin", Some(&context))
        .await
        .expect("no credential failure");

    assert_eq!(
        decision,
        Authorization::Granted {
            rule: GrantRule::PullRequestAuthor,
            local_config: None,
        }
    );
}

#[rstest]
#[case::not_author("frank", "erin/hello")]
#[case::fork_owned_by_someone_else("erin", "octo/hello")]
#[tokio::test]
async fn author_override_requires_owning_author(#[case] requester: &str, #[case] head: &str) {
    let session = Repo::with_permission("read").session(1);
    let command =
        CommandSpec::new("ready", PermissionLevel::Write, "mark ready").with_author_override();
    let context = pull_request("erin", head, true);

    let decision = authorize(&session, &command, requester, Some(&context))
        .await
        .expect("no credential failure");

    assert!(!decision.is_allowed(), "override must not apply");
}

#[rstest]
#[tokio::test]
async fn author_override_is_opt_in_per_command() {
    let session = Repo::with_permission("read").session(1);
    let command = CommandSpec::new("merge", PermissionLevel::Write, "merge");
    let context = pull_request("erin", "erin/hello", false);

    let decision = authorize(&session, &command, "erin", Some(&context))
        .await
        .expect("no credential failure");

    assert!(!decision.is_allowed());
}

#[rstest]
#[tokio::test]
async fn policy_grant_carries_local_config() {
    let session = Repo::with_permission("none").policy(POLICY).session(1);
    let command = CommandSpec::new("tag", PermissionLevel::Admin, "tag");

    let decision = authorize(&session, &command, "carol", None)
        .await
        .expect("no credential failure");

    assert_eq!(
        decision,
        Authorization::Granted {
            rule: GrantRule::Policy,
            local_config: Some(json!({ "only": ["bug"] })),
        }
    );
}

#[rstest]
#[tokio::test]
async fn denylisted_requester_is_refused() {
    let session = Repo::with_permission("read").policy(POLICY).session(1);
    let command = CommandSpec::new("tag", PermissionLevel::Admin, "tag");

    let decision = authorize(&session, &command, "mallory", None)
        .await
        .expect("no credential failure");

    assert_eq!(decision, Authorization::Denied(DenialReason::Denylisted));
}

#[rstest]
#[case::server_error(StatusCode::INTERNAL_SERVER_ERROR)]
#[case::forbidden(StatusCode::FORBIDDEN)]
#[tokio::test]
async fn unreadable_policy_fails_closed(#[case] status: StatusCode) {
    let session = Repo::with_permission("none").policy_status(status).session(1);
    let command = CommandSpec::new("tag", PermissionLevel::Admin, "tag");

    let decision = authorize(&session, &command, "carol", None)
        .await
        .expect("policy errors are denials, not failures");

    assert!(
        matches!(decision, Authorization::Denied(DenialReason::PolicyUnavailable { .. })),
        "expected PolicyUnavailable, got {decision:?}"
    );
}

#[rstest]
#[tokio::test]
async fn failed_permission_lookup_still_consults_the_policy() {
    let session = Repo::with_permission("admin")
        .permission_status(StatusCode::BAD_GATEWAY)
        .policy(POLICY)
        .session(1);
    let command = CommandSpec::new("tag", PermissionLevel::Admin, "tag");

    let granted = authorize(&session, &command, "carol", None)
        .await
        .expect("lookup errors are not surfaced");

    assert!(
        matches!(granted, Authorization::Granted { rule: GrantRule::Policy, .. }),
        "expected policy grant, got {granted:?}"
    );
}

#[rstest]
#[tokio::test]
async fn failed_permission_lookup_never_grants_by_scope() {
    let session = Repo::with_permission("admin")
        .permission_status(StatusCode::BAD_GATEWAY)
        .session(1);
    let command = CommandSpec::new("hello", PermissionLevel::None, "greet");

    let decision = authorize(&session, &command, "carol", None)
        .await
        .expect("lookup errors are not surfaced");

    assert_eq!(
        decision,
        Authorization::Denied(DenialReason::InsufficientScope {
            required: PermissionLevel::None,
            actual: None,
        })
    );
}

#[rstest]
#[tokio::test]
async fn credential_failures_surface_as_errors() {
    let mut repo = Repo::with_permission("admin");
    repo.exchange = StatusCode::FORBIDDEN;
    let session = repo.session(0);
    let command = CommandSpec::new("hello", PermissionLevel::None, "greet");

    let result = authorize(&session, &command, "dave", None).await;

    assert!(
        matches!(result, Err(GitHubError::InstallationForbidden { .. })),
        "expected InstallationForbidden, got {result:?}"
    );
}

#[rstest]
#[case::writer("write", None, Some(GrantRule::Scope))]
#[case::reader("read", None, None)]
#[case::maintainer_edit_on_head("read", Some(("erin/hello", true)), Some(GrantRule::MaintainerEdit))]
#[case::maintainer_edit_disabled("read", Some(("erin/hello", false)), None)]
#[case::different_head("none", Some(("erin/other", true)), None)]
#[tokio::test]
async fn secondary_requires_write_or_maintainer_edit(
    #[case] level: &str,
    #[case] head: Option<(&str, bool)>,
    #[case] expected: Option<GrantRule>,
) {
    let session = Repo::with_permission(level).session(0);
    let target = RepositorySlug::parse("erin/hello").expect("slug should parse");
    let context = head.map(|(repository, editable)| pull_request("erin", repository, editable));

    let decision = PermissionEvaluator::new(".butler.yml")
        .authorize_secondary(&session, &target, "dave", context.as_ref())
        .await
        .expect("lookups succeed");

    let rule = match decision {
        Authorization::Granted { rule, .. } => Some(rule),
        Authorization::Denied(_) => None,
    };
    assert_eq!(rule, expected);
}

#[rstest]
#[tokio::test]
async fn secondary_lookup_failure_is_a_denial() {
    let session = Repo::with_permission("admin")
        .permission_status(StatusCode::INTERNAL_SERVER_ERROR)
        .session(0);
    let target = RepositorySlug::parse("octo/other").expect("slug should parse");

    let decision = PermissionEvaluator::new(".butler.yml")
        .authorize_secondary(&session, &target, "dave", None)
        .await
        .expect("non-credential failures are denials");

    assert!(
        matches!(decision, Authorization::Denied(DenialReason::LookupFailed { .. })),
        "expected LookupFailed, got {decision:?}"
    );
}

#[rstest]
#[tokio::test]
async fn secondary_credential_failure_is_returned() {
    let mut repo = Repo::with_permission("write");
    repo.exchange = StatusCode::FORBIDDEN;
    let session = repo.session(0);
    let target = RepositorySlug::parse("octo/other").expect("slug should parse");

    let result = PermissionEvaluator::new(".butler.yml")
        .authorize_secondary(&session, &target, "dave", None)
        .await;

    assert_eq!(
        result,
        Err(GitHubError::InstallationForbidden { installation_id: 1 })
    );
}
