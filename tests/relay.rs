//! Webhook relay tests, driven through the router.

mod common;

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header::LOCATION};
use axum::response::Response;
use serde_json::json;
use tower::ServiceExt;

use common::*;
use rainboard::relay::ZERO_SHA;

async fn deliver(fixture: &Fixture, request: Request<Body>) -> Response {
    fixture.router().oneshot(request).await.unwrap()
}

async fn text(response: Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn github_request(event: &str, ip: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/github")
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip)
        .header("x-github-event", event)
        .header("x-hub-signature", hub_signature(body.as_bytes()))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn gitlab_request(event: &str, ip: &str, token: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/gitlab")
        .header("content-type", "application/json")
        .header("x-forwarded-for", ip)
        .header("x-gitlab-event", event)
        .header("x-gitlab-token", token)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn push_payload(git_ref: &str, after: &str) -> String {
    json!({
        "ref": git_ref,
        "after": after,
        "repository": {
            "name": "rainboard-tests",
            "owner": { "name": "gepetto", "login": "gepetto" },
        },
    })
    .to_string()
}

#[tokio::test]
async fn test_health() {
    let fixture = Fixture::new();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = deliver(&fixture, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(response).await, "OK");
}

#[tokio::test]
async fn test_github_ping() {
    let fixture = Fixture::new();
    let response = deliver(&fixture, github_request("ping", GITHUB_HOOK_IP, "{}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(response).await, "pong");
}

#[tokio::test]
async fn test_github_rejects_foreign_ip() {
    let fixture = Fixture::new();
    let response = deliver(&fixture, github_request("ping", "10.0.0.1", "{}")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_github_redirects_to_login_when_configured() {
    let fixture = Fixture::with_settings(|s| {
        s.login_redirect = Some("https://rainboard.laas.fr/login".to_string());
    });
    let response = deliver(&fixture, github_request("ping", "10.0.0.1", "{}")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(LOCATION).unwrap(),
        "https://rainboard.laas.fr/login"
    );
}

#[tokio::test]
async fn test_github_signature_checks() {
    let fixture = Fixture::new();

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/github")
        .header("x-forwarded-for", GITHUB_HOOK_IP)
        .body(Body::from("{}"))
        .unwrap();
    assert_eq!(deliver(&fixture, request).await.status(), StatusCode::FORBIDDEN);

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/github")
        .header("x-forwarded-for", GITHUB_HOOK_IP)
        .header("x-hub-signature", "sha256=0123abcd")
        .body(Body::from("{}"))
        .unwrap();
    let response = deliver(&fixture, request).await;
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(text(response).await, "I only speak sha1.");

    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/github")
        .header("x-forwarded-for", GITHUB_HOOK_IP)
        .header("x-hub-signature", hub_signature(b"something else"))
        .body(Body::from("{}"))
        .unwrap();
    let response = deliver(&fixture, request).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(text(response).await, "wrong signature.");
}

#[tokio::test]
async fn test_github_unknown_event() {
    let fixture = Fixture::new();
    let response = deliver(&fixture, github_request("issues", GITHUB_HOOK_IP, "{}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_check_suite_recorded_once() {
    let fixture = Fixture::new();
    let body = json!({ "check_suite": { "id": 118578147 } }).to_string();

    for _ in 0..2 {
        let response = deliver(&fixture, github_request("check_suite", GITHUB_HOOK_IP, &body)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert!(!fixture.store().record_check_suite(118578147).unwrap());
}

#[tokio::test]
async fn test_push_unknown_project() {
    let fixture = Fixture::new();
    let body = json!({
        "ref": "refs/heads/master",
        "after": ZERO_SHA,
        "repository": { "name": "unknown", "owner": { "name": "gepetto" } },
    })
    .to_string();
    let response = deliver(&fixture, github_request("push", GITHUB_HOOK_IP, &body)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_push_branch_deletion() {
    let fixture = Fixture::new();
    let mirror = fixture.mirror();
    let tip = commits(&mirror, "feature-x", None, "feature", 1);
    for name in ["github/gepetto/feature-x", "gitlab/gepetto/feature-x"] {
        fixture.state.mirrors.set_branch(&mirror, name, tip).unwrap();
    }

    let body = push_payload("refs/heads/feature-x", ZERO_SHA);
    let response = deliver(&fixture, github_request("push", GITHUB_HOOK_IP, &body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(response).await, "push event detected");

    for name in ["github/gepetto/feature-x", "gitlab/gepetto/feature-x", "feature-x"] {
        assert_eq!(
            fixture.state.mirrors.branch_target(&mirror, name).unwrap(),
            None,
            "{name}"
        );
    }
    assert_eq!(
        fixture.forge.deleted(),
        vec!["/projects/gepetto%2Frainboard-tests/repository/branches/feature-x".to_string()]
    );
}

#[tokio::test]
async fn test_push_with_stale_commit_changes_nothing() {
    let fixture = Fixture::new();
    let (upstream_path, upstream) = fixture.upstream("github");
    let tip = commits(&upstream, "feature", None, "feature", 2);
    let mirror = fixture.mirror();
    fixture.link(&mirror, &fixture.github, &upstream_path);

    let stale = "def4560000000000000000000000000000000000";
    let body = push_payload("refs/heads/feature", stale);
    let response = deliver(&fixture, github_request("push", GITHUB_HOOK_IP, &body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let message = text(response).await;
    assert!(message.contains("wrong commit"), "{message}");
    assert!(message.contains(&tip.to_string()), "{message}");

    for name in ["feature", "github/gepetto/feature", "gitlab/gepetto/feature"] {
        assert_eq!(fixture.state.mirrors.branch_target(&mirror, name).unwrap(), None);
    }
}

#[tokio::test]
async fn test_push_mirrors_branch_to_gitlab() {
    let fixture = Fixture::new();
    let (upstream_path, upstream) = fixture.upstream("github");
    let tip = commits(&upstream, "feature", None, "feature", 2);
    let (target_path, target) = fixture.bare("gitlab");
    let mirror = fixture.mirror();
    fixture.link(&mirror, &fixture.github, &upstream_path);
    fixture.link(&mirror, &fixture.gitlab, &target_path);

    let body = push_payload("refs/heads/feature", &tip.to_string());
    let response = deliver(&fixture, github_request("push", GITHUB_HOOK_IP, &body)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let mirrors = &fixture.state.mirrors;
    for name in ["feature", "github/gepetto/feature", "gitlab/gepetto/feature"] {
        assert_eq!(mirrors.branch_target(&mirror, name).unwrap(), Some(tip), "{name}");
    }
    let pushed = target.find_reference("refs/heads/feature").unwrap();
    assert_eq!(pushed.target(), Some(tip));
}

#[tokio::test]
async fn test_push_without_gitlab_binding_stays_local() {
    let fixture = Fixture::new();
    let (upstream_path, upstream) = fixture.upstream("github");
    let tip = commits(&upstream, "master", None, "base", 1);
    let mirror = fixture.mirror();
    fixture.link(&mirror, &fixture.github, &upstream_path);

    let body = push_payload("refs/heads/master", &tip.to_string());
    let response = deliver(&fixture, github_request("push", GITHUB_HOOK_IP, &body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fixture.state.mirrors.branch_target(&mirror, "master").unwrap(), Some(tip));
    assert!(mirror.find_remote("gitlab/gepetto").is_err());
}

#[tokio::test]
async fn test_tag_push_is_acknowledged() {
    let fixture = Fixture::new();
    let body = push_payload("refs/tags/v1.0.0", "0123456789abcdef0123456789abcdef01234567");
    let response = deliver(&fixture, github_request("push", GITHUB_HOOK_IP, &body)).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_pull_request_mirrored_as_pr_branch() {
    let fixture = Fixture::new();
    let (fork_path, fork) = fixture.upstream("fork");
    let head = commits(&fork, "topic", None, "topic", 3);
    let (target_path, target) = fixture.bare("gitlab");
    let mirror = fixture.mirror();
    fixture.link(&mirror, &fixture.gitlab, &target_path);

    let body = json!({
        "number": 42,
        "repository": { "name": "rainboard-tests", "owner": { "login": "gepetto" } },
        "pull_request": {
            "head": {
                "sha": head.to_string(),
                "repo": {
                    "owner": { "login": "nim65s" },
                    "clone_url": fork_path.to_str().unwrap(),
                },
            },
        },
    })
    .to_string();
    let response = deliver(&fixture, github_request("pull_request", GITHUB_HOOK_IP, &body)).await;
    assert_eq!(response.status(), StatusCode::OK);

    assert!(mirror.find_remote("github/nim65s").is_ok());
    assert_eq!(fixture.state.mirrors.branch_target(&mirror, "pr/42").unwrap(), Some(head));
    assert_eq!(
        target.find_reference("refs/heads/pr/42").unwrap().target(),
        Some(head)
    );
}

#[tokio::test]
async fn test_gitlab_network_and_token() {
    let fixture = Fixture::new();

    let response = deliver(&fixture, gitlab_request("ping", GITLAB_HOOK_IP, GITLAB_TOKEN, "{}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(response).await, "pong");

    let response = deliver(&fixture, gitlab_request("ping", "9.9.9.9", GITLAB_TOKEN, "{}")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = deliver(&fixture, gitlab_request("ping", GITLAB_HOOK_IP, "nope", "{}")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(text(response).await, "wrong token.");
}

#[tokio::test]
async fn test_gitlab_pipeline() {
    let fixture = Fixture::new();
    let body = json!({
        "project": { "namespace": "Gepetto", "name": "rainboard-tests" },
        "object_attributes": { "ref": "master", "sha": ZERO_SHA, "status": "success" },
    })
    .to_string();
    let response =
        deliver(&fixture, gitlab_request("Pipeline Hook", GITLAB_HOOK_IP, GITLAB_TOKEN, &body)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json!({
        "project": { "namespace": "Gepetto", "name": "missing" },
        "object_attributes": { "ref": "master", "sha": ZERO_SHA, "status": "success" },
    })
    .to_string();
    let response =
        deliver(&fixture, gitlab_request("Pipeline Hook", GITLAB_HOOK_IP, GITLAB_TOKEN, &body)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = json!({
        "project": { "namespace": "Gepetto", "name": "rainboard-tests" },
        "object_attributes": { "ref": "master", "status": "success" },
    })
    .to_string();
    let response =
        deliver(&fixture, gitlab_request("Pipeline Hook", GITLAB_HOOK_IP, GITLAB_TOKEN, &body)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(text(response).await.contains("object_attributes.sha"));
}

#[tokio::test]
async fn test_gitlab_push_deletion_uses_github_refs_api() {
    let fixture = Fixture::new();
    let body = json!({
        "ref": "refs/heads/old",
        "after": ZERO_SHA,
        "project": { "namespace": "Gepetto", "name": "rainboard-tests" },
    })
    .to_string();
    let response =
        deliver(&fixture, gitlab_request("Push Hook", GITLAB_HOOK_IP, GITLAB_TOKEN, &body)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        fixture.forge.deleted(),
        vec!["/repos/gepetto/rainboard-tests/git/refs/heads/old".to_string()]
    );
}
