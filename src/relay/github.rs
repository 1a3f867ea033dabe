use axum::http::HeaderMap;
use git2::Oid;
use serde_json::Value;

use super::push::{PushEvent, mirror_push};
use super::verify::{verify_github_source, verify_signature};
use super::{GithubEvent, RelayError, configured_forge, event_header, parse_payload, resolve_project};
use crate::forge::payload::{i64_at, opt_str, str_at};
use crate::mirror::MirrorManager;
use crate::server::AppState;
use crate::types::{ForgeSource, slugify};

/// Handles one GitHub webhook delivery; returns the plain-text reply.
///
/// The sender address and the body signature are checked before the event is
/// even decoded.
pub fn handle(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<String, RelayError> {
    verify_github_source(state, headers)?;
    verify_signature(headers, body, state.settings.github_webhook_secret.as_deref())?;

    let event = GithubEvent::from_header(event_header(headers, "x-github-event"))?;
    match event {
        GithubEvent::Ping => Ok("pong".to_string()),
        GithubEvent::Push => push(state, &parse_payload(body)?),
        GithubEvent::PullRequest => pull_request(state, &parse_payload(body)?),
        GithubEvent::CheckSuite => check_suite(state, &parse_payload(body)?),
    }
}

fn owner(payload: &Value) -> Result<&str, RelayError> {
    match opt_str(payload, "repository.owner.name") {
        Some(name) => Ok(name),
        None => Ok(str_at(payload, "repository.owner.login")?),
    }
}

fn push(state: &AppState, payload: &Value) -> Result<String, RelayError> {
    let (namespace, project) =
        resolve_project(state, owner(payload)?, str_at(payload, "repository.name")?)?;
    let github = configured_forge(state, ForgeSource::Github)?;
    let gitlab = state.store.get_forge_by_source(ForgeSource::Gitlab)?;

    mirror_push(
        state,
        &PushEvent {
            namespace: &namespace,
            project: &project,
            source: &github,
            target: gitlab.as_ref(),
            git_ref: str_at(payload, "ref")?,
            after: str_at(payload, "after")?,
        },
    )?;
    Ok("push event detected".to_string())
}

/// Mirrors the head of a pull request as `pr/{number}` and forwards it to GitLab.
fn pull_request(state: &AppState, payload: &Value) -> Result<String, RelayError> {
    let (namespace, project) =
        resolve_project(state, owner(payload)?, str_at(payload, "repository.name")?)?;
    let github = configured_forge(state, ForgeSource::Github)?;

    let number = i64_at(payload, "number")?;
    let head_owner = str_at(payload, "pull_request.head.repo.owner.login")?;
    let clone_url = str_at(payload, "pull_request.head.repo.clone_url")?;
    let sha = str_at(payload, "pull_request.head.sha")?;
    let head = Oid::from_str(sha)
        .map_err(|_| RelayError::BadRequest(format!("pull_request: invalid commit {sha}")))?;

    let mirrors = &state.mirrors;
    let repo = mirrors.ensure_repo(&namespace.slug, &project.slug)?;
    let remote = format!("{}/{}", github.slug, slugify(head_owner));
    mirrors.ensure_remote_url(&repo, &remote, clone_url)?;
    mirrors.fetch(&repo, &remote)?;

    let branch = format!("pr/{number}");
    mirrors.set_branch(&repo, &branch, head)?;
    tracing::info!("{}: {} at {}", project.name, branch, head);

    if let Some(gitlab) = state.store.get_forge_by_source(ForgeSource::Gitlab)? {
        let target = MirrorManager::remote_name(&gitlab, &namespace);
        let mirrored = MirrorManager::has_remote(&repo, &target)
            || state
                .store
                .find_repo(gitlab.id, namespace.id, project.id)?
                .is_some();
        if mirrored {
            let target = mirrors.ensure_remote(&repo, &gitlab, &namespace, &project.slug)?;
            mirrors.push(&repo, &target, &branch)?;
        }
    }
    Ok("pull_request event detected".to_string())
}

fn check_suite(state: &AppState, payload: &Value) -> Result<String, RelayError> {
    let id = i64_at(payload, "check_suite.id")?;
    if state.store.record_check_suite(id)? {
        tracing::info!("Recorded check suite {}", id);
    }
    Ok("check_suite event detected".to_string())
}
