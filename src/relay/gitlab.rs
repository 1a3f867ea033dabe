use axum::http::HeaderMap;
use serde_json::Value;

use super::push::{PushEvent, mirror_push};
use super::verify::verify_gitlab;
use super::{GitlabEvent, RelayError, configured_forge, event_header, parse_payload, resolve_project};
use crate::forge::payload::str_at;
use crate::server::AppState;
use crate::types::ForgeSource;

/// Handles one GitLab webhook delivery; returns the plain-text reply.
pub fn handle(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<String, RelayError> {
    verify_gitlab(state, headers)?;

    let event = GitlabEvent::from_header(event_header(headers, "x-gitlab-event"))?;
    match event {
        GitlabEvent::Ping => Ok("pong".to_string()),
        GitlabEvent::Pipeline => pipeline(state, &parse_payload(body)?),
        GitlabEvent::Push => push(state, &parse_payload(body)?),
    }
}

// Only logged for now; a check run on GitHub would be created from here.
fn pipeline(state: &AppState, payload: &Value) -> Result<String, RelayError> {
    let (namespace, project) = resolve_project(
        state,
        str_at(payload, "project.namespace")?,
        str_at(payload, "project.name")?,
    )?;
    let git_ref = str_at(payload, "object_attributes.ref")?;
    let sha = str_at(payload, "object_attributes.sha")?;
    let status = str_at(payload, "object_attributes.status")?;
    tracing::info!(
        "Pipeline for {}/{} on {} ({}): {}",
        namespace.slug,
        project.slug,
        git_ref,
        sha,
        status,
    );
    Ok("pipeline event detected".to_string())
}

fn push(state: &AppState, payload: &Value) -> Result<String, RelayError> {
    let (namespace, project) = resolve_project(
        state,
        str_at(payload, "project.namespace")?,
        str_at(payload, "project.name")?,
    )?;
    let gitlab = configured_forge(state, ForgeSource::Gitlab)?;
    let github = state.store.get_forge_by_source(ForgeSource::Github)?;

    mirror_push(
        state,
        &PushEvent {
            namespace: &namespace,
            project: &project,
            source: &gitlab,
            target: github.as_ref(),
            git_ref: str_at(payload, "ref")?,
            after: str_at(payload, "after")?,
        },
    )?;
    Ok("push event detected".to_string())
}
