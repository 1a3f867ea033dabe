use git2::{Oid, Repository};

use super::{RelayError, ZERO_SHA};
use crate::error::Error;
use crate::mirror::MirrorManager;
use crate::server::AppState;
use crate::types::{Forge, ForgeSource, Namespace, Project};

/// A branch update announced by one forge, to be mirrored on its counterpart.
pub(super) struct PushEvent<'a> {
    pub namespace: &'a Namespace,
    pub project: &'a Project,
    pub source: &'a Forge,
    pub target: Option<&'a Forge>,
    pub git_ref: &'a str,
    pub after: &'a str,
}

/// Branch deletion path on the counterpart forge API.
fn delete_branch_path(target: &Forge, namespace: &str, project: &str, branch: &str) -> String {
    match target.source {
        ForgeSource::Gitlab => format!(
            "/projects/{}/repository/branches/{}",
            urlencoding::encode(&format!("{namespace}/{project}")),
            urlencoding::encode(branch)
        ),
        _ => format!("/repos/{namespace}/{project}/git/refs/heads/{branch}"),
    }
}

pub(super) fn mirror_push(state: &AppState, event: &PushEvent<'_>) -> Result<(), RelayError> {
    let Some(branch) = event.git_ref.strip_prefix("refs/heads/") else {
        tracing::info!("Ignoring push of {}", event.git_ref);
        return Ok(());
    };
    let mirrors = &state.mirrors;
    let repo = mirrors.ensure_repo(&event.namespace.slug, &event.project.slug)?;
    let source_remote = mirrors.ensure_remote(&repo, event.source, event.namespace, &event.project.slug)?;
    let target_remote = event
        .target
        .map(|target| MirrorManager::remote_name(target, event.namespace));

    if event.after == ZERO_SHA {
        return delete_branch(state, &repo, event, branch, &source_remote, target_remote.as_deref());
    }

    let after = Oid::from_str(event.after)
        .map_err(|_| RelayError::BadRequest(format!("push: invalid commit {}", event.after)))?;
    mirrors.fetch(&repo, &source_remote)?;
    let tip = mirrors.remote_ref_target(&repo, &source_remote, branch)?;
    if tip != Some(after) {
        let tip = tip.map(|oid| oid.to_string()).unwrap_or_default();
        tracing::warn!("{}: push of {} is stale ({} vs {})", event.project.name, branch, tip, after);
        return Err(RelayError::BadRequest(format!(
            "push: wrong commit: {tip} vs {after}"
        )));
    }

    mirrors.set_branch(&repo, &format!("{source_remote}/{branch}"), after)?;
    mirrors.set_branch(&repo, branch, after)?;
    tracing::info!("{}: {} moved to {}", event.project.name, branch, after);

    let (Some(target), Some(target_remote)) = (event.target, target_remote) else {
        return Ok(());
    };
    if !MirrorManager::has_remote(&repo, &target_remote) {
        if state
            .store
            .find_repo(target.id, event.namespace.id, event.project.id)?
            .is_none()
        {
            tracing::debug!("{} is not mirrored on {}", event.project.name, target.name);
            return Ok(());
        }
        mirrors.ensure_remote(&repo, target, event.namespace, &event.project.slug)?;
    }

    mirrors.set_branch(&repo, &format!("{target_remote}/{branch}"), after)?;
    mirrors.fetch(&repo, &target_remote)?;
    if mirrors.remote_ref_target(&repo, &target_remote, branch)? != Some(after) {
        tracing::info!("{}: pushing {} to {}", event.project.name, branch, target_remote);
        mirrors.push(&repo, &target_remote, branch)?;
    }
    Ok(())
}

fn delete_branch(
    state: &AppState,
    repo: &Repository,
    event: &PushEvent<'_>,
    branch: &str,
    source_remote: &str,
    target_remote: Option<&str>,
) -> Result<(), RelayError> {
    let mut local = vec![format!("{source_remote}/{branch}")];
    local.extend(target_remote.map(|remote| format!("{remote}/{branch}")));
    local.push(branch.to_string());
    for name in &local {
        if state.mirrors.delete_branch(repo, name)? {
            tracing::info!("{}: deleted branch {}", event.project.name, name);
        }
    }

    if let Some(target) = event.target {
        let path = delete_branch_path(target, &event.namespace.slug, &event.project.slug, branch);
        let status = state.client.delete(target, &path)?;
        if !(200..300).contains(&status) {
            tracing::warn!("Deleting {} on {} returned {}", branch, target.name, status);
            return Err(Error::Transient(format!(
                "delete {branch} on {}: status {status}",
                target.name
            ))
            .into());
        }
    }
    Ok(())
}
