use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use git2::build::CheckoutBuilder;
use git2::{ErrorCode, ObjectType, Oid, Repository};

use super::MirrorManager;
use crate::error::{Error, Result};

/// A local branch following a branch of a `{forge}/{namespace}` remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorBranch<'a> {
    pub remote: String,
    pub branch: &'a str,
}

/// Splits `forge/namespace/branch` into its remote and upstream branch.
///
/// Exactly two prefix components are required; the branch part itself may
/// contain further slashes.
pub fn parse_mirror_branch(name: &str) -> Result<MirrorBranch<'_>> {
    let mut parts = name.splitn(3, '/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(forge), Some(namespace), Some(branch))
            if !forge.is_empty() && !namespace.is_empty() && !branch.is_empty() =>
        {
            Ok(MirrorBranch {
                remote: format!("{forge}/{namespace}"),
                branch,
            })
        }
        _ => Err(Error::MalformedBranch(name.to_string())),
    }
}

fn is_not_found(e: &git2::Error) -> bool {
    e.code() == ErrorCode::NotFound
}

impl MirrorManager {
    /// Tip of local branch `name`, if it exists.
    pub fn branch_target(&self, repo: &Repository, name: &str) -> Result<Option<Oid>> {
        match repo.find_reference(&format!("refs/heads/{name}")) {
            Ok(reference) => Ok(reference.target()),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Tip of `branch` on `remote` as of the last fetch.
    pub fn remote_ref_target(
        &self,
        repo: &Repository,
        remote: &str,
        branch: &str,
    ) -> Result<Option<Oid>> {
        match repo.find_reference(&format!("refs/remotes/{remote}/{branch}")) {
            Ok(reference) => Ok(reference.target()),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Branch names fetched from `remote`.
    pub fn remote_branches(&self, repo: &Repository, remote: &str) -> Result<Vec<String>> {
        let prefix = format!("refs/remotes/{remote}/");
        let mut names = Vec::new();
        for reference in repo.references_glob(&format!("{prefix}*"))? {
            let reference = reference?;
            if let Some(name) = reference.name().and_then(|n| n.strip_prefix(&prefix)) {
                if name != "HEAD" {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    /// Points local branch `name` at `oid`, creating it if needed.
    pub fn set_branch(&self, repo: &Repository, name: &str, oid: Oid) -> Result<()> {
        repo.find_commit(oid)?;
        repo.reference(
            &format!("refs/heads/{name}"),
            oid,
            true,
            &format!("rainboard: set {name}"),
        )?;
        Ok(())
    }

    /// Deletes local branch `name`; returns whether it existed.
    pub fn delete_branch(&self, repo: &Repository, name: &str) -> Result<bool> {
        match repo.find_reference(&format!("refs/heads/{name}")) {
            Ok(mut reference) => {
                reference.delete()?;
                Ok(true)
            }
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Brings local branch `name` in line with the remote branch it mirrors.
    ///
    /// A missing local branch is created from the remote one; with `pull` an
    /// existing one is moved to the remote tip. Returns `None` when the
    /// upstream ref no longer exists, which callers record as a deleted branch.
    /// Branches that only live locally (`master`, `pr/42`) are returned as is;
    /// a missing canonical branch (`devel`) is reported as gone.
    pub fn update_branch_ref(
        &self,
        repo: &Repository,
        name: &str,
        pull: bool,
    ) -> Result<Option<Oid>> {
        let local = self.branch_target(repo, name)?;
        let mirrored = match parse_mirror_branch(name) {
            Ok(mirrored) => mirrored,
            Err(_) if local.is_some() => return Ok(local),
            Err(_) if !name.contains('/') => return Ok(None),
            Err(e) => return Err(e),
        };

        let Some(upstream) = self.remote_ref_target(repo, &mirrored.remote, mirrored.branch)? else {
            return Ok(None);
        };
        match local {
            Some(tip) if !pull || tip == upstream => Ok(Some(tip)),
            _ => {
                self.set_branch(repo, name, upstream)?;
                Ok(Some(upstream))
            }
        }
    }

    /// Points HEAD at local branch `name` and updates the work tree.
    ///
    /// Returns `false` when the branch does not exist.
    pub fn checkout(&self, repo: &Repository, name: &str) -> Result<bool> {
        let refname = format!("refs/heads/{name}");
        let commit = match repo.find_reference(&refname) {
            Ok(reference) => reference.peel_to_commit()?,
            Err(e) if is_not_found(&e) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if !repo.is_bare() {
            repo.checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))?;
        }
        repo.set_head(&refname)?;
        Ok(true)
    }

    /// Commits reachable from `branch` but not `reference`, and the reverse.
    ///
    /// Walks both histories in full rather than stopping at the merge base.
    pub fn ahead_behind(&self, repo: &Repository, branch: Oid, reference: Oid) -> Result<(usize, usize)> {
        let count = |from: Oid, hide: Oid| -> Result<usize> {
            let mut walk = repo.revwalk()?;
            walk.push(from)?;
            walk.hide(hide)?;
            let mut n = 0;
            for oid in walk {
                oid?;
                n += 1;
            }
            Ok(n)
        };
        Ok((count(branch, reference)?, count(reference, branch)?))
    }

    /// Author timestamp of commit `oid`.
    pub fn commit_time(&self, repo: &Repository, oid: Oid) -> Result<DateTime<Utc>> {
        let commit = repo.find_commit(oid)?;
        let seconds = commit.author().when().seconds();
        Utc.timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| Error::BadRequest(format!("commit {oid} has an invalid timestamp")))
    }

    pub fn tags(&self, repo: &Repository) -> Result<Vec<String>> {
        let names = repo.tag_names(None)?;
        Ok(names.iter().flatten().map(str::to_string).collect())
    }

    /// Distinct `(name, email)` authors of the history reachable from `tip`,
    /// in first-seen order.
    pub fn authors(&self, repo: &Repository, tip: Oid) -> Result<Vec<(String, String)>> {
        let mut walk = repo.revwalk()?;
        walk.push(tip)?;

        let mut seen = std::collections::HashSet::new();
        let mut authors = Vec::new();
        for oid in walk {
            let commit = repo.find_commit(oid?)?;
            let author = commit.author();
            let pair = (
                String::from_utf8_lossy(author.name_bytes()).trim().to_string(),
                String::from_utf8_lossy(author.email_bytes()).trim().to_string(),
            );
            if seen.insert(pair.clone()) {
                authors.push(pair);
            }
        }
        Ok(authors)
    }

    /// Contents of the file at `path` in commit `oid`, if it is a UTF-8 blob.
    pub fn read_file(&self, repo: &Repository, oid: Oid, path: &str) -> Result<Option<String>> {
        let tree = repo.find_commit(oid)?.tree()?;
        let entry = match tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }
        let blob = repo.find_blob(entry.id())?;
        Ok(std::str::from_utf8(blob.content()).ok().map(str::to_string))
    }
}
