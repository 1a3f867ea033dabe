use git2::{Oid, Repository};

use super::Reconciler;
use crate::error::{Error, Result};
use crate::mirror::MirrorManager;
use crate::types::{Project, Repo};

/// Highest `vX.Y.Z` tag, without its `v`.
pub(super) fn latest_version(tags: &[String]) -> Option<String> {
    tags.iter()
        .filter_map(|tag| {
            let version = tag.strip_prefix('v')?;
            let parts = version
                .split('.')
                .map(|p| p.parse::<u64>().ok())
                .collect::<Option<Vec<_>>>()?;
            Some((parts, version))
        })
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, version)| version.to_string())
}

fn count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl Reconciler<'_> {
    /// Full update cycle of one project: mirror, tags, branches, build files
    /// and, when asked, contributors.
    pub fn update_project(&self, project_id: i64, contributors: bool) -> Result<()> {
        let mut project = self.project(project_id)?;
        tracing::info!("Updating {}", project.name);

        let Some(main) = self.main_repo(&project)? else {
            tracing::warn!("{} has no main repo", project.name);
            return Ok(());
        };
        let Some(tip) = self.update_branches(&mut project, &main, false)? else {
            return self.store.update_project(&project);
        };

        let namespace = self.namespace(main.namespace_id)?;
        let git = self.mirrors.open(&namespace.slug, &project.slug)?;
        self.update_dependencies(&git, tip, &mut project)?;
        self.store.update_project(&project)?;

        if contributors {
            self.update_contributors(&git, tip, &project)?;
        }
        Ok(())
    }

    /// Refreshes remotes, tags and branch rows of `project`.
    ///
    /// Only the main remote is fetched unless `pull` is set, in which case
    /// every remote is fetched and mirrored branches move to their upstream
    /// tips. Returns the tip of the project's main branch, or `None` when the
    /// main repo vanished or has no main branch yet.
    pub(super) fn update_branches(
        &self,
        project: &mut Project,
        main: &Repo,
        pull: bool,
    ) -> Result<Option<Oid>> {
        let main_forge = self.forge(main.forge_id)?;
        let main_namespace = self.namespace(main.namespace_id)?;
        let git = self.mirrors.ensure_repo(&main_namespace.slug, &project.slug)?;

        let mut remotes = Vec::new();
        for repo in self.store.list_project_repos(project.id)? {
            let forge = self.forge(repo.forge_id)?;
            if !forge.source.hosts_git() {
                continue;
            }
            let namespace = self.namespace(repo.namespace_id)?;
            let remote = self.mirrors.ensure_remote(&git, &forge, &namespace, &repo.slug)?;
            remotes.push((repo, remote));
        }

        let mut live = Vec::with_capacity(remotes.len());
        for (repo, remote) in remotes {
            if pull || repo.id == main.id {
                match self.mirrors.fetch(&git, &remote) {
                    Ok(()) => {}
                    Err(Error::Transient(reason)) => {
                        tracing::warn!("{} is unreachable ({}), dropping it", remote, reason);
                        self.store.delete_repo(repo.id)?;
                        if repo.id == main.id {
                            return Ok(None);
                        }
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }
            live.push((repo, remote));
        }

        self.update_tags(&git, project)?;

        let main_remote = MirrorManager::remote_name(&main_forge, &main_namespace);
        let mut canonical: Vec<&str> = self.settings.main_branches.iter().map(String::as_str).collect();
        if !canonical.contains(&main.default_branch.as_str()) {
            canonical.push(&main.default_branch);
        }
        for name in canonical {
            match self.mirrors.remote_ref_target(&git, &main_remote, name)? {
                Some(upstream) => {
                    self.mirrors.set_branch(&git, name, upstream)?;
                    self.store.get_or_create_branch(project.id, name, None)?;
                }
                None => {
                    self.mirrors.delete_branch(&git, name)?;
                }
            }
        }

        for (repo, remote) in &live {
            for branch in self.mirrors.remote_branches(&git, remote)? {
                self.store
                    .get_or_create_branch(project.id, &format!("{remote}/{branch}"), Some(repo.id))?;
            }
        }

        let reference = match self.mirrors.branch_target(&git, &main.default_branch)? {
            Some(oid) => Some((main.default_branch.as_str(), oid)),
            None => {
                let fallback = self.settings.main_branch();
                self.mirrors.branch_target(&git, fallback)?.map(|oid| (fallback, oid))
            }
        };
        let Some((main_branch, reference)) = reference else {
            tracing::warn!("{} has no main branch yet", project.name);
            return Ok(None);
        };
        self.mirrors.checkout(&git, main_branch)?;

        self.update_branch_rows(&git, project, reference, pull)?;
        Ok(Some(reference))
    }

    fn update_branch_rows(
        &self,
        git: &Repository,
        project: &mut Project,
        reference: Oid,
        pull: bool,
    ) -> Result<()> {
        let mut newest = None;
        for mut branch in self.store.list_project_branches(project.id)? {
            match self.mirrors.update_branch_ref(git, &branch.name, pull) {
                Ok(Some(tip)) => {
                    let (ahead, behind) = self.mirrors.ahead_behind(git, tip, reference)?;
                    branch.ahead = Some(count(ahead));
                    branch.behind = Some(count(behind));
                    branch.updated = Some(self.mirrors.commit_time(git, tip)?);
                    branch.deleted = false;
                    newest = newest.max(branch.updated);
                }
                Ok(None) => {
                    if !branch.deleted {
                        tracing::info!("{} of {} is gone upstream", branch.name, project.name);
                    }
                    branch.deleted = true;
                }
                Err(Error::MalformedBranch(name)) => {
                    tracing::warn!("Skipping malformed branch {} of {}", name, project.name);
                    continue;
                }
                Err(e) => return Err(e),
            }
            self.store.update_branch(&branch)?;
        }

        if newest.is_some() {
            project.updated = newest;
        }
        Ok(())
    }

    fn update_tags(&self, git: &Repository, project: &mut Project) -> Result<()> {
        let names = self.mirrors.tags(git)?;
        for name in &names {
            self.store.get_or_create_tag(project.id, name)?;
        }
        for tag in self.store.list_project_tags(project.id)? {
            if !names.contains(&tag.name) {
                self.store.delete_tag(tag.id)?;
            }
        }
        if let Some(version) = latest_version(&names) {
            project.version = Some(version);
        }
        Ok(())
    }
}
