use super::Reconciler;
use crate::error::Result;
use crate::forge::payload::{i64_at, opt_datetime, opt_str, str_at};
use crate::types::{
    CiBuild, CiJob, Forge, ForgeSource, Namespace, Repo, gitlab_status, normalize_name,
    slugify, travis_status,
};

impl Reconciler<'_> {
    /// Binds Travis repositories to their GitHub repos and records their builds.
    pub(super) fn sync_travis(&self, forge: &Forge) -> Result<()> {
        let Some(github) = self.store.get_forge_by_source(ForgeSource::Github)? else {
            tracing::warn!("Travis sync needs a GitHub forge");
            return Ok(());
        };

        for namespace in self.store.list_namespaces()? {
            let path = format!("/owner/{}/repos", namespace.slug);
            for data in self.client.list(forge, &path, Some("repositories")) {
                let data = data?;
                let name = normalize_name(str_at(&data, "name")?);
                let Some(project) = self.store.get_project_by_slug(&slugify(&name))? else {
                    continue;
                };
                let Some(mut repo) = self.store.find_repo(github.id, namespace.id, project.id)? else {
                    continue;
                };

                let travis_id = i64_at(&data, "id")?;
                if repo.travis_id != Some(travis_id) {
                    repo.travis_id = Some(travis_id);
                    self.store.update_repo(&repo)?;
                }
                self.sync_travis_builds(forge, &github, &namespace, &repo, travis_id)?;
            }
        }
        Ok(())
    }

    fn sync_travis_builds(
        &self,
        forge: &Forge,
        github: &Forge,
        namespace: &Namespace,
        repo: &Repo,
        travis_id: i64,
    ) -> Result<()> {
        let path = format!("/repo/{travis_id}/builds");
        for data in self.client.list(forge, &path, Some("builds")) {
            let data = data?;
            let Some(started) = opt_datetime(&data, "started_at") else {
                continue;
            };
            let passed = travis_status(str_at(&data, "state")?)?;
            let branch_name = format!(
                "{}/{}/{}",
                github.slug,
                namespace.slug,
                str_at(&data, "branch.name")?
            );
            let (branch, _) =
                self.store
                    .get_or_create_branch(repo.project_id, &branch_name, Some(repo.id))?;

            self.store.upsert_ci_build(&CiBuild {
                id: 0,
                repo_id: repo.id,
                build_id: i64_at(&data, "id")?,
                branch_id: branch.id,
                sha: opt_str(&data, "commit.sha").map(str::to_string),
                passed,
                started,
            })?;
        }
        Ok(())
    }

    /// Records pipelines and their jobs for every repo bound to `forge`.
    pub(super) fn sync_gitlab_ci(&self, forge: &Forge) -> Result<()> {
        for repo in self.store.list_forge_repos(forge.id)? {
            if repo.archived {
                continue;
            }
            let namespace = self.namespace(repo.namespace_id)?;
            let path = format!("/projects/{}/pipelines", repo.repo_id);
            for data in self.client.list(forge, &path, None) {
                let data = data?;
                let Some(started) = opt_datetime(&data, "created_at") else {
                    continue;
                };
                let branch_name = format!(
                    "{}/{}/{}",
                    forge.slug,
                    namespace.slug,
                    str_at(&data, "ref")?
                );
                let (branch, _) =
                    self.store
                        .get_or_create_branch(repo.project_id, &branch_name, Some(repo.id))?;

                let build = self.store.upsert_ci_build(&CiBuild {
                    id: 0,
                    repo_id: repo.id,
                    build_id: i64_at(&data, "id")?,
                    branch_id: branch.id,
                    sha: opt_str(&data, "sha").map(str::to_string),
                    passed: gitlab_status(str_at(&data, "status")?)?,
                    started,
                })?;
                self.sync_gitlab_jobs(forge, &repo, &build)?;
            }
        }
        Ok(())
    }

    fn sync_gitlab_jobs(&self, forge: &Forge, repo: &Repo, build: &CiBuild) -> Result<()> {
        let path = format!("/projects/{}/pipelines/{}/jobs", repo.repo_id, build.build_id);
        for data in self.client.list(forge, &path, None) {
            let data = data?;
            let started = opt_datetime(&data, "started_at")
                .or_else(|| opt_datetime(&data, "created_at"))
                .unwrap_or(build.started);

            self.store.upsert_ci_job(&CiJob {
                id: 0,
                repo_id: repo.id,
                job_id: i64_at(&data, "id")?,
                build: build.id,
                branch_id: build.branch_id,
                name: str_at(&data, "name")?.to_string(),
                passed: gitlab_status(str_at(&data, "status")?)?,
                started,
            })?;
        }
        Ok(())
    }
}
