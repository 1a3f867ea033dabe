use serde_json::Value;

use super::Reconciler;
use crate::error::Result;
use crate::forge::payload::{i64_at, opt_bool, opt_i64, opt_str, str_at};
use crate::types::{
    Forge, ForgeSource, License, Namespace, NewProject, NewRepo, Project, Repo, normalize_name,
    slugify,
};

impl Reconciler<'_> {
    pub(super) fn sync_github(&self, forge: &Forge) -> Result<()> {
        for namespace in self.store.list_namespaces()? {
            let path = format!("/orgs/{}/repos", namespace.slug);
            for data in self.client.list(forge, &path, None) {
                self.update_github(forge, &namespace, &data?)?;
            }
        }
        Ok(())
    }

    fn update_github(&self, forge: &Forge, namespace: &Namespace, data: &Value) -> Result<()> {
        let Some(raw_name) = opt_str(data, "name") else {
            return Ok(());
        };
        let name = normalize_name(raw_name);
        if name.is_empty() {
            return Ok(());
        }
        if opt_bool(data, "archived").unwrap_or(false) {
            return self.archive(forge, namespace, &name);
        }

        let (mut project, _) = self.store.get_or_create_project(&NewProject {
            name: name.clone(),
            main_namespace_id: Some(namespace.id),
            main_forge_id: Some(forge.id),
            homepage: opt_str(data, "homepage").map(str::to_string),
            description: opt_str(data, "description").map(str::to_string),
            public: !opt_bool(data, "private").unwrap_or(false),
        })?;
        claim(&mut project, forge, namespace);

        let (mut repo, _) = self.store.get_or_create_repo(&NewRepo {
            name,
            forge_id: forge.id,
            namespace_id: namespace.id,
            project_id: project.id,
            repo_id: i64_at(data, "id")?,
            url: opt_str(data, "html_url").map(str::to_string),
            default_branch: self.default_branch(data),
        })?;
        repo.repo_id = i64_at(data, "id")?;
        repo.homepage = opt_str(data, "homepage").map(str::to_string);
        repo.url = opt_str(data, "html_url").map(str::to_string);
        repo.clone_url = opt_str(data, "clone_url").map(str::to_string);
        repo.default_branch = self.default_branch(data);
        repo.open_issues = opt_i64(data, "open_issues");

        let repo_path = format!("/repos/{}/{}", namespace.slug, raw_name);
        if let Some(details) = self.client.get(forge, &repo_path)? {
            if let Some(license) = self.github_license(&details)? {
                repo.license_id = Some(license.id);
                if project.license_id.is_none() {
                    project.license_id = Some(license.id);
                }
            }
        }

        let pulls = self
            .client
            .list(forge, &format!("{repo_path}/pulls"), None)
            .collect::<Result<Vec<_>>>()?;
        repo.open_pr = Some(i64::try_from(pulls.len()).unwrap_or(i64::MAX));

        self.store.update_repo(&repo)?;
        self.store.update_project(&project)?;
        Ok(())
    }

    fn github_license(&self, details: &Value) -> Result<Option<License>> {
        let Some(spdx_id) = opt_str(details, "license.spdx_id").filter(|id| *id != "NOASSERTION")
        else {
            return Ok(None);
        };
        let name = opt_str(details, "license.name").unwrap_or(spdx_id);
        let license =
            self.store
                .get_or_create_license(spdx_id, name, opt_str(details, "license.key"))?;
        Ok(Some(license))
    }

    pub(super) fn sync_gitlab(&self, forge: &Forge) -> Result<()> {
        for data in self.client.list(forge, "/projects", None) {
            self.update_gitlab(forge, &data?)?;
        }
        self.resolve_orphans(forge)
    }

    fn update_gitlab(&self, forge: &Forge, data: &Value) -> Result<()> {
        let name = normalize_name(str_at(data, "name")?);
        if name.is_empty() {
            return Ok(());
        }
        let group = opt_str(data, "namespace.kind") == Some("group");
        let (namespace, created) =
            self.store
                .get_or_create_namespace(str_at(data, "namespace.name")?, group)?;
        if !created && group && !namespace.group {
            self.store.set_namespace_group(namespace.id, true)?;
        }
        if opt_bool(data, "archived").unwrap_or(false) {
            return self.archive(forge, &namespace, &name);
        }

        let (mut project, created) = self.store.get_or_create_project(&NewProject {
            name: name.clone(),
            description: opt_str(data, "description").map(str::to_string),
            public: opt_str(data, "visibility").is_none_or(|v| v == "public"),
            ..NewProject::default()
        })?;
        let (mut repo, _) = self.store.get_or_create_repo(&NewRepo {
            name,
            forge_id: forge.id,
            namespace_id: namespace.id,
            project_id: project.id,
            repo_id: i64_at(data, "id")?,
            url: opt_str(data, "web_url").map(str::to_string),
            default_branch: self.default_branch(data),
        })?;
        repo.repo_id = i64_at(data, "id")?;
        repo.url = opt_str(data, "web_url").map(str::to_string);
        repo.clone_url = opt_str(data, "http_url_to_repo").map(str::to_string);
        repo.default_branch = self.default_branch(data);
        repo.open_issues = opt_i64(data, "open_issues_count");

        if let Some(parent) = opt_i64(data, "forked_from_project.id") {
            repo.forked_from = Some(parent);
        } else if created || project.main_namespace_id.is_none() {
            claim(&mut project, forge, &namespace);
            self.store.update_project(&project)?;
        }
        self.store.update_repo(&repo)
    }

    /// Projects first seen through a fork get their owner from the fork's parent.
    fn resolve_orphans(&self, forge: &Forge) -> Result<()> {
        for orphan in self.store.list_orphan_projects()? {
            let parent = self
                .store
                .list_project_repos(orphan.id)?
                .into_iter()
                .find(|r| r.forge_id == forge.id)
                .and_then(|r| r.forked_from);
            let Some(parent) = parent else {
                tracing::debug!("{} has no fork parent on {}", orphan.name, forge.name);
                continue;
            };
            match self.client.get(forge, &format!("/projects/{parent}"))? {
                Some(data) => self.update_gitlab(forge, &data)?,
                None => tracing::debug!("Parent {} of {} is not visible", parent, orphan.name),
            }
        }
        Ok(())
    }

    pub(super) fn sync_redmine(&self, forge: &Forge) -> Result<()> {
        for data in self.client.list(forge, "/projects.json", Some("projects")) {
            let data = data?;
            let identifier = opt_str(&data, "identifier").unwrap_or_default();
            let project = match self.store.get_project_by_slug(identifier)? {
                Some(project) => Some(project),
                None => self
                    .store
                    .get_project_by_slug(&slugify(&normalize_name(str_at(&data, "name")?)))?,
            };
            let Some(project) = project else {
                continue;
            };
            let Some(namespace_id) = project.main_namespace_id else {
                continue;
            };

            let id = i64_at(&data, "id")?;
            let (mut repo, _) = self.store.get_or_create_repo(&NewRepo {
                name: project.name.clone(),
                forge_id: forge.id,
                namespace_id,
                project_id: project.id,
                repo_id: id,
                url: Some(format!("{}/projects/{}", forge.url.trim_end_matches('/'), identifier)),
                default_branch: self.settings.main_branch().to_string(),
            })?;
            repo.repo_id = id;
            repo.open_issues = self
                .client
                .get(forge, &format!("/issues.json?project_id={id}"))?
                .and_then(|issues| opt_i64(&issues, "total_count"));
            self.store.update_repo(&repo)?;
        }
        Ok(())
    }

    /// Marks the binding archived, and the project too when it is its main repo.
    fn archive(&self, forge: &Forge, namespace: &Namespace, name: &str) -> Result<()> {
        let Some(mut project) = self.store.get_project_by_slug(&slugify(name))? else {
            return Ok(());
        };
        let Some(mut repo) = self.store.find_repo(forge.id, namespace.id, project.id)? else {
            return Ok(());
        };
        if !repo.archived {
            repo.archived = true;
            self.store.update_repo(&repo)?;
        }
        if is_main_repo(&project, &repo) && !project.archived {
            tracing::info!("{} is archived", project.name);
            project.archived = true;
            self.store.update_project(&project)?;
        }
        Ok(())
    }

    /// The project's binding on its main forge and namespace, created from the
    /// forge's own record when missing.
    pub fn main_repo(&self, project: &Project) -> Result<Option<Repo>> {
        let (Some(forge_id), Some(namespace_id)) = (project.main_forge_id, project.main_namespace_id)
        else {
            return Ok(None);
        };
        if let Some(repo) = self.store.find_repo(forge_id, namespace_id, project.id)? {
            return Ok(Some(repo));
        }

        let forge = self.forge(forge_id)?;
        let namespace = self.namespace(namespace_id)?;
        let path = match forge.source {
            ForgeSource::Github => format!("/repos/{}/{}", namespace.slug, project.slug),
            ForgeSource::Gitlab => format!(
                "/projects/{}",
                urlencoding::encode(&format!("{}/{}", namespace.slug, project.slug))
            ),
            ForgeSource::Redmine | ForgeSource::Travis => return Ok(None),
        };
        let Some(data) = self.client.get(&forge, &path)? else {
            tracing::warn!("{} not found on {}", project.name, forge.name);
            return Ok(None);
        };

        let url = opt_str(&data, "html_url").or_else(|| opt_str(&data, "web_url"));
        let (repo, _) = self.store.get_or_create_repo(&NewRepo {
            name: project.name.clone(),
            forge_id,
            namespace_id,
            project_id: project.id,
            repo_id: i64_at(&data, "id")?,
            url: url.map(str::to_string),
            default_branch: self.default_branch(&data),
        })?;
        Ok(Some(repo))
    }

    fn default_branch(&self, data: &Value) -> String {
        opt_str(data, "default_branch")
            .unwrap_or(self.settings.main_branch())
            .to_string()
    }
}

/// Sets the main namespace and forge of a project that has none yet.
fn claim(project: &mut Project, forge: &Forge, namespace: &Namespace) {
    if project.main_namespace_id.is_none() {
        project.main_namespace_id = Some(namespace.id);
        if project.main_forge_id.is_none() {
            project.main_forge_id = Some(forge.id);
        }
    }
}

fn is_main_repo(project: &Project, repo: &Repo) -> bool {
    project.main_forge_id == Some(repo.forge_id) && project.main_namespace_id == Some(repo.namespace_id)
}
