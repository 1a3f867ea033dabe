//! Idempotent passes mapping forge data and mirror state onto the datastore.
//!
//! Every pass re-reads current rows, computes new values and writes them
//! back; running one twice over the same upstream data leaves the same rows.

mod branches;
mod ci;
mod contributors;
mod dependencies;
mod projects;
mod urls;

pub use contributors::{is_valid_mail, resolve_contributor};
pub use dependencies::{BuildManifest, CmakeInfo, ParsedDependency, parse_cmake, parse_package_xml};
pub use urls::{url_github, url_gitlab, url_travis};

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::forge::ForgeClient;
use crate::mirror::MirrorManager;
use crate::store::Store;
use crate::types::{Forge, ForgeSource, Namespace, Project, slugify};

pub struct Reconciler<'a> {
    pub store: &'a dyn Store,
    pub client: &'a dyn ForgeClient,
    pub mirrors: &'a MirrorManager,
    pub settings: &'a Settings,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        store: &'a dyn Store,
        client: &'a dyn ForgeClient,
        mirrors: &'a MirrorManager,
        settings: &'a Settings,
    ) -> Self {
        Self {
            store,
            client,
            mirrors,
            settings,
        }
    }

    /// Pulls projects (and CI results, for CI-capable forges) from `forge`.
    pub fn sync_forge(&self, forge: &Forge) -> Result<()> {
        tracing::info!("Synchronizing {} ({})", forge.name, forge.source);
        match forge.source {
            ForgeSource::Github => self.sync_github(forge),
            ForgeSource::Gitlab => {
                self.sync_gitlab(forge)?;
                self.sync_gitlab_ci(forge)
            }
            ForgeSource::Redmine => self.sync_redmine(forge),
            ForgeSource::Travis => self.sync_travis(forge),
        }
    }

    /// Synchronizes every configured forge, git hosts first so that Redmine
    /// and Travis find the projects they bind to.
    pub fn sync_all(&self) -> Result<()> {
        let mut forges = self.store.list_forges()?;
        forges.sort_by_key(|f| !f.source.hosts_git());
        for forge in &forges {
            self.sync_forge(forge)?;
        }
        Ok(())
    }

    /// Runs the full update cycle of every project, one at a time.
    ///
    /// A failing project is logged and does not stop the others.
    pub fn update_all(&self, contributors: bool) -> Result<usize> {
        let mut failures = 0;
        for project in self.store.list_projects()? {
            if let Err(e) = self.update_project(project.id, contributors) {
                tracing::error!("Updating {} failed: {}", project.name, e);
                failures += 1;
            }
        }
        Ok(failures)
    }

    /// Fetches every remote of every project and moves mirrored branches to
    /// their upstream tips.
    pub fn fetch_all(&self) -> Result<usize> {
        let mut failures = 0;
        for mut project in self.store.list_projects()? {
            tracing::info!("Updating branches for {}", project.name);
            if let Err(e) = self.fetch_project(&mut project) {
                tracing::error!("Fetching {} failed: {}", project.name, e);
                failures += 1;
            }
        }
        Ok(failures)
    }

    fn fetch_project(&self, project: &mut Project) -> Result<()> {
        if let Some(main) = self.main_repo(project)? {
            self.update_branches(project, &main, true)?;
        }
        self.store.update_project(project)
    }

    /// Creates the configured forges, rotating tokens of existing ones.
    pub fn seed_forges(&self) -> Result<Vec<Forge>> {
        self.settings
            .forges
            .iter()
            .map(|seed| {
                let forge = self.store.upsert_forge(&Forge {
                    id: 0,
                    name: seed.name.clone(),
                    slug: slugify(&seed.name),
                    source: seed.source,
                    url: seed.url.clone(),
                    token: seed.token.clone(),
                    verify: seed.verify,
                })?;
                tracing::info!("Forge {} ({}) ready", forge.name, forge.source);
                Ok(forge)
            })
            .collect()
    }

    /// Deletes projects owned by a personal (non-group) namespace.
    pub fn prune_personal(&self) -> Result<usize> {
        let removed = self.store.delete_personal_projects()?;
        tracing::info!("Removed {} personal projects", removed);
        Ok(removed)
    }

    fn forge(&self, id: i64) -> Result<Forge> {
        self.store
            .get_forge(id)?
            .ok_or_else(|| Error::NotFound(format!("forge {id}")))
    }

    fn namespace(&self, id: i64) -> Result<Namespace> {
        self.store
            .get_namespace(id)?
            .ok_or_else(|| Error::NotFound(format!("namespace {id}")))
    }

    fn project(&self, id: i64) -> Result<Project> {
        self.store
            .get_project(id)?
            .ok_or_else(|| Error::NotFound(format!("project {id}")))
    }
}
