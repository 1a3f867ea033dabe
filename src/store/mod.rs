mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::types::*;

/// Store defines the datastore interface.
///
/// Every `get_or_create_*` call is a create-if-absent-else-fetch on the
/// entity's natural key and reports whether a row was created.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // Namespace operations
    fn get_or_create_namespace(&self, name: &str, group: bool) -> Result<(Namespace, bool)>;
    fn get_namespace(&self, id: i64) -> Result<Option<Namespace>>;
    fn get_namespace_by_slug(&self, slug: &str) -> Result<Option<Namespace>>;
    fn list_namespaces(&self) -> Result<Vec<Namespace>>;
    fn set_namespace_group(&self, id: i64, group: bool) -> Result<()>;

    // Forge operations
    fn upsert_forge(&self, forge: &Forge) -> Result<Forge>;
    fn get_forge(&self, id: i64) -> Result<Option<Forge>>;
    fn get_forge_by_slug(&self, slug: &str) -> Result<Option<Forge>>;
    fn get_forge_by_source(&self, source: ForgeSource) -> Result<Option<Forge>>;
    fn list_forges(&self) -> Result<Vec<Forge>>;

    // License operations
    fn get_or_create_license(
        &self,
        spdx_id: &str,
        name: &str,
        github_key: Option<&str>,
    ) -> Result<License>;
    fn get_license(&self, id: i64) -> Result<Option<License>>;

    // Project operations
    fn get_or_create_project(&self, project: &NewProject) -> Result<(Project, bool)>;
    fn get_project(&self, id: i64) -> Result<Option<Project>>;
    fn get_project_by_name(&self, name: &str) -> Result<Option<Project>>;
    fn get_project_by_slug(&self, slug: &str) -> Result<Option<Project>>;
    fn get_namespace_project(&self, namespace_id: i64, slug: &str) -> Result<Option<Project>>;
    fn list_projects(&self) -> Result<Vec<Project>>;
    fn list_orphan_projects(&self) -> Result<Vec<Project>>;
    fn update_project(&self, project: &Project) -> Result<()>;
    /// Deletes projects whose main namespace is not a group.
    fn delete_personal_projects(&self) -> Result<usize>;

    // Repo operations
    fn get_or_create_repo(&self, repo: &NewRepo) -> Result<(Repo, bool)>;
    fn get_repo(&self, id: i64) -> Result<Option<Repo>>;
    fn find_repo(&self, forge_id: i64, namespace_id: i64, project_id: i64)
    -> Result<Option<Repo>>;
    fn list_project_repos(&self, project_id: i64) -> Result<Vec<Repo>>;
    fn list_forge_repos(&self, forge_id: i64) -> Result<Vec<Repo>>;
    fn update_repo(&self, repo: &Repo) -> Result<()>;
    fn delete_repo(&self, id: i64) -> Result<bool>;

    // Branch operations
    fn get_or_create_branch(
        &self,
        project_id: i64,
        name: &str,
        repo_id: Option<i64>,
    ) -> Result<(Branch, bool)>;
    fn list_project_branches(&self, project_id: i64) -> Result<Vec<Branch>>;
    fn update_branch(&self, branch: &Branch) -> Result<()>;

    // Tag operations
    fn get_or_create_tag(&self, project_id: i64, name: &str) -> Result<(Tag, bool)>;
    fn list_project_tags(&self, project_id: i64) -> Result<Vec<Tag>>;
    fn delete_tag(&self, id: i64) -> Result<bool>;

    // CI operations
    fn upsert_ci_build(&self, build: &CiBuild) -> Result<CiBuild>;
    fn upsert_ci_job(&self, job: &CiJob) -> Result<CiJob>;
    /// Builds that ran on a branch, newest first.
    fn list_branch_builds(&self, branch_id: i64) -> Result<Vec<CiBuild>>;
    fn list_build_jobs(&self, build: i64) -> Result<Vec<CiJob>>;

    // Contributor operations
    fn create_contributor(&self) -> Result<Contributor>;
    fn get_contributor(&self, id: i64) -> Result<Option<Contributor>>;
    fn list_contributors(&self) -> Result<Vec<Contributor>>;
    fn get_or_create_contributor_name(&self, name: &str) -> Result<(ContributorName, bool)>;
    fn get_or_create_contributor_mail(
        &self,
        mail: &str,
        invalid: bool,
    ) -> Result<(ContributorMail, bool)>;
    fn set_name_contributor(&self, name_id: i64, contributor_id: i64) -> Result<()>;
    fn set_mail_contributor(&self, mail_id: i64, contributor_id: i64) -> Result<()>;
    fn list_contributor_names(&self, contributor_id: i64) -> Result<Vec<ContributorName>>;
    fn list_contributor_mails(&self, contributor_id: i64) -> Result<Vec<ContributorMail>>;
    /// Re-points every name, mail and project link of `from` to `into`, then deletes `from`.
    fn merge_contributors(&self, into: i64, from: i64) -> Result<()>;
    fn add_contributor_project(&self, contributor_id: i64, project_id: i64) -> Result<()>;
    fn list_project_contributors(&self, project_id: i64) -> Result<Vec<Contributor>>;

    // Dependency operations
    fn upsert_dependency(
        &self,
        project_id: i64,
        library_id: i64,
        cmake: bool,
        ros: bool,
        mandatory: bool,
    ) -> Result<Dependency>;
    fn list_project_dependencies(&self, project_id: i64) -> Result<Vec<Dependency>>;

    // Check suite operations
    fn record_check_suite(&self, id: i64) -> Result<bool>;
}
