use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Store;
use super::schema::SCHEMA;
use crate::error::{Error, Result};
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// An initialized store that lives only as long as the value.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize()?;
        Ok(store)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns a guard to the underlying database connection.
    /// This allows consuming applications to execute custom SQL.
    pub fn connection(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn()
    }
}

impl ToSql for ForgeSource {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ForgeSource {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        ForgeSource::parse(s).ok_or_else(|| FromSqlError::Other(format!("unknown forge source '{s}'").into()))
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn opt_datetime(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row.get::<_, Option<String>>(idx)?.map(|s| parse_datetime(&s)))
}

const NAMESPACE_COLUMNS: &str = "id, name, slug, is_group";

fn namespace_from_row(row: &Row<'_>) -> rusqlite::Result<Namespace> {
    Ok(Namespace {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        group: row.get(3)?,
    })
}

const FORGE_COLUMNS: &str = "id, name, slug, source, url, token, verify";

fn forge_from_row(row: &Row<'_>) -> rusqlite::Result<Forge> {
    Ok(Forge {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        source: row.get(3)?,
        url: row.get(4)?,
        token: row.get(5)?,
        verify: row.get(6)?,
    })
}

const LICENSE_COLUMNS: &str = "id, name, spdx_id, github_key, url";

fn license_from_row(row: &Row<'_>) -> rusqlite::Result<License> {
    Ok(License {
        id: row.get(0)?,
        name: row.get(1)?,
        spdx_id: row.get(2)?,
        github_key: row.get(3)?,
        url: row.get(4)?,
    })
}

const PROJECT_COLUMNS: &str = "id, name, slug, public, main_namespace_id, main_forge_id, license_id, \
     homepage, description, version, updated, archived, cmake_name, suffix";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        public: row.get(3)?,
        main_namespace_id: row.get(4)?,
        main_forge_id: row.get(5)?,
        license_id: row.get(6)?,
        homepage: row.get(7)?,
        description: row.get(8)?,
        version: row.get(9)?,
        updated: opt_datetime(row, 10)?,
        archived: row.get(11)?,
        cmake_name: row.get(12)?,
        suffix: row.get(13)?,
    })
}

const REPO_COLUMNS: &str = "id, name, slug, forge_id, namespace_id, project_id, license_id, homepage, \
     url, clone_url, default_branch, open_issues, open_pr, repo_id, forked_from, travis_id, archived";

fn repo_from_row(row: &Row<'_>) -> rusqlite::Result<Repo> {
    Ok(Repo {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        forge_id: row.get(3)?,
        namespace_id: row.get(4)?,
        project_id: row.get(5)?,
        license_id: row.get(6)?,
        homepage: row.get(7)?,
        url: row.get(8)?,
        clone_url: row.get(9)?,
        default_branch: row.get(10)?,
        open_issues: row.get(11)?,
        open_pr: row.get(12)?,
        repo_id: row.get(13)?,
        forked_from: row.get(14)?,
        travis_id: row.get(15)?,
        archived: row.get(16)?,
    })
}

const BRANCH_COLUMNS: &str = "id, name, project_id, repo_id, ahead, behind, updated, deleted";

fn branch_from_row(row: &Row<'_>) -> rusqlite::Result<Branch> {
    Ok(Branch {
        id: row.get(0)?,
        name: row.get(1)?,
        project_id: row.get(2)?,
        repo_id: row.get(3)?,
        ahead: row.get(4)?,
        behind: row.get(5)?,
        updated: opt_datetime(row, 6)?,
        deleted: row.get(7)?,
    })
}

fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get(0)?,
        name: row.get(1)?,
        project_id: row.get(2)?,
    })
}

const CI_BUILD_COLUMNS: &str = "id, repo_id, build_id, branch_id, sha, passed, started";

fn ci_build_from_row(row: &Row<'_>) -> rusqlite::Result<CiBuild> {
    Ok(CiBuild {
        id: row.get(0)?,
        repo_id: row.get(1)?,
        build_id: row.get(2)?,
        branch_id: row.get(3)?,
        sha: row.get(4)?,
        passed: row.get(5)?,
        started: parse_datetime(&row.get::<_, String>(6)?),
    })
}

const CI_JOB_COLUMNS: &str = "id, repo_id, job_id, build, branch_id, name, passed, started";

fn ci_job_from_row(row: &Row<'_>) -> rusqlite::Result<CiJob> {
    Ok(CiJob {
        id: row.get(0)?,
        repo_id: row.get(1)?,
        job_id: row.get(2)?,
        build: row.get(3)?,
        branch_id: row.get(4)?,
        name: row.get(5)?,
        passed: row.get(6)?,
        started: parse_datetime(&row.get::<_, String>(7)?),
    })
}

fn contributor_name_from_row(row: &Row<'_>) -> rusqlite::Result<ContributorName> {
    Ok(ContributorName {
        id: row.get(0)?,
        name: row.get(1)?,
        contributor_id: row.get(2)?,
    })
}

fn contributor_mail_from_row(row: &Row<'_>) -> rusqlite::Result<ContributorMail> {
    Ok(ContributorMail {
        id: row.get(0)?,
        mail: row.get(1)?,
        invalid: row.get(2)?,
        contributor_id: row.get(3)?,
    })
}

const DEPENDENCY_COLUMNS: &str = "id, project_id, library_id, cmake, ros, mandatory";

fn dependency_from_row(row: &Row<'_>) -> rusqlite::Result<Dependency> {
    Ok(Dependency {
        id: row.get(0)?,
        project_id: row.get(1)?,
        library_id: row.get(2)?,
        cmake: row.get(3)?,
        ros: row.get(4)?,
        mandatory: row.get(5)?,
    })
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // Namespace operations

    fn get_or_create_namespace(&self, name: &str, group: bool) -> Result<(Namespace, bool)> {
        let slug = slugify(name);
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO namespaces (name, slug, is_group) VALUES (?1, ?2, ?3)",
            params![name, slug, group],
        )?;
        let namespace = conn.query_row(
            &format!("SELECT {NAMESPACE_COLUMNS} FROM namespaces WHERE slug = ?1"),
            params![slug],
            namespace_from_row,
        )?;
        Ok((namespace, inserted > 0))
    }

    fn get_namespace(&self, id: i64) -> Result<Option<Namespace>> {
        self.conn()
            .query_row(
                &format!("SELECT {NAMESPACE_COLUMNS} FROM namespaces WHERE id = ?1"),
                params![id],
                namespace_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_namespace_by_slug(&self, slug: &str) -> Result<Option<Namespace>> {
        self.conn()
            .query_row(
                &format!("SELECT {NAMESPACE_COLUMNS} FROM namespaces WHERE slug = ?1"),
                params![slug],
                namespace_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {NAMESPACE_COLUMNS} FROM namespaces ORDER BY id"
        ))?;
        collect(stmt.query_map([], namespace_from_row)?)
    }

    fn set_namespace_group(&self, id: i64, group: bool) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE namespaces SET is_group = ?1 WHERE id = ?2",
            params![group, id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("namespace {id}")));
        }
        Ok(())
    }

    // Forge operations

    fn upsert_forge(&self, forge: &Forge) -> Result<Forge> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO forges (name, slug, source, url, token, verify)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(slug) DO UPDATE SET
                name = excluded.name,
                source = excluded.source,
                url = excluded.url,
                token = COALESCE(excluded.token, forges.token),
                verify = excluded.verify",
            params![
                forge.name,
                forge.slug,
                forge.source,
                forge.url,
                forge.token,
                forge.verify,
            ],
        )?;
        conn.query_row(
            &format!("SELECT {FORGE_COLUMNS} FROM forges WHERE slug = ?1"),
            params![forge.slug],
            forge_from_row,
        )
        .map_err(Error::from)
    }

    fn get_forge(&self, id: i64) -> Result<Option<Forge>> {
        self.conn()
            .query_row(
                &format!("SELECT {FORGE_COLUMNS} FROM forges WHERE id = ?1"),
                params![id],
                forge_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_forge_by_slug(&self, slug: &str) -> Result<Option<Forge>> {
        self.conn()
            .query_row(
                &format!("SELECT {FORGE_COLUMNS} FROM forges WHERE slug = ?1"),
                params![slug],
                forge_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_forge_by_source(&self, source: ForgeSource) -> Result<Option<Forge>> {
        self.conn()
            .query_row(
                &format!("SELECT {FORGE_COLUMNS} FROM forges WHERE source = ?1 ORDER BY id LIMIT 1"),
                params![source],
                forge_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_forges(&self) -> Result<Vec<Forge>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {FORGE_COLUMNS} FROM forges ORDER BY id"))?;
        collect(stmt.query_map([], forge_from_row)?)
    }

    // License operations

    fn get_or_create_license(
        &self,
        spdx_id: &str,
        name: &str,
        github_key: Option<&str>,
    ) -> Result<License> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR IGNORE INTO licenses (name, spdx_id, github_key) VALUES (?1, ?2, ?3)",
            params![name, spdx_id, github_key],
        )?;
        conn.query_row(
            &format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE spdx_id = ?1"),
            params![spdx_id],
            license_from_row,
        )
        .map_err(Error::from)
    }

    fn get_license(&self, id: i64) -> Result<Option<License>> {
        self.conn()
            .query_row(
                &format!("SELECT {LICENSE_COLUMNS} FROM licenses WHERE id = ?1"),
                params![id],
                license_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    // Project operations

    fn get_or_create_project(&self, project: &NewProject) -> Result<(Project, bool)> {
        let slug = slugify(&project.name);
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO projects
                (name, slug, public, main_namespace_id, main_forge_id, homepage, description)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                project.name,
                slug,
                project.public,
                project.main_namespace_id,
                project.main_forge_id,
                project.homepage,
                project.description,
            ],
        )?;
        // Names differing only in case share a slug, and so a project.
        let fetched = conn.query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE slug = ?1"),
            params![slug],
            project_from_row,
        )?;
        Ok((fetched, inserted > 0))
    }

    fn get_project(&self, id: i64) -> Result<Option<Project>> {
        self.conn()
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                params![id],
                project_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        self.conn()
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE name = ?1"),
                params![name],
                project_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_project_by_slug(&self, slug: &str) -> Result<Option<Project>> {
        self.conn()
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE slug = ?1"),
                params![slug],
                project_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn get_namespace_project(&self, namespace_id: i64, slug: &str) -> Result<Option<Project>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {PROJECT_COLUMNS} FROM projects WHERE main_namespace_id = ?1 AND slug = ?2"
                ),
                params![namespace_id, slug],
                project_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare(&format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY id"))?;
        collect(stmt.query_map([], project_from_row)?)
    }

    fn list_orphan_projects(&self) -> Result<Vec<Project>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE main_namespace_id IS NULL ORDER BY id"
        ))?;
        collect(stmt.query_map([], project_from_row)?)
    }

    fn update_project(&self, project: &Project) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE projects SET public = ?1, main_namespace_id = ?2, main_forge_id = ?3,
                license_id = ?4, homepage = ?5, description = ?6, version = ?7, updated = ?8,
                archived = ?9, cmake_name = ?10, suffix = ?11
             WHERE id = ?12",
            params![
                project.public,
                project.main_namespace_id,
                project.main_forge_id,
                project.license_id,
                project.homepage,
                project.description,
                project.version,
                project.updated.as_ref().map(format_datetime),
                project.archived,
                project.cmake_name,
                project.suffix,
                project.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("project {}", project.id)));
        }
        Ok(())
    }

    fn delete_personal_projects(&self) -> Result<usize> {
        let rows = self.conn().execute(
            "DELETE FROM projects WHERE main_namespace_id IN
                (SELECT id FROM namespaces WHERE is_group = 0)",
            [],
        )?;
        Ok(rows)
    }

    // Repo operations

    fn get_or_create_repo(&self, repo: &NewRepo) -> Result<(Repo, bool)> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO repos
                (name, slug, forge_id, namespace_id, project_id, repo_id, url, default_branch)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                repo.name,
                slugify(&repo.name),
                repo.forge_id,
                repo.namespace_id,
                repo.project_id,
                repo.repo_id,
                repo.url,
                repo.default_branch,
            ],
        )?;
        let fetched = conn.query_row(
            &format!(
                "SELECT {REPO_COLUMNS} FROM repos
                 WHERE forge_id = ?1 AND namespace_id = ?2 AND project_id = ?3"
            ),
            params![repo.forge_id, repo.namespace_id, repo.project_id],
            repo_from_row,
        )?;
        Ok((fetched, inserted > 0))
    }

    fn get_repo(&self, id: i64) -> Result<Option<Repo>> {
        self.conn()
            .query_row(
                &format!("SELECT {REPO_COLUMNS} FROM repos WHERE id = ?1"),
                params![id],
                repo_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn find_repo(
        &self,
        forge_id: i64,
        namespace_id: i64,
        project_id: i64,
    ) -> Result<Option<Repo>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {REPO_COLUMNS} FROM repos
                     WHERE forge_id = ?1 AND namespace_id = ?2 AND project_id = ?3"
                ),
                params![forge_id, namespace_id, project_id],
                repo_from_row,
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_project_repos(&self, project_id: i64) -> Result<Vec<Repo>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPO_COLUMNS} FROM repos WHERE project_id = ?1 ORDER BY id"
        ))?;
        collect(stmt.query_map(params![project_id], repo_from_row)?)
    }

    fn list_forge_repos(&self, forge_id: i64) -> Result<Vec<Repo>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPO_COLUMNS} FROM repos WHERE forge_id = ?1 ORDER BY id"
        ))?;
        collect(stmt.query_map(params![forge_id], repo_from_row)?)
    }

    fn update_repo(&self, repo: &Repo) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE repos SET license_id = ?1, homepage = ?2, url = ?3, clone_url = ?4,
                default_branch = ?5, open_issues = ?6, open_pr = ?7, repo_id = ?8,
                forked_from = ?9, travis_id = ?10, archived = ?11
             WHERE id = ?12",
            params![
                repo.license_id,
                repo.homepage,
                repo.url,
                repo.clone_url,
                repo.default_branch,
                repo.open_issues,
                repo.open_pr,
                repo.repo_id,
                repo.forked_from,
                repo.travis_id,
                repo.archived,
                repo.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("repo {}", repo.id)));
        }
        Ok(())
    }

    fn delete_repo(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM repos WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Branch operations

    fn get_or_create_branch(
        &self,
        project_id: i64,
        name: &str,
        repo_id: Option<i64>,
    ) -> Result<(Branch, bool)> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO branches (name, project_id, repo_id) VALUES (?1, ?2, ?3)",
            params![name, project_id, repo_id],
        )?;
        let branch = conn.query_row(
            &format!(
                "SELECT {BRANCH_COLUMNS} FROM branches
                 WHERE project_id = ?1 AND name = ?2 AND repo_id IS ?3"
            ),
            params![project_id, name, repo_id],
            branch_from_row,
        )?;
        Ok((branch, inserted > 0))
    }

    fn list_project_branches(&self, project_id: i64) -> Result<Vec<Branch>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {BRANCH_COLUMNS} FROM branches WHERE project_id = ?1 ORDER BY id"
        ))?;
        collect(stmt.query_map(params![project_id], branch_from_row)?)
    }

    fn update_branch(&self, branch: &Branch) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE branches SET ahead = ?1, behind = ?2, updated = ?3, deleted = ?4 WHERE id = ?5",
            params![
                branch.ahead,
                branch.behind,
                branch.updated.as_ref().map(format_datetime),
                branch.deleted,
                branch.id,
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("branch {}", branch.id)));
        }
        Ok(())
    }

    // Tag operations

    fn get_or_create_tag(&self, project_id: i64, name: &str) -> Result<(Tag, bool)> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO tags (name, project_id) VALUES (?1, ?2)",
            params![name, project_id],
        )?;
        let tag = conn.query_row(
            "SELECT id, name, project_id FROM tags WHERE name = ?1 AND project_id = ?2",
            params![name, project_id],
            tag_from_row,
        )?;
        Ok((tag, inserted > 0))
    }

    fn list_project_tags(&self, project_id: i64) -> Result<Vec<Tag>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, project_id FROM tags WHERE project_id = ?1 ORDER BY name",
        )?;
        collect(stmt.query_map(params![project_id], tag_from_row)?)
    }

    fn delete_tag(&self, id: i64) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM tags WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // CI operations

    fn upsert_ci_build(&self, build: &CiBuild) -> Result<CiBuild> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO ci_builds (repo_id, build_id, branch_id, sha, passed, started)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(repo_id, build_id) DO UPDATE SET
                branch_id = excluded.branch_id,
                sha = excluded.sha,
                passed = excluded.passed,
                started = excluded.started",
            params![
                build.repo_id,
                build.build_id,
                build.branch_id,
                build.sha,
                build.passed,
                format_datetime(&build.started),
            ],
        )?;
        conn.query_row(
            &format!("SELECT {CI_BUILD_COLUMNS} FROM ci_builds WHERE repo_id = ?1 AND build_id = ?2"),
            params![build.repo_id, build.build_id],
            ci_build_from_row,
        )
        .map_err(Error::from)
    }

    fn upsert_ci_job(&self, job: &CiJob) -> Result<CiJob> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO ci_jobs (repo_id, job_id, build, branch_id, name, passed, started)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(repo_id, job_id) DO UPDATE SET
                build = excluded.build,
                branch_id = excluded.branch_id,
                name = excluded.name,
                passed = excluded.passed,
                started = excluded.started",
            params![
                job.repo_id,
                job.job_id,
                job.build,
                job.branch_id,
                job.name,
                job.passed,
                format_datetime(&job.started),
            ],
        )?;
        conn.query_row(
            &format!("SELECT {CI_JOB_COLUMNS} FROM ci_jobs WHERE repo_id = ?1 AND job_id = ?2"),
            params![job.repo_id, job.job_id],
            ci_job_from_row,
        )
        .map_err(Error::from)
    }

    fn list_branch_builds(&self, branch_id: i64) -> Result<Vec<CiBuild>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CI_BUILD_COLUMNS} FROM ci_builds WHERE branch_id = ?1 ORDER BY started DESC"
        ))?;
        collect(stmt.query_map(params![branch_id], ci_build_from_row)?)
    }

    fn list_build_jobs(&self, build: i64) -> Result<Vec<CiJob>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CI_JOB_COLUMNS} FROM ci_jobs WHERE build = ?1 ORDER BY started DESC"
        ))?;
        collect(stmt.query_map(params![build], ci_job_from_row)?)
    }

    // Contributor operations

    fn create_contributor(&self) -> Result<Contributor> {
        let conn = self.conn();
        conn.execute("INSERT INTO contributors DEFAULT VALUES", [])?;
        Ok(Contributor {
            id: conn.last_insert_rowid(),
        })
    }

    fn get_contributor(&self, id: i64) -> Result<Option<Contributor>> {
        self.conn()
            .query_row(
                "SELECT id FROM contributors WHERE id = ?1",
                params![id],
                |row| Ok(Contributor { id: row.get(0)? }),
            )
            .optional()
            .map_err(Error::from)
    }

    fn list_contributors(&self) -> Result<Vec<Contributor>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id FROM contributors ORDER BY id")?;
        collect(stmt.query_map([], |row| Ok(Contributor { id: row.get(0)? }))?)
    }

    fn get_or_create_contributor_name(&self, name: &str) -> Result<(ContributorName, bool)> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO contributor_names (name) VALUES (?1)",
            params![name],
        )?;
        let fetched = conn.query_row(
            "SELECT id, name, contributor_id FROM contributor_names WHERE name = ?1",
            params![name],
            contributor_name_from_row,
        )?;
        Ok((fetched, inserted > 0))
    }

    fn get_or_create_contributor_mail(
        &self,
        mail: &str,
        invalid: bool,
    ) -> Result<(ContributorMail, bool)> {
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO contributor_mails (mail, invalid) VALUES (?1, ?2)",
            params![mail, invalid],
        )?;
        let fetched = conn.query_row(
            "SELECT id, mail, invalid, contributor_id FROM contributor_mails WHERE mail = ?1",
            params![mail],
            contributor_mail_from_row,
        )?;
        Ok((fetched, inserted > 0))
    }

    fn set_name_contributor(&self, name_id: i64, contributor_id: i64) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE contributor_names SET contributor_id = ?1 WHERE id = ?2",
            params![contributor_id, name_id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("contributor name {name_id}")));
        }
        Ok(())
    }

    fn set_mail_contributor(&self, mail_id: i64, contributor_id: i64) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE contributor_mails SET contributor_id = ?1 WHERE id = ?2",
            params![contributor_id, mail_id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("contributor mail {mail_id}")));
        }
        Ok(())
    }

    fn list_contributor_names(&self, contributor_id: i64) -> Result<Vec<ContributorName>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, contributor_id FROM contributor_names
             WHERE contributor_id = ?1 ORDER BY id",
        )?;
        collect(stmt.query_map(params![contributor_id], contributor_name_from_row)?)
    }

    fn list_contributor_mails(&self, contributor_id: i64) -> Result<Vec<ContributorMail>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, mail, invalid, contributor_id FROM contributor_mails
             WHERE contributor_id = ?1 ORDER BY id",
        )?;
        collect(stmt.query_map(params![contributor_id], contributor_mail_from_row)?)
    }

    fn merge_contributors(&self, into: i64, from: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE contributor_names SET contributor_id = ?1 WHERE contributor_id = ?2",
            params![into, from],
        )?;
        conn.execute(
            "UPDATE contributor_mails SET contributor_id = ?1 WHERE contributor_id = ?2",
            params![into, from],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO contributor_projects (contributor_id, project_id)
             SELECT ?1, project_id FROM contributor_projects WHERE contributor_id = ?2",
            params![into, from],
        )?;
        conn.execute("DELETE FROM contributors WHERE id = ?1", params![from])?;
        Ok(())
    }

    fn add_contributor_project(&self, contributor_id: i64, project_id: i64) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO contributor_projects (contributor_id, project_id) VALUES (?1, ?2)",
            params![contributor_id, project_id],
        )?;
        Ok(())
    }

    fn list_project_contributors(&self, project_id: i64) -> Result<Vec<Contributor>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT contributor_id FROM contributor_projects
             WHERE project_id = ?1 ORDER BY contributor_id",
        )?;
        collect(stmt.query_map(params![project_id], |row| {
            Ok(Contributor { id: row.get(0)? })
        })?)
    }

    // Dependency operations

    fn upsert_dependency(
        &self,
        project_id: i64,
        library_id: i64,
        cmake: bool,
        ros: bool,
        mandatory: bool,
    ) -> Result<Dependency> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO dependencies (project_id, library_id, cmake, ros, mandatory)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(project_id, library_id) DO UPDATE SET
                cmake = MAX(dependencies.cmake, excluded.cmake),
                ros = MAX(dependencies.ros, excluded.ros),
                mandatory = excluded.mandatory",
            params![project_id, library_id, cmake, ros, mandatory],
        )?;
        conn.query_row(
            &format!(
                "SELECT {DEPENDENCY_COLUMNS} FROM dependencies WHERE project_id = ?1 AND library_id = ?2"
            ),
            params![project_id, library_id],
            dependency_from_row,
        )
        .map_err(Error::from)
    }

    fn list_project_dependencies(&self, project_id: i64) -> Result<Vec<Dependency>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {DEPENDENCY_COLUMNS} FROM dependencies WHERE project_id = ?1 ORDER BY id"
        ))?;
        collect(stmt.query_map(params![project_id], dependency_from_row)?)
    }

    // Check suite operations

    fn record_check_suite(&self, id: i64) -> Result<bool> {
        let rows = self.conn().execute(
            "INSERT OR IGNORE INTO github_check_suites (id) VALUES (?1)",
            params![id],
        )?;
        Ok(rows > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn github_forge() -> Forge {
        Forge {
            id: 0,
            name: "Github".to_string(),
            slug: "github".to_string(),
            source: ForgeSource::Github,
            url: "https://github.com".to_string(),
            token: Some("secret".to_string()),
            verify: true,
        }
    }

    #[test]
    fn test_initialize_creates_tables() {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "namespaces",
            "forges",
            "licenses",
            "projects",
            "repos",
            "branches",
            "tags",
            "ci_builds",
            "ci_jobs",
            "contributors",
            "contributor_names",
            "contributor_mails",
            "dependencies",
            "github_check_suites",
        ] {
            assert!(tables.contains(&table.to_string()), "{table}");
        }
    }

    #[test]
    fn test_namespace_get_or_create() {
        let store = SqliteStore::in_memory().unwrap();

        let (ns, created) = store.get_or_create_namespace("Gepetto", true).unwrap();
        assert!(created);
        assert_eq!(ns.slug, "gepetto");
        assert!(ns.group);

        let (again, created) = store.get_or_create_namespace("gepetto", false).unwrap();
        assert!(!created);
        assert_eq!(again.id, ns.id);
        assert!(again.group);

        assert_eq!(store.get_namespace_by_slug("gepetto").unwrap(), Some(ns));
    }

    #[test]
    fn test_forge_upsert_rotates_token() {
        let store = SqliteStore::in_memory().unwrap();

        let forge = store.upsert_forge(&github_forge()).unwrap();
        assert_eq!(forge.token.as_deref(), Some("secret"));

        let rotated = store
            .upsert_forge(&Forge {
                token: Some("rotated".to_string()),
                ..github_forge()
            })
            .unwrap();
        assert_eq!(rotated.id, forge.id);
        assert_eq!(rotated.token.as_deref(), Some("rotated"));

        let by_source = store.get_forge_by_source(ForgeSource::Github).unwrap().unwrap();
        assert_eq!(by_source.id, forge.id);
        assert!(store.get_forge_by_source(ForgeSource::Travis).unwrap().is_none());
    }

    #[test]
    fn test_project_and_repo_upsert_are_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let forge = store.upsert_forge(&github_forge()).unwrap();
        let (ns, _) = store.get_or_create_namespace("gepetto", true).unwrap();

        let new_project = NewProject {
            name: "Rainboard Tests".to_string(),
            main_namespace_id: Some(ns.id),
            main_forge_id: Some(forge.id),
            public: true,
            ..NewProject::default()
        };
        let (project, created) = store.get_or_create_project(&new_project).unwrap();
        assert!(created);
        assert_eq!(project.slug, "rainboard-tests");

        let (_, created) = store.get_or_create_project(&new_project).unwrap();
        assert!(!created);

        let new_repo = NewRepo {
            name: project.name.clone(),
            forge_id: forge.id,
            namespace_id: ns.id,
            project_id: project.id,
            repo_id: 42,
            url: None,
            default_branch: "master".to_string(),
        };
        let (repo, created) = store.get_or_create_repo(&new_repo).unwrap();
        assert!(created);
        let (again, created) = store.get_or_create_repo(&new_repo).unwrap();
        assert!(!created);
        assert_eq!(again.id, repo.id);

        assert_eq!(store.list_projects().unwrap().len(), 1);
        assert_eq!(store.list_project_repos(project.id).unwrap().len(), 1);
        assert_eq!(
            store
                .get_namespace_project(ns.id, "rainboard-tests")
                .unwrap()
                .map(|p| p.id),
            Some(project.id)
        );
    }

    #[test]
    fn test_project_names_differing_in_case_share_a_row() {
        let store = SqliteStore::in_memory().unwrap();
        let project = |name: &str| NewProject {
            name: name.to_string(),
            ..NewProject::default()
        };

        let (first, created) = store.get_or_create_project(&project("Foo")).unwrap();
        assert!(created);
        let (second, created) = store.get_or_create_project(&project("foo")).unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.name, "Foo");
        assert_eq!(store.list_projects().unwrap().len(), 1);
    }

    #[test]
    fn test_branch_natural_key_with_and_without_repo() {
        let store = SqliteStore::in_memory().unwrap();
        let (project, _) = store
            .get_or_create_project(&NewProject {
                name: "proj".to_string(),
                ..NewProject::default()
            })
            .unwrap();

        let (master, created) = store.get_or_create_branch(project.id, "master", None).unwrap();
        assert!(created);
        let (again, created) = store.get_or_create_branch(project.id, "master", None).unwrap();
        assert!(!created);
        assert_eq!(again.id, master.id);
        assert_eq!(store.list_project_branches(project.id).unwrap().len(), 1);
    }

    #[test]
    fn test_ci_builds_ordered_newest_first() {
        let store = SqliteStore::in_memory().unwrap();
        let forge = store.upsert_forge(&github_forge()).unwrap();
        let (ns, _) = store.get_or_create_namespace("ns", true).unwrap();
        let (project, _) = store
            .get_or_create_project(&NewProject {
                name: "proj".to_string(),
                ..NewProject::default()
            })
            .unwrap();
        let (repo, _) = store
            .get_or_create_repo(&NewRepo {
                name: "proj".to_string(),
                forge_id: forge.id,
                namespace_id: ns.id,
                project_id: project.id,
                repo_id: 1,
                url: None,
                default_branch: "master".to_string(),
            })
            .unwrap();
        let (branch, _) = store.get_or_create_branch(project.id, "master", None).unwrap();

        let older = Utc::now() - chrono::Duration::hours(2);
        let newer = Utc::now();
        for (build_id, started, passed) in [(1, older, Some(false)), (2, newer, None)] {
            store
                .upsert_ci_build(&CiBuild {
                    id: 0,
                    repo_id: repo.id,
                    build_id,
                    branch_id: branch.id,
                    sha: None,
                    passed,
                    started,
                })
                .unwrap();
        }
        // Re-reporting a build updates it in place.
        store
            .upsert_ci_build(&CiBuild {
                id: 0,
                repo_id: repo.id,
                build_id: 2,
                branch_id: branch.id,
                sha: Some("abc".to_string()),
                passed: Some(true),
                started: newer,
            })
            .unwrap();

        let builds = store.list_branch_builds(branch.id).unwrap();
        assert_eq!(builds.len(), 2);
        assert_eq!(builds[0].build_id, 2);
        assert_eq!(builds[0].passed, Some(true));
        assert_eq!(builds[1].passed, Some(false));

        for passed in [None, Some(true)] {
            store
                .upsert_ci_job(&CiJob {
                    id: 0,
                    repo_id: repo.id,
                    job_id: 77,
                    build: builds[0].id,
                    branch_id: branch.id,
                    name: "test:debian".to_string(),
                    passed,
                    started: newer,
                })
                .unwrap();
        }
        let jobs = store.list_build_jobs(builds[0].id).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].passed, Some(true));

        assert!(store.delete_repo(repo.id).unwrap());
        assert!(store.get_repo(repo.id).unwrap().is_none());
    }

    #[test]
    fn test_dependency_flags_accumulate() {
        let store = SqliteStore::in_memory().unwrap();
        let project = |name: &str| {
            store
                .get_or_create_project(&NewProject {
                    name: name.to_string(),
                    ..NewProject::default()
                })
                .unwrap()
                .0
        };
        let (app, lib) = (project("hpp-core"), project("pinocchio"));

        store.upsert_dependency(app.id, lib.id, true, false, true).unwrap();
        let dep = store.upsert_dependency(app.id, lib.id, false, true, false).unwrap();
        assert!(dep.cmake);
        assert!(dep.ros);
        assert!(!dep.mandatory);
        assert_eq!(store.list_project_dependencies(app.id).unwrap().len(), 1);
    }

    #[test]
    fn test_merge_contributors() {
        let store = SqliteStore::in_memory().unwrap();
        let first = store.create_contributor().unwrap();
        let second = store.create_contributor().unwrap();

        let (name, _) = store.get_or_create_contributor_name("Alice").unwrap();
        let (mail, _) = store
            .get_or_create_contributor_mail("bob@example.org", false)
            .unwrap();
        store.set_name_contributor(name.id, first.id).unwrap();
        store.set_mail_contributor(mail.id, second.id).unwrap();

        store.merge_contributors(first.id, second.id).unwrap();

        assert!(store.get_contributor(second.id).unwrap().is_none());
        assert_eq!(store.list_contributor_mails(first.id).unwrap().len(), 1);
        assert_eq!(store.list_contributor_names(first.id).unwrap().len(), 1);
    }

    #[test]
    fn test_record_check_suite_once() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.record_check_suite(118578147).unwrap());
        assert!(!store.record_check_suite(118578147).unwrap());
    }

    #[test]
    fn test_delete_personal_projects() {
        let store = SqliteStore::in_memory().unwrap();
        let (group, _) = store.get_or_create_namespace("gepetto", true).unwrap();
        let (user, _) = store.get_or_create_namespace("nmansard", false).unwrap();
        for (name, ns) in [("kept", group.id), ("dropped", user.id)] {
            store
                .get_or_create_project(&NewProject {
                    name: name.to_string(),
                    main_namespace_id: Some(ns),
                    ..NewProject::default()
                })
                .unwrap();
        }

        assert_eq!(store.delete_personal_projects().unwrap(), 1);
        let names: Vec<String> = store
            .list_projects()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["kept".to_string()]);
    }
}
