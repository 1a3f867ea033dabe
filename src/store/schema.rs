pub const SCHEMA: &str = r#"
-- Owners (users or groups), shared across forges
CREATE TABLE IF NOT EXISTS namespaces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    is_group INTEGER NOT NULL DEFAULT 0
);

-- Configured remote services
CREATE TABLE IF NOT EXISTS forges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    slug TEXT NOT NULL UNIQUE,
    source TEXT NOT NULL,          -- github | gitlab | redmine | travis
    url TEXT NOT NULL,
    token TEXT,
    verify INTEGER NOT NULL DEFAULT 1
);

-- SPDX reference table
CREATE TABLE IF NOT EXISTS licenses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    spdx_id TEXT NOT NULL UNIQUE,
    github_key TEXT,
    url TEXT
);

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    slug TEXT NOT NULL UNIQUE,
    public INTEGER NOT NULL DEFAULT 1,
    main_namespace_id INTEGER REFERENCES namespaces(id) ON DELETE SET NULL,
    main_forge_id INTEGER REFERENCES forges(id) ON DELETE SET NULL,
    license_id INTEGER REFERENCES licenses(id) ON DELETE SET NULL,
    homepage TEXT,
    description TEXT,
    version TEXT,
    updated TEXT,                  -- newest branch timestamp
    archived INTEGER NOT NULL DEFAULT 0,

    -- Build metadata parsed from the main branch
    cmake_name TEXT,
    suffix TEXT NOT NULL DEFAULT ''
);

-- One binding of a project on one forge under one namespace
CREATE TABLE IF NOT EXISTS repos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    slug TEXT NOT NULL,
    forge_id INTEGER NOT NULL REFERENCES forges(id) ON DELETE CASCADE,
    namespace_id INTEGER NOT NULL REFERENCES namespaces(id) ON DELETE CASCADE,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    license_id INTEGER REFERENCES licenses(id) ON DELETE SET NULL,
    homepage TEXT,
    url TEXT,
    clone_url TEXT,
    default_branch TEXT NOT NULL DEFAULT 'master',
    open_issues INTEGER,
    open_pr INTEGER,
    repo_id INTEGER NOT NULL,      -- forge-assigned id
    forked_from INTEGER,
    travis_id INTEGER,
    archived INTEGER NOT NULL DEFAULT 0,

    UNIQUE(forge_id, namespace_id, project_id)
);

CREATE TABLE IF NOT EXISTS branches (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    repo_id INTEGER REFERENCES repos(id) ON DELETE CASCADE,
    ahead INTEGER,
    behind INTEGER,
    updated TEXT,
    deleted INTEGER NOT NULL DEFAULT 0
);

-- NULL repo_id never collides in a plain UNIQUE constraint
CREATE UNIQUE INDEX IF NOT EXISTS idx_branches_natural
    ON branches(project_id, name, IFNULL(repo_id, 0));

CREATE TABLE IF NOT EXISTS tags (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    UNIQUE(name, project_id)
);

CREATE TABLE IF NOT EXISTS ci_builds (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL REFERENCES repos(id) ON DELETE CASCADE,
    build_id INTEGER NOT NULL,
    branch_id INTEGER NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
    sha TEXT,
    passed INTEGER,                -- NULL = unknown
    started TEXT NOT NULL,
    UNIQUE(repo_id, build_id)
);

CREATE TABLE IF NOT EXISTS ci_jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_id INTEGER NOT NULL REFERENCES repos(id) ON DELETE CASCADE,
    job_id INTEGER NOT NULL,
    build INTEGER NOT NULL REFERENCES ci_builds(id) ON DELETE CASCADE,
    branch_id INTEGER NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    passed INTEGER,
    started TEXT NOT NULL,
    UNIQUE(repo_id, job_id)
);

CREATE TABLE IF NOT EXISTS contributors (
    id INTEGER PRIMARY KEY AUTOINCREMENT
);

CREATE TABLE IF NOT EXISTS contributor_names (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    contributor_id INTEGER REFERENCES contributors(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS contributor_mails (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    mail TEXT NOT NULL UNIQUE,
    invalid INTEGER NOT NULL DEFAULT 0,
    contributor_id INTEGER REFERENCES contributors(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS contributor_projects (
    contributor_id INTEGER NOT NULL REFERENCES contributors(id) ON DELETE CASCADE,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    PRIMARY KEY (contributor_id, project_id)
);

CREATE TABLE IF NOT EXISTS dependencies (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    library_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    cmake INTEGER NOT NULL DEFAULT 0,
    ros INTEGER NOT NULL DEFAULT 0,
    mandatory INTEGER NOT NULL DEFAULT 1,
    UNIQUE(project_id, library_id)
);

CREATE TABLE IF NOT EXISTS github_check_suites (
    id INTEGER PRIMARY KEY
);

-- Create indexes
CREATE INDEX IF NOT EXISTS idx_projects_namespace ON projects(main_namespace_id);
CREATE INDEX IF NOT EXISTS idx_repos_project ON repos(project_id);
CREATE INDEX IF NOT EXISTS idx_branches_project ON branches(project_id);
CREATE INDEX IF NOT EXISTS idx_tags_project ON tags(project_id);
CREATE INDEX IF NOT EXISTS idx_ci_builds_branch ON ci_builds(branch_id, started);
CREATE INDEX IF NOT EXISTS idx_ci_jobs_build ON ci_jobs(build);
CREATE INDEX IF NOT EXISTS idx_contributor_names_owner ON contributor_names(contributor_id);
CREATE INDEX IF NOT EXISTS idx_contributor_mails_owner ON contributor_mails(contributor_id);
CREATE INDEX IF NOT EXISTS idx_dependencies_project ON dependencies(project_id);
"#;
