use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ForgeSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub group: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forge {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub source: ForgeSource,
    pub url: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub verify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub id: i64,
    pub name: String,
    pub spdx_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub public: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_namespace_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_forge_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    pub archived: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmake_name: Option<String>,
    pub suffix: String,
}

/// Fields required to create a [`Project`]; everything else starts at its default.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub main_namespace_id: Option<i64>,
    pub main_forge_id: Option<i64>,
    pub homepage: Option<String>,
    pub description: Option<String>,
    pub public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub forge_id: i64,
    pub namespace_id: i64,
    pub project_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clone_url: Option<String>,
    pub default_branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_issues: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_pr: Option<i64>,
    /// Numeric id assigned by the forge.
    pub repo_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forked_from: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travis_id: Option<i64>,
    pub archived: bool,
}

/// Natural key plus creation defaults for a [`Repo`].
#[derive(Debug, Clone)]
pub struct NewRepo {
    pub name: String,
    pub forge_id: i64,
    pub namespace_id: i64,
    pub project_id: i64,
    pub repo_id: i64,
    pub url: Option<String>,
    pub default_branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: i64,
    pub name: String,
    pub project_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ahead: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub behind: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub project_id: i64,
}

/// A pipeline (GitLab) or build (Travis) as reported by the forge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiBuild {
    pub id: i64,
    pub repo_id: i64,
    /// Forge-assigned pipeline or build id.
    pub build_id: i64,
    pub branch_id: i64,
    pub sha: Option<String>,
    pub passed: Option<bool>,
    pub started: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiJob {
    pub id: i64,
    pub repo_id: i64,
    pub job_id: i64,
    /// Local [`CiBuild::id`] this job belongs to.
    pub build: i64,
    pub branch_id: i64,
    pub name: String,
    pub passed: Option<bool>,
    pub started: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorName {
    pub id: i64,
    pub name: String,
    pub contributor_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorMail {
    pub id: i64,
    pub mail: String,
    pub invalid: bool,
    pub contributor_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: i64,
    pub project_id: i64,
    pub library_id: i64,
    /// Discovered through the CMake build system.
    pub cmake: bool,
    /// Discovered through a package manifest.
    pub ros: bool,
    pub mandatory: bool,
}
