use std::sync::LazyLock;

use git2::{Oid, Repository};
use regex::Regex;

use super::Reconciler;
use crate::error::Result;
use crate::types::{Project, slugify};

static CMAKE_DEPENDENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)ADD_(REQUIRED|OPTIONAL|PROJECT)_DEPENDENCY\s*\(\s*"?\s*([A-Za-z0-9_.+-]+)([^)]*)\)"#)
        .expect("valid regex")
});

static CMAKE_SET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)SET\s*\(\s*PROJECT_(NAME|DESCRIPTION|URL)\s+"?([^")]*)"?\s*\)"#)
        .expect("valid regex")
});

static PACKAGE_DEPEND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(depend|build_depend|exec_depend|run_depend|test_depend)>\s*([^<\s]+)\s*</")
        .expect("valid regex")
});

/// Project metadata declared through `SET(PROJECT_*)` in a CMakeLists.txt.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CmakeInfo {
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
}

impl CmakeInfo {
    /// Copies the parsed fields onto `project`. Description and homepage set
    /// by a forge are kept.
    pub fn apply(&self, project: &mut Project) {
        if self.name.is_some() {
            project.cmake_name.clone_from(&self.name);
        }
        if project.description.is_none() {
            project.description.clone_from(&self.description);
        }
        if project.homepage.is_none() {
            project.homepage.clone_from(&self.url);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDependency {
    pub name: String,
    pub cmake: bool,
    pub ros: bool,
    pub mandatory: bool,
}

/// Everything read from the build files of one commit.
#[derive(Debug, Default, Clone)]
pub struct BuildManifest {
    pub info: CmakeInfo,
    pub dependencies: Vec<ParsedDependency>,
}

impl BuildManifest {
    /// Adds `dep`, folding it into an earlier entry for the same library.
    pub fn add(&mut self, dep: ParsedDependency) {
        match self.dependencies.iter_mut().find(|d| d.name == dep.name) {
            Some(existing) => {
                existing.cmake |= dep.cmake;
                existing.ros |= dep.ros;
                existing.mandatory |= dep.mandatory;
            }
            None => self.dependencies.push(dep),
        }
    }
}

pub fn parse_cmake(content: &str) -> BuildManifest {
    let mut manifest = BuildManifest::default();

    for caps in CMAKE_SET.captures_iter(content) {
        let value = caps[2].trim();
        if value.is_empty() || value.contains("${") {
            continue;
        }
        let value = Some(value.to_string());
        match caps[1].to_ascii_uppercase().as_str() {
            "NAME" => manifest.info.name = value,
            "DESCRIPTION" => manifest.info.description = value,
            _ => manifest.info.url = value,
        }
    }

    for caps in CMAKE_DEPENDENCY.captures_iter(content) {
        let kind = caps[1].to_ascii_uppercase();
        let mandatory = match kind.as_str() {
            "OPTIONAL" => false,
            "PROJECT" => !caps[3].to_ascii_uppercase().contains("OPTIONAL"),
            _ => true,
        };
        manifest.add(ParsedDependency {
            name: caps[2].to_ascii_lowercase(),
            cmake: true,
            ros: false,
            mandatory,
        });
    }

    manifest
}

pub fn parse_package_xml(content: &str) -> Vec<ParsedDependency> {
    let mut manifest = BuildManifest::default();
    for caps in PACKAGE_DEPEND.captures_iter(content) {
        manifest.add(ParsedDependency {
            name: caps[2].to_ascii_lowercase(),
            cmake: false,
            ros: true,
            mandatory: &caps[1] != "test_depend",
        });
    }
    manifest.dependencies
}

impl Reconciler<'_> {
    /// Reads the build files at `tip` into `project` and its dependency edges.
    pub(super) fn update_dependencies(
        &self,
        git: &Repository,
        tip: Oid,
        project: &mut Project,
    ) -> Result<()> {
        let mut manifest = match self.mirrors.read_file(git, tip, "CMakeLists.txt")? {
            Some(content) => parse_cmake(&content),
            None => BuildManifest::default(),
        };
        if let Some(content) = self.mirrors.read_file(git, tip, "package.xml")? {
            for dep in parse_package_xml(&content) {
                manifest.add(dep);
            }
        }

        manifest.info.apply(project);

        for dep in manifest.dependencies {
            let Some(library) = self.store.get_project_by_slug(&slugify(&dep.name))? else {
                tracing::debug!("{} depends on unknown library {}", project.name, dep.name);
                continue;
            };
            if library.id == project.id {
                continue;
            }
            self.store
                .upsert_dependency(project.id, library.id, dep.cmake, dep.ros, dep.mandatory)?;
        }
        Ok(())
    }
}
