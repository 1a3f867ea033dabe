mod refs;

pub use refs::{MirrorBranch, parse_mirror_branch};

use std::fs;
use std::path::{Path, PathBuf};

use git2::{AutotagOption, Cred, FetchOptions, PushOptions, RemoteCallbacks, Repository};
use reqwest::Url;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::types::{Forge, ForgeSource, Namespace};

/// Owns the on-disk mirrors, one working repository per project under
/// `root/{namespace}/{project}`.
///
/// A mirror is never shared between writers: callers serialize work on the
/// same project.
#[derive(Debug, Clone)]
pub struct MirrorManager {
    root: PathBuf,
    github_user: Option<String>,
    gitlab_ci_token: Option<String>,
}

impl MirrorManager {
    #[must_use]
    pub fn new(root: PathBuf, settings: &Settings) -> Self {
        Self {
            root,
            github_user: settings.github_user.clone(),
            gitlab_ci_token: settings.gitlab_ci_token.clone(),
        }
    }

    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.repositories_dir(), settings)
    }

    #[must_use]
    pub fn path(&self, namespace_slug: &str, project_slug: &str) -> PathBuf {
        self.root.join(namespace_slug).join(project_slug)
    }

    /// Opens the project's mirror, initializing an empty one if needed.
    pub fn ensure_repo(&self, namespace_slug: &str, project_slug: &str) -> Result<Repository> {
        let path = self.path(namespace_slug, project_slug);
        if path.join(".git").exists() {
            return Ok(Repository::open(&path)?);
        }
        fs::create_dir_all(&path)?;
        tracing::info!("Initialized mirror at {}", path.display());
        Ok(Repository::init(&path)?)
    }

    /// Opens an existing mirror without creating one.
    pub fn open(&self, namespace_slug: &str, project_slug: &str) -> Result<Repository> {
        let path = self.path(namespace_slug, project_slug);
        Repository::open(&path)
            .map_err(|_| Error::NotFound(format!("mirror {}", path.display())))
    }

    #[must_use]
    pub fn remote_name(forge: &Forge, namespace: &Namespace) -> String {
        format!("{}/{}", forge.slug, namespace.slug)
    }

    /// Authenticated clone URL of `repo_slug` under `namespace` on `forge`.
    pub fn remote_url(&self, forge: &Forge, namespace: &Namespace, repo_slug: &str) -> Result<String> {
        let mut url = Url::parse(&forge.url)
            .map_err(|e| Error::Config(format!("invalid url for forge {}: {e}", forge.slug)))?;
        url.set_path(&format!("{}/{}.git", namespace.slug, repo_slug));

        let (user, password) = match forge.source {
            ForgeSource::Gitlab => ("gitlab-ci-token", self.gitlab_ci_token.as_deref()),
            ForgeSource::Github => (
                self.github_user.as_deref().unwrap_or_default(),
                forge.token.as_deref(),
            ),
            ForgeSource::Redmine | ForgeSource::Travis => {
                return Err(Error::Config(format!(
                    "forge {} does not host git repositories",
                    forge.slug
                )));
            }
        };
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            if !user.is_empty() {
                let _ = url.set_username(user);
                let _ = url.set_password(Some(password));
            }
        }
        Ok(url.to_string())
    }

    /// Returns the name of the `{forge}/{namespace}` remote, creating it if absent.
    pub fn ensure_remote(
        &self,
        repo: &Repository,
        forge: &Forge,
        namespace: &Namespace,
        repo_slug: &str,
    ) -> Result<String> {
        let name = Self::remote_name(forge, namespace);
        if repo.find_remote(&name).is_err() {
            let url = self.remote_url(forge, namespace, repo_slug)?;
            repo.remote(&name, &url)?;
            tracing::debug!("Added remote {} to {}", name, repo.path().display());
        }
        Ok(name)
    }

    /// Creates `name` pointing at `url` unless a remote by that name exists.
    pub fn ensure_remote_url(&self, repo: &Repository, name: &str, url: &str) -> Result<()> {
        if repo.find_remote(name).is_err() {
            repo.remote(name, url)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn has_remote(repo: &Repository, name: &str) -> bool {
        repo.find_remote(name).is_ok()
    }

    /// Fetches every branch and tag of `remote`, retrying once.
    ///
    /// A second failure is reported as [`Error::Transient`]; callers decide
    /// whether the binding behind the remote is gone.
    pub fn fetch(&self, repo: &Repository, remote: &str) -> Result<()> {
        let attempt = || -> std::result::Result<(), git2::Error> {
            let mut handle = repo.find_remote(remote)?;
            let mut opts = FetchOptions::new();
            opts.remote_callbacks(callbacks(handle.url()))
                .download_tags(AutotagOption::All)
                .prune(git2::FetchPrune::On);
            handle.fetch(&[] as &[&str], Some(&mut opts), None)
        };

        match attempt() {
            Ok(()) => Ok(()),
            Err(e) if e.code() == git2::ErrorCode::NotFound && e.class() == git2::ErrorClass::Config => {
                Err(Error::NotFound(format!("remote {remote}")))
            }
            Err(e) => {
                tracing::warn!("fetch of {} failed ({}), retrying once", remote, e.message());
                attempt().map_err(|e| Error::Transient(format!("fetch {remote}: {}", e.message())))
            }
        }
    }

    /// Force-pushes local branch `branch` to the branch of the same name on `remote`.
    pub fn push(&self, repo: &Repository, remote: &str, branch: &str) -> Result<()> {
        let refspec = format!("+refs/heads/{branch}:refs/heads/{branch}");
        let attempt = || -> std::result::Result<(), git2::Error> {
            let mut handle = repo.find_remote(remote)?;
            let mut cbs = callbacks(handle.url());
            cbs.push_update_reference(|refname, status| match status {
                Some(msg) => Err(git2::Error::from_str(&format!("{refname} rejected: {msg}"))),
                None => Ok(()),
            });
            let mut opts = PushOptions::new();
            opts.remote_callbacks(cbs);
            handle.push(&[refspec.as_str()], Some(&mut opts))
        };

        attempt().or_else(|e| {
            tracing::warn!("push of {} to {} failed ({}), retrying once", branch, remote, e.message());
            attempt().map_err(|e| Error::Transient(format!("push {remote} {branch}: {}", e.message())))
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Credential callbacks answering with the userinfo embedded in the remote URL.
fn callbacks(remote_url: Option<&str>) -> RemoteCallbacks<'static> {
    let userinfo = remote_url
        .and_then(|u| Url::parse(u).ok())
        .filter(|u| !u.username().is_empty())
        .map(|u| {
            let user = urlencoding::decode(u.username())
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| u.username().to_string());
            let password = u
                .password()
                .map(|p| {
                    urlencoding::decode(p)
                        .map(|s| s.into_owned())
                        .unwrap_or_else(|_| p.to_string())
                })
                .unwrap_or_default();
            (user, password)
        });

    let mut cbs = RemoteCallbacks::new();
    cbs.credentials(move |_url, _username, _allowed| match &userinfo {
        Some((user, password)) => Cred::userpass_plaintext(user, password),
        None => Cred::default(),
    });
    cbs
}
