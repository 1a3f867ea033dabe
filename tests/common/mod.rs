#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::Router;
use git2::{Commit, Oid, Repository, Signature};
use serde_json::Value;
use tempfile::TempDir;

use rainboard::config::Settings;
use rainboard::error::Result;
use rainboard::forge::{ForgeClient, Page};
use rainboard::server::{AppState, create_router};
use rainboard::store::{SqliteStore, Store};
use rainboard::types::{Forge, ForgeSource, Namespace, NewProject, Project};

pub const WEBHOOK_SECRET: &str = "s3cret";
pub const GITLAB_TOKEN: &str = "t0ken";
pub const GITHUB_HOOK_IP: &str = "192.30.252.41";
pub const GITLAB_HOOK_IP: &str = "140.93.5.4";

/// Forge client answering from canned payloads and recording deletions.
#[derive(Default)]
pub struct FakeForge {
    responses: Mutex<HashMap<String, Value>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeForge {
    pub fn respond(&self, path: &str, body: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(path.to_string(), body);
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

impl ForgeClient for FakeForge {
    fn fetch_page(&self, _forge: &Forge, path: &str, _page: u32) -> Result<Page> {
        Ok(match self.responses.lock().unwrap().get(path) {
            Some(body) => Page {
                status: 200,
                body: Some(body.clone()),
                next: None,
            },
            None => Page::empty(404),
        })
    }

    fn get(&self, _forge: &Forge, path: &str) -> Result<Option<Value>> {
        Ok(self.responses.lock().unwrap().get(path).cloned())
    }

    fn delete(&self, _forge: &Forge, path: &str) -> Result<u16> {
        self.deleted.lock().unwrap().push(path.to_string());
        Ok(204)
    }
}

/// An in-memory datastore with a GitHub and a GitLab forge, the `Gepetto`
/// group and one project, plus a temp directory for mirrors and upstreams.
pub struct Fixture {
    pub dir: TempDir,
    pub state: Arc<AppState>,
    pub forge: Arc<FakeForge>,
    pub github: Forge,
    pub gitlab: Forge,
    pub namespace: Namespace,
    pub project: Project,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(configure: impl FnOnce(&mut Settings)) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let mut settings = Settings {
            data_dir: dir.path().join("data"),
            github_user: Some("hook-bot".to_string()),
            github_webhook_secret: Some(WEBHOOK_SECRET.to_string()),
            gitlab_webhook_token: Some(GITLAB_TOKEN.to_string()),
            ..Settings::default()
        };
        configure(&mut settings);

        let store = SqliteStore::in_memory().expect("open store");
        let github = store
            .upsert_forge(&forge("GitHub", ForgeSource::Github, "https://github.com"))
            .unwrap();
        let gitlab = store
            .upsert_forge(&forge("GitLab", ForgeSource::Gitlab, "https://gitlab.laas.fr"))
            .unwrap();
        let (namespace, _) = store.get_or_create_namespace("Gepetto", true).unwrap();
        let (project, _) = store
            .get_or_create_project(&NewProject {
                name: "rainboard-tests".to_string(),
                main_namespace_id: Some(namespace.id),
                main_forge_id: Some(github.id),
                public: true,
                ..NewProject::default()
            })
            .unwrap();

        let client = Arc::new(FakeForge::default());
        client.respond(
            "/meta",
            serde_json::json!({ "hooks": ["192.30.252.0/22", "185.199.108.0/22"] }),
        );
        let state = Arc::new(AppState::new(Arc::new(store), client.clone(), settings));

        Self {
            dir,
            state,
            forge: client,
            github,
            gitlab,
            namespace,
            project,
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.state.store.as_ref()
    }

    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    /// The project's mirror, created empty on first use.
    pub fn mirror(&self) -> Repository {
        self.state
            .mirrors
            .ensure_repo(&self.namespace.slug, &self.project.slug)
            .unwrap()
    }

    /// A fresh non-bare repository standing in for a forge.
    pub fn upstream(&self, name: &str) -> (PathBuf, Repository) {
        let path = self.dir.path().join("upstream").join(name);
        let repo = Repository::init(&path).unwrap();
        (path, repo)
    }

    /// An empty bare repository standing in for a push target.
    pub fn bare(&self, name: &str) -> (PathBuf, Repository) {
        let path = self.dir.path().join("bare").join(name);
        let repo = Repository::init_bare(&path).unwrap();
        (path, repo)
    }

    /// Points the `{forge}/gepetto` remote of the mirror at a local path.
    pub fn link(&self, mirror: &Repository, forge: &Forge, path: &std::path::Path) {
        let name = format!("{}/{}", forge.slug, self.namespace.slug);
        self.state
            .mirrors
            .ensure_remote_url(mirror, &name, path.to_str().unwrap())
            .unwrap();
    }
}

fn forge(name: &str, source: ForgeSource, url: &str) -> Forge {
    Forge {
        id: 0,
        name: name.to_string(),
        slug: name.to_lowercase(),
        source,
        url: url.to_string(),
        token: Some("forge-token".to_string()),
        verify: true,
    }
}

/// Commits one new file on `branch`, on top of `parent`.
pub fn commit(
    repo: &Repository,
    branch: &str,
    parent: Option<Oid>,
    file: &str,
    author: (&str, &str),
) -> Oid {
    let sig = Signature::now(author.0, author.1).unwrap();
    let parents: Vec<Commit<'_>> = parent
        .map(|oid| repo.find_commit(oid).unwrap())
        .into_iter()
        .collect();
    let base = parents.first().map(|c| c.tree().unwrap());

    let blob = repo.blob(file.as_bytes()).unwrap();
    let mut builder = repo.treebuilder(base.as_ref()).unwrap();
    builder.insert(file, blob, 0o100644).unwrap();
    let tree = repo.find_tree(builder.write().unwrap()).unwrap();

    let parent_refs: Vec<&Commit<'_>> = parents.iter().collect();
    repo.commit(
        Some(&format!("refs/heads/{branch}")),
        &sig,
        &sig,
        &format!("add {file}"),
        &tree,
        &parent_refs,
    )
    .unwrap()
}

/// Commits `count` files in a row and returns the last commit.
pub fn commits(
    repo: &Repository,
    branch: &str,
    mut parent: Option<Oid>,
    prefix: &str,
    count: usize,
) -> Oid {
    for i in 0..count {
        parent = Some(commit(
            repo,
            branch,
            parent,
            &format!("{prefix}-{i}"),
            ("Guilhem Saurel", "guilhem.saurel@laas.fr"),
        ));
    }
    parent.unwrap()
}

pub fn hub_signature(body: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    let mut mac = Hmac::<sha1::Sha1>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body);
    format!("sha1={}", hex::encode(mac.finalize().into_bytes()))
}
