use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::ForgeSource;

/// A forge to create (or re-token) in the datastore on `init`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgeSeed {
    pub name: String,
    pub source: ForgeSource,
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_true")]
    pub verify: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Username embedded in authenticated GitHub remote URLs.
    pub github_user: Option<String>,
    pub github_webhook_secret: Option<String>,
    pub gitlab_webhook_token: Option<String>,
    /// Token embedded in GitLab remote URLs as the `gitlab-ci-token` user.
    pub gitlab_ci_token: Option<String>,
    /// Network GitLab webhooks must originate from.
    pub gitlab_network: String,
    /// When set, failed webhook source checks redirect here instead of answering 403.
    pub login_redirect: Option<String>,
    pub main_branches: Vec<String>,
    pub timeout_secs: u64,
    pub forges: Vec<ForgeSeed>,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            github_user: None,
            github_webhook_secret: None,
            gitlab_webhook_token: None,
            gitlab_ci_token: None,
            gitlab_network: "140.93.0.0/16".to_string(),
            login_redirect: None,
            main_branches: vec!["master".to_string(), "devel".to_string()],
            timeout_secs: 30,
            forges: Vec::new(),
        }
    }
}

impl Settings {
    /// Loads settings from a TOML file, falling back to defaults when the file
    /// does not exist, then applies environment overrides for secrets.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
        } else {
            tracing::debug!("No settings file at {}, using defaults", path.display());
            Self::default()
        };
        settings.apply_env();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("RAINBOARD_GITHUB_WEBHOOK_SECRET") {
            self.github_webhook_secret = Some(v);
        }
        if let Ok(v) = std::env::var("RAINBOARD_GITLAB_WEBHOOK_TOKEN") {
            self.gitlab_webhook_token = Some(v);
        }
        if let Ok(v) = std::env::var("RAINBOARD_GITLAB_CI_TOKEN") {
            self.gitlab_ci_token = Some(v);
        }
    }

    fn validate(&self) -> Result<()> {
        self.gitlab_net()?;
        if self.main_branches.is_empty() {
            return Err(Error::Config("main_branches cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("rainboard.db")
    }

    #[must_use]
    pub fn repositories_dir(&self) -> PathBuf {
        self.data_dir.join("repositories")
    }

    pub fn gitlab_net(&self) -> Result<IpNet> {
        self.gitlab_network
            .parse()
            .map_err(|e| Error::Config(format!("gitlab_network '{}': {e}", self.gitlab_network)))
    }

    /// The canonical branch every other branch is compared against.
    #[must_use]
    pub fn main_branch(&self) -> &str {
        self.main_branches.first().map_or("master", String::as_str)
    }
}
