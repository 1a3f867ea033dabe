use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of service a [`super::Forge`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForgeSource {
    Github,
    Gitlab,
    Redmine,
    Travis,
}

impl ForgeSource {
    pub const ALL: [ForgeSource; 4] = [Self::Github, Self::Gitlab, Self::Redmine, Self::Travis];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Redmine => "redmine",
            Self::Travis => "travis",
        }
    }

    pub fn parse(s: &str) -> Option<ForgeSource> {
        Self::ALL.into_iter().find(|source| source.as_str() == s)
    }

    /// Whether repos on this forge hold git history that can be mirrored.
    #[must_use]
    pub const fn hosts_git(self) -> bool {
        matches!(self, Self::Github | Self::Gitlab)
    }
}

impl fmt::Display for ForgeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
