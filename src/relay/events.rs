use super::RelayError;

/// GitHub event kinds, from the `X-Github-Event` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GithubEvent {
    Ping,
    Push,
    PullRequest,
    CheckSuite,
}

impl GithubEvent {
    /// A missing header is a ping.
    pub fn from_header(value: Option<&str>) -> Result<Self, RelayError> {
        match value.unwrap_or("ping") {
            "ping" => Ok(Self::Ping),
            "push" => Ok(Self::Push),
            "pull_request" => Ok(Self::PullRequest),
            "check_suite" => Ok(Self::CheckSuite),
            other => Err(RelayError::UnknownEvent(other.to_string())),
        }
    }
}

/// GitLab event kinds, from the `X-Gitlab-Event` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitlabEvent {
    Ping,
    Pipeline,
    Push,
}

impl GitlabEvent {
    pub fn from_header(value: Option<&str>) -> Result<Self, RelayError> {
        match value.unwrap_or("ping") {
            "ping" => Ok(Self::Ping),
            "Pipeline Hook" => Ok(Self::Pipeline),
            "Push Hook" => Ok(Self::Push),
            other => Err(RelayError::UnknownEvent(other.to_string())),
        }
    }
}
