use crate::error::{Error, Result};

/// Maps a Travis build state onto passed / failed / unknown.
pub fn travis_status(status: &str) -> Result<Option<bool>> {
    match status {
        "created" | "started" | "canceled" => Ok(None),
        "passed" => Ok(Some(true)),
        "failed" | "errored" => Ok(Some(false)),
        other => Err(Error::UnknownStatus {
            provider: "travis",
            status: other.to_string(),
        }),
    }
}

/// Maps a GitLab pipeline or job status onto passed / failed / unknown.
pub fn gitlab_status(status: &str) -> Result<Option<bool>> {
    match status {
        "success" => Ok(Some(true)),
        "failed" => Ok(Some(false)),
        "pending" | "skipped" | "canceled" | "running" => Ok(None),
        other => Err(Error::UnknownStatus {
            provider: "gitlab",
            status: other.to_string(),
        }),
    }
}
