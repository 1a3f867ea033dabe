use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A network operation failed twice in a row.
    #[error("transient failure persisted after retry: {0}")]
    Transient(String),

    #[error("unmodeled {provider} status: {status}")]
    UnknownStatus { provider: &'static str, status: String },

    #[error("malformed branch name: {0}")]
    MalformedBranch(String),

    #[error("missing field in forge payload: {0}")]
    MissingField(String),

    #[error("bad request: {0}")]
    BadRequest(String),
}

pub type Result<T> = std::result::Result<T, Error>;
