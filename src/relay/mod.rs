//! Inbound webhook boundary.
//!
//! Each entry point verifies where a request comes from and that it carries
//! the shared secret before touching anything, then decodes the event kind
//! once and dispatches on it.

mod events;
pub mod github;
pub mod gitlab;
mod push;
mod verify;

pub use events::{GithubEvent, GitlabEvent};
pub use verify::{client_ip, verify_signature};

use axum::http::{HeaderMap, StatusCode};

use crate::error::Error;
use crate::server::AppState;
use crate::types::{Forge, ForgeSource, Namespace, Project, slugify};

pub const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

#[derive(Debug)]
pub enum RelayError {
    /// Source address or credential missing or outside the allowed networks.
    Unauthorized(&'static str),
    Forbidden(&'static str),
    UnsupportedAlgorithm,
    UnknownEvent(String),
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl RelayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) | Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::UnsupportedAlgorithm => StatusCode::NOT_IMPLEMENTED,
            Self::UnknownEvent(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Unauthorized(reason) | Self::Forbidden(reason) => (*reason).to_string(),
            Self::UnsupportedAlgorithm => "I only speak sha1.".to_string(),
            Self::UnknownEvent(_) => "event not found".to_string(),
            Self::BadRequest(msg) => msg.clone(),
            Self::NotFound(what) => format!("{what} not found"),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Whether a configured login redirect may answer this rejection.
    pub fn redirects_to_login(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

impl From<Error> for RelayError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(what) => Self::NotFound(what),
            Error::MissingField(field) => Self::BadRequest(format!("missing field: {field}")),
            Error::BadRequest(msg) | Error::MalformedBranch(msg) => Self::BadRequest(msg),
            Error::Json(e) => Self::BadRequest(format!("invalid payload: {e}")),
            other => {
                tracing::error!("Relay failed: {}", other);
                Self::Internal(other.to_string())
            }
        }
    }
}

fn event_header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn parse_payload(body: &[u8]) -> Result<serde_json::Value, RelayError> {
    Ok(serde_json::from_slice(body).map_err(Error::from)?)
}

/// Namespace and project a payload refers to, both by display name.
fn resolve_project(
    state: &AppState,
    namespace: &str,
    project: &str,
) -> Result<(Namespace, Project), RelayError> {
    let namespace = state
        .store
        .get_namespace_by_slug(&slugify(namespace))?
        .ok_or_else(|| RelayError::NotFound(format!("namespace {namespace}")))?;
    let project = state
        .store
        .get_namespace_project(namespace.id, &slugify(project))?
        .ok_or_else(|| RelayError::NotFound(format!("project {}/{project}", namespace.slug)))?;
    Ok((namespace, project))
}

fn configured_forge(state: &AppState, source: ForgeSource) -> Result<Forge, RelayError> {
    state
        .store
        .get_forge_by_source(source)?
        .ok_or_else(|| RelayError::NotFound(format!("{source} forge")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(RelayError::Unauthorized("no token").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(RelayError::UnsupportedAlgorithm.status_code(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(
            RelayError::UnknownEvent("issues".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert!(RelayError::Unauthorized("no token").redirects_to_login());
        assert!(!RelayError::Forbidden("wrong token.").redirects_to_login());
    }

    #[test]
    fn test_store_errors_map_to_client_errors() {
        let err: RelayError = Error::NotFound("project gepetto/foo".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let err: RelayError = Error::MissingField("ref".to_string()).into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
