use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::relay::{self, RelayError};
use crate::server::AppState;

type Handler = fn(&AppState, &HeaderMap, &[u8]) -> Result<String, RelayError>;

fn relay_error_response(state: &AppState, err: RelayError) -> Response {
    warn!("Webhook rejected: {:?}", err);

    if err.redirects_to_login() {
        if let Some(login) = state.settings.login_redirect.as_deref() {
            return (StatusCode::FOUND, [(LOCATION, login.to_string())]).into_response();
        }
    }
    (err.status_code(), err.message()).into_response()
}

/// Runs a relay handler off the async executor; git and forge calls block.
async fn dispatch(state: Arc<AppState>, headers: HeaderMap, body: Bytes, handler: Handler) -> Response {
    let worker = Arc::clone(&state);
    let outcome = tokio::task::spawn_blocking(move || handler(&worker, &headers, &body)).await;

    match outcome {
        Ok(Ok(reply)) => (StatusCode::OK, reply).into_response(),
        Ok(Err(err)) => relay_error_response(&state, err),
        Err(e) => {
            tracing::error!("Webhook handler panicked: {}", e);
            relay_error_response(&state, RelayError::Internal(e.to_string()))
        }
    }
}

pub async fn github(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch(state, headers, body, relay::github::handle).await
}

pub async fn gitlab(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    dispatch(state, headers, body, relay::gitlab::handle).await
}
