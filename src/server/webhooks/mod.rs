mod handlers;

use std::sync::Arc;

use axum::{Router, routing::post};

use crate::server::AppState;

pub fn webhook_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/github", post(handlers::github))
        .route("/gitlab", post(handlers::gitlab))
}
