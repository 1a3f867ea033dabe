use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Router, routing::get};

use super::webhooks::webhook_router;
use crate::config::Settings;
use crate::forge::ForgeClient;
use crate::mirror::MirrorManager;
use crate::reconcile::Reconciler;
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub client: Arc<dyn ForgeClient>,
    pub mirrors: MirrorManager,
    pub settings: Settings,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, client: Arc<dyn ForgeClient>, settings: Settings) -> Self {
        Self {
            store,
            client,
            mirrors: MirrorManager::from_settings(&settings),
            settings,
        }
    }

    /// A reconciler over this state's collaborators.
    #[must_use]
    pub fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(
            self.store.as_ref(),
            self.client.as_ref(),
            &self.mirrors,
            &self.settings,
        )
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/webhooks", webhook_router())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
