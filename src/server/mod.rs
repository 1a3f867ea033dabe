mod router;
mod webhooks;

pub use router::{AppState, create_router};
pub use webhooks::webhook_router;
