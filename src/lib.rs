//! # Rainboard
//!
//! Mirrors software projects across GitHub, GitLab, Redmine and Travis into a
//! local datastore and git mirrors, and relays webhook events between the two
//! git forges. Usable both as the `rainboard` binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! rainboard = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use rainboard::config::Settings;
//! use rainboard::forge::HttpForgeClient;
//! use rainboard::server::{AppState, create_router};
//! use rainboard::store::{SqliteStore, Store};
//!
//! let settings = Settings::default();
//! let store = SqliteStore::new(&settings.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let client = HttpForgeClient::new(Duration::from_secs(settings.timeout_secs)).unwrap();
//! let state = Arc::new(AppState::new(Arc::new(store), Arc::new(client), settings));
//! state.reconciler().sync_all().unwrap();
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): builds the `rainboard` binary. Disable with `default-features = false`.

pub mod config;
pub mod error;
pub mod forge;
pub mod mirror;
pub mod reconcile;
pub mod relay;
pub mod server;
pub mod store;
pub mod types;
