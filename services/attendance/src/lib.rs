pub mod archive;
pub mod device;
pub mod error;
pub mod futo;
pub mod models;
pub mod retry;
pub mod routes;
pub mod session;
pub mod settings;
pub mod token;
pub mod validation;

use std::sync::Arc;

use common::store::GithubStore;

use crate::session::SessionManager;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub manager: SessionManager<GithubStore>,
    pub store: Arc<GithubStore>,
}
