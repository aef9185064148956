//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the identity attached to
//! authenticated requests.

use crate::config::Config;
use scriptorium_core::domain::Role;
use scriptorium_core::ports::{LibraryStore, PageRasterizer};
use std::sync::Arc;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LibraryStore>,
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub config: Arc<Config>,
}

//=========================================================================================
// CurrentUser (Specific to One Request)
//=========================================================================================

/// The caller of an authenticated request, inserted by `require_auth`.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub id: Uuid,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
