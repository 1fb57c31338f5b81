// src/server/state.rs

//! Application state for the backend server.
//!
//! Shares the session router between HTTP/WebSocket handlers.

use std::sync::Arc;

use crate::server::session_router::SessionRouter;

/// Shared application state, injected into HTTP/WebSocket handlers.
pub struct AppState {
    /// Owner of the queue, the invites and the identity registry.
    pub router: Arc<SessionRouter>,
}

impl AppState {
    pub fn new(router: Arc<SessionRouter>) -> Self {
        AppState { router }
    }
}
