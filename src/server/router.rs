//! HTTP and WebSocket routing configuration.
//!
//! A single endpoint: every client connects to `/ws` and is then routed by message type.

use actix_web::web;
use crate::server::ws_bridge::ws_connect;

/// Configure the application's HTTP/WebSocket routes.
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/ws")
            .route(web::get().to(ws_connect))
    );
}
