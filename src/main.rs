//! Main entry point for the backend server.
//!
//! Creates the identity registry, the supervisor and the session router, starts the
//! matchmaking loop, and serves the `/ws` endpoint until SIGINT/SIGTERM. Shutdown cancels
//! and drains every session task before the HTTP server stops.

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use log::{error, info};

use config::server::ServerSettings;
use identity::IdentityRegistry;
use server::session_router::SessionRouter;
use server::supervisor::Supervisor;

pub mod config;
mod game;
mod identity;
mod server;

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                return;
            }
            Err(e) => error!("[Server] Cannot listen for SIGTERM: {}", e),
        }
    }
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("[Server] Cannot listen for Ctrl-C: {}", e);
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger from environment variable (default to info level).
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Without a secure random source no credential can be issued.
    let registry = match IdentityRegistry::new() {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("[Server] {}", e);
            return Err(std::io::Error::other(e));
        }
    };

    let supervisor = Supervisor::new();
    let router = SessionRouter::new(registry, supervisor.clone());
    router.spawn_queue_loop();

    // Shared application state for HTTP/WebSocket handlers.
    let state = web::Data::new(server::state::AppState::new(Arc::clone(&router)));

    let settings = ServerSettings::from_env();
    info!("[Server] Listening on {}:{}", settings.host, settings.port);

    let http = HttpServer::new(move || {
        App::new()
            .wrap(
                actix_web::middleware::DefaultHeaders::new()
                    .add(("Access-Control-Allow-Origin", "*"))
                    .add(("Access-Control-Allow-Headers", "*"))
            )
            .app_data(state.clone())
            .configure(crate::server::router::config)
    })
    .disable_signals()
    .bind((settings.host.as_str(), settings.port))?
    .run();

    let handle = http.handle();
    let running = actix_web::rt::spawn(http);

    shutdown_signal().await;
    info!("[Server] Shutdown requested");
    supervisor.shutdown().await;
    handle.stop(true).await;

    match running.await {
        Ok(result) => result,
        Err(e) => Err(std::io::Error::other(e)),
    }
}
