// src/server/mod.rs

//! Server layer root module.
//!
//! This module organizes the backend server components:
//! - Application state and HTTP/WebSocket routing
//! - The WebSocket bridge and the transport seam it implements
//! - Connections, the matchmaking queue and game sessions
//! - The session router and the supervisor that owns every task

pub mod state;
pub mod router;
pub mod ws_bridge;
pub mod ws_error;
pub mod transport;
pub mod messages;
pub mod connection;
pub mod handshake;
pub mod matchmaking;
pub mod game_session;
pub mod session_router;
pub mod supervisor;

#[cfg(test)]
pub mod testing;
