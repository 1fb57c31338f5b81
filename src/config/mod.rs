/// Main configuration module.
/// 
/// Re-exports submodules for game, matchmaking, identity and server configuration.
pub mod matchmaking;
pub mod game;
pub mod identity;
pub mod server;
