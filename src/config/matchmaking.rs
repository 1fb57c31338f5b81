/// Matchmaking configuration constants.
/// 
/// This module defines parameters for the matchmaking queue and the bounded channels
/// linking connections, game sessions and the session router.
pub const PAIRING_INTERVAL_SECS: u64 = 5; // Fallback wake-up of the queue-drain loop (in seconds).

/// Capacity of every bounded channel (per-connection game/server channels, per-game event channel).
pub const CHANNEL_CAPACITY: usize = 10;
