/// Matchmaking module: the FIFO queue players wait in for a random opponent.
///
/// The queue itself is a plain structure; the session router owns it behind a lock and
/// runs the drain loop that turns pairs into game sessions.

pub mod queue;

pub use queue::{MatchmakingQueue, Queued};
