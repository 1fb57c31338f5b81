/// Connection module: one session per connected participant, its read loop,
/// and the typed events it fans out to game sessions and the session router.

pub mod session;
pub mod events;

pub use session::{ConnectionSession, ConnectionInbound, ConnectionError};
pub use events::{GameEvent, ServerEvent};
