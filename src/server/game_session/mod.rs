/// Game session module: the per-game turn loop and the invite registry.

pub mod invite;
pub mod messages;
pub mod session;

pub use invite::{InviteError, InviteSessionRegistry, JoinOutcome};
pub use messages::{GameKind, GameOutcome, GameSessionEvent};
pub use session::GameSession;
