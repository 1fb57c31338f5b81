//! Typed events a connection fans out to its two consumers.
//!
//! The game channel is drained by the [`GameSession`](crate::server::game_session::GameSession)
//! the player currently sits in; the server channel by the router's per-connection listener.

use crate::identity::Identity;
use crate::server::messages::{ClientMessage, MoveRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    Move(MoveRequest),
    /// The client announced it is closing.
    Closed { reason: String },
    LeaveGame,
    LeaveQueue,
    Unknown(String),
    /// The transport went away.
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    RequestGame,
    LeaveQueue,
    UpdateIdentity(Identity),
    JoinInviteGame { game_id: String },
    CreateInviteGame,
    LeaveInviteGame { game_id: String },
    Disconnected,
    /// A game-scoped message received while the player is not in a game.
    NotInGame(GameEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routed {
    Game(GameEvent),
    Server(ServerEvent),
}

fn game_scoped(event: GameEvent, in_game: bool) -> Routed {
    if in_game {
        Routed::Game(event)
    } else {
        Routed::Server(ServerEvent::NotInGame(event))
    }
}

/// Decide which channel a decoded message belongs to.
pub fn route(msg: ClientMessage, in_game: bool) -> Routed {
    match msg {
        ClientMessage::Move(mv) => game_scoped(GameEvent::Move(mv), in_game),
        ClientMessage::Close { reason } => game_scoped(GameEvent::Closed { reason }, in_game),
        ClientMessage::LeaveGame => game_scoped(GameEvent::LeaveGame, in_game),
        ClientMessage::Unknown(kind) => game_scoped(GameEvent::Unknown(kind), in_game),
        ClientMessage::LeaveQueue if in_game => Routed::Game(GameEvent::LeaveQueue),
        ClientMessage::LeaveQueue => Routed::Server(ServerEvent::LeaveQueue),
        ClientMessage::RequestGame => Routed::Server(ServerEvent::RequestGame),
        ClientMessage::UpdateIdentity(identity) => Routed::Server(ServerEvent::UpdateIdentity(identity)),
        ClientMessage::JoinInviteGame { game_id } => Routed::Server(ServerEvent::JoinInviteGame { game_id }),
        ClientMessage::CreateInviteGame => Routed::Server(ServerEvent::CreateInviteGame),
        ClientMessage::LeaveInviteGame { game_id } => Routed::Server(ServerEvent::LeaveInviteGame { game_id }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_messages_follow_in_game_flag() {
        let mv = MoveRequest { row: 1, col: 1, mark: "x".into() };
        assert_eq!(
            route(ClientMessage::Move(mv.clone()), true),
            Routed::Game(GameEvent::Move(mv.clone()))
        );
        assert_eq!(
            route(ClientMessage::Move(mv.clone()), false),
            Routed::Server(ServerEvent::NotInGame(GameEvent::Move(mv)))
        );
        assert_eq!(
            route(ClientMessage::Unknown("wat".into()), true),
            Routed::Game(GameEvent::Unknown("wat".into()))
        );
    }

    #[test]
    fn test_lifecycle_messages_go_to_server_channel() {
        for in_game in [true, false] {
            assert_eq!(route(ClientMessage::RequestGame, in_game), Routed::Server(ServerEvent::RequestGame));
            assert_eq!(route(ClientMessage::CreateInviteGame, in_game), Routed::Server(ServerEvent::CreateInviteGame));
            assert_eq!(
                route(ClientMessage::JoinInviteGame { game_id: "g".into() }, in_game),
                Routed::Server(ServerEvent::JoinInviteGame { game_id: "g".into() })
            );
        }
    }

    #[test]
    fn test_leave_queue_inside_game_reaches_the_game() {
        assert_eq!(route(ClientMessage::LeaveQueue, true), Routed::Game(GameEvent::LeaveQueue));
        assert_eq!(route(ClientMessage::LeaveQueue, false), Routed::Server(ServerEvent::LeaveQueue));
    }
}
