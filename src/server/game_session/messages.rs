use std::fmt;
use std::sync::Arc;

use crate::game::board::Board;
use crate::server::connection::ConnectionSession;

/// What a finished game reports back to the session router.
pub enum GameSessionEvent {
    LeftGame {
        requester: Arc<ConnectionSession>,
        other: Arc<ConnectionSession>,
    },
    Disconnected {
        who: Arc<ConnectionSession>,
        other: Arc<ConnectionSession>,
    },
    /// An invite game ended on the board; the router recycles the invite.
    InviteGameOver {
        game_id: String,
        board: Board,
        winner: Option<Arc<ConnectionSession>>,
        players: [Arc<ConnectionSession>; 2],
    },
}

impl fmt::Debug for GameSessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeftGame { requester, other } => {
                write!(f, "LeftGame({} leaves {})", requester.id(), other.id())
            }
            Self::Disconnected { who, other } => {
                write!(f, "Disconnected({} drops {})", who.id(), other.id())
            }
            Self::InviteGameOver { game_id, winner, .. } => write!(
                f,
                "InviteGameOver({}, winner={:?})",
                game_id,
                winner.as_ref().map(|w| w.id())
            ),
        }
    }
}

/// How a game loop terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameOutcome {
    Win { winner: String },
    Draw,
    Disconnected { who: String },
    Left { who: String },
    Cancelled,
}

/// Matchmade games are one-shot; invite games keep their id for a rematch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameKind {
    Matchmade,
    Invite { game_id: String },
}

impl GameKind {
    pub fn invite_id(&self) -> Option<&str> {
        match self {
            GameKind::Invite { game_id } => Some(game_id),
            GameKind::Matchmade => None,
        }
    }
}
