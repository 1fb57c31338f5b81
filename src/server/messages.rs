//! Wire messages exchanged with clients.
//!
//! Client → server frames are `{type, identity:{id, secret}, content?}` envelopes;
//! server → client frames are `{type, content}`.

use serde::{Serialize, Deserialize};
use serde_json::Value;
use thiserror::Error;

use crate::game::board::Board;
use crate::identity::{Identity, InitialIdentity, SafeIdentity};

/// Malformed client payload. The frame is dropped, the connection stays open.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("malformed content for '{kind}': {source}")]
    Content {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Outer client envelope, decoded before the identity check.
#[derive(Debug, Deserialize)]
pub struct ClientEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub identity: Identity,
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MoveRequest {
    pub row: i64,
    pub col: i64,
    #[serde(default)]
    pub mark: String,
}

#[derive(Debug, Deserialize)]
struct CloseContent {
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct IdentityContent {
    identity: Identity,
}

#[derive(Debug, Deserialize)]
struct GameIdContent {
    #[serde(rename = "gameID")]
    game_id: String,
}

/// A decoded client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Move(MoveRequest),
    Close { reason: String },
    RequestGame,
    LeaveGame,
    LeaveQueue,
    UpdateIdentity(Identity),
    JoinInviteGame { game_id: String },
    CreateInviteGame,
    LeaveInviteGame { game_id: String },
    Unknown(String),
}

pub const UPDATE_IDENTITY: &str = "updateIdentity";

fn content<T: for<'de> Deserialize<'de>>(kind: &str, value: Value) -> Result<T, DecodeError> {
    serde_json::from_value(value).map_err(|source| DecodeError::Content {
        kind: kind.to_string(),
        source,
    })
}

impl ClientEnvelope {
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        serde_json::from_slice(frame).map_err(DecodeError::Envelope)
    }

    /// Interpret the envelope's type-specific content.
    pub fn into_message(self) -> Result<ClientMessage, DecodeError> {
        let kind = self.kind.as_str();
        let msg = match kind {
            "move" => ClientMessage::Move(content(kind, self.content)?),
            "close" => {
                let c: CloseContent = if self.content.is_null() {
                    CloseContent { reason: String::new() }
                } else {
                    content(kind, self.content)?
                };
                ClientMessage::Close { reason: c.reason }
            }
            "gameRequest" => ClientMessage::RequestGame,
            "leaveGame" => ClientMessage::LeaveGame,
            "leaveQueue" => ClientMessage::LeaveQueue,
            UPDATE_IDENTITY => {
                let c: IdentityContent = content(kind, self.content)?;
                ClientMessage::UpdateIdentity(c.identity)
            }
            "joinInviteGame" => {
                let c: GameIdContent = content(kind, self.content)?;
                ClientMessage::JoinInviteGame { game_id: c.game_id }
            }
            "createInviteGame" => ClientMessage::CreateInviteGame,
            "leaveInviteGame" => {
                let c: GameIdContent = content(kind, self.content)?;
                ClientMessage::LeaveInviteGame { game_id: c.game_id }
            }
            other => ClientMessage::Unknown(other.to_string()),
        };
        Ok(msg)
    }
}

/// Server → client message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "content", rename_all = "camelCase")]
pub enum ServerMessage {
    AuthIdentity {
        identity: InitialIdentity,
    },
    Registered {
        identity: SafeIdentity,
    },
    #[serde(rename_all = "camelCase")]
    StartGame {
        board: Board,
        mark: crate::game::types::Mark,
        active_player: String,
        opponent: SafeIdentity,
        #[serde(rename = "gameID")]
        game_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Update {
        board: Board,
        active_player: String,
    },
    GameOver {
        board: Board,
        winner: Option<SafeIdentity>,
    },
    InviteGameOver {
        board: Board,
        winner: Option<SafeIdentity>,
        #[serde(rename = "newGameID")]
        new_game_id: String,
    },
    InviteGameCreated {
        #[serde(rename = "gameID")]
        game_id: String,
    },
    GameWaiting {},
    GameClosed {},
    RemovedFromQueue {},
    RemovedFromGame {},
    OpponentDisconnected {},
    DisconnectedFromServer {},
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Type tag as seen on the wire, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthIdentity { .. } => "authIdentity",
            Self::Registered { .. } => "registered",
            Self::StartGame { .. } => "startGame",
            Self::Update { .. } => "update",
            Self::GameOver { .. } => "gameOver",
            Self::InviteGameOver { .. } => "inviteGameOver",
            Self::InviteGameCreated { .. } => "inviteGameCreated",
            Self::GameWaiting {} => "gameWaiting",
            Self::GameClosed {} => "gameClosed",
            Self::RemovedFromQueue {} => "removedFromQueue",
            Self::RemovedFromGame {} => "removedFromGame",
            Self::OpponentDisconnected {} => "opponentDisconnected",
            Self::DisconnectedFromServer {} => "disconnectedFromServer",
            Self::Error { .. } => "error",
        }
    }
}
