/// Server-side representation of one connected participant.
///
/// A `ConnectionSession` owns the physical connection. Its read loop ([`ConnectionSession::listen`])
/// decodes each frame, checks the claimed identity against the registry, and fans the
/// message out into the game channel or the server channel. Writes go straight to the
/// transport and may come from any task holding the session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use super::events::{route, GameEvent, Routed, ServerEvent};
use crate::config::matchmaking::CHANNEL_CAPACITY;
use crate::identity::{Identity, IdentityError, IdentityRegistry, SafeIdentity};
use crate::server::messages::{ClientEnvelope, ClientMessage, ServerMessage};
use crate::server::transport::{FrameReader, FrameWriter, TransportError};

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to serialize {kind}: {source}")]
    Serialize {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Sending halves of a connection's channels. Owned by the read loop; dropping them
/// closes both channels.
pub struct ConnectionInbound {
    game_tx: mpsc::Sender<GameEvent>,
    server_tx: mpsc::Sender<ServerEvent>,
}

pub struct ConnectionSession {
    identity: RwLock<Identity>,
    in_game: AtomicBool,
    game_events: Arc<Mutex<mpsc::Receiver<GameEvent>>>,
    writer: Box<dyn FrameWriter>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.id())
            .field("in_game", &self.is_in_game())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionSession {
    /// Build a session around an already authenticated identity.
    ///
    /// Returns the shared handle, the sending halves for [`listen`](Self::listen), and the
    /// server channel receiver for the router.
    pub fn new(
        identity: Identity,
        writer: Box<dyn FrameWriter>,
        cancel: CancellationToken,
    ) -> (Arc<Self>, ConnectionInbound, mpsc::Receiver<ServerEvent>) {
        let (game_tx, game_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (server_tx, server_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let session = Arc::new(Self {
            identity: RwLock::new(identity),
            in_game: AtomicBool::new(false),
            game_events: Arc::new(Mutex::new(game_rx)),
            writer,
            cancel,
        });
        (session, ConnectionInbound { game_tx, server_tx }, server_rx)
    }

    pub fn id(&self) -> String {
        self.identity.read().id.clone()
    }

    /// Snapshot of the current identity.
    pub fn identity(&self) -> Identity {
        self.identity.read().clone()
    }

    pub fn safe_identity(&self) -> SafeIdentity {
        self.identity.read().safe()
    }

    /// Replace the identity snapshot after the registry accepted an update.
    pub fn set_identity(&self, identity: Identity) {
        *self.identity.write() = identity;
    }

    pub fn is_in_game(&self) -> bool {
        self.in_game.load(Ordering::Acquire)
    }

    pub fn set_in_game(&self, value: bool) {
        self.in_game.store(value, Ordering::Release);
    }

    /// Atomically take the in-game flag. Fails if the connection is already seated.
    pub fn try_enter_game(&self) -> bool {
        self.in_game
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Take exclusive ownership of the game channel for the duration of a game.
    pub async fn claim_game_events(&self) -> OwnedMutexGuard<mpsc::Receiver<GameEvent>> {
        Arc::clone(&self.game_events).lock_owned().await
    }

    pub async fn write_message(&self, msg: &ServerMessage) -> Result<(), ConnectionError> {
        let frame = serde_json::to_vec(msg).map_err(|source| ConnectionError::Serialize {
            kind: msg.kind(),
            source,
        })?;
        self.writer.write_frame(frame).await.map_err(|e| {
            warn!("[Connection] Error sending {} to player {}: {}", msg.kind(), self.id(), e);
            ConnectionError::from(e)
        })
    }

    /// Write, logging instead of returning the error.
    pub async fn send(&self, msg: ServerMessage) {
        if let Err(e) = self.write_message(&msg).await {
            debug!("[Connection] Dropped {} for player {}: {}", msg.kind(), self.id(), e);
        }
    }

    pub async fn close(&self) {
        self.writer.close().await;
    }

    /// Read loop. Runs until the transport fails or the session token is cancelled.
    pub async fn listen(
        self: Arc<Self>,
        mut reader: Box<dyn FrameReader>,
        inbound: ConnectionInbound,
        registry: Arc<IdentityRegistry>,
    ) {
        let id = self.id();
        info!("[Connection] Player {} listening", id);

        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("[Connection] Player {} context done", id);
                    self.send(ServerMessage::DisconnectedFromServer {}).await;
                    break;
                }
                frame = reader.read_frame() => frame,
            };

            match frame {
                Ok(bytes) => {
                    if let Some(routed) = self.decode(&bytes, &registry) {
                        self.forward(&inbound, routed).await;
                    }
                }
                Err(err) => {
                    if err.is_normal_close() {
                        info!("[Connection] Player {} disconnected gracefully", id);
                    } else {
                        warn!("[Connection] Player {} dropped: {}", id, err);
                    }
                    let routed = if self.is_in_game() {
                        Routed::Game(GameEvent::Disconnected)
                    } else {
                        Routed::Server(ServerEvent::Disconnected)
                    };
                    self.forward(&inbound, routed).await;
                    self.cancel.cancel();
                    break;
                }
            }
        }

        self.writer.close().await;
        drop(inbound);
        info!("[Connection] Player {} listener done", id);
    }

    fn decode(&self, frame: &[u8], registry: &IdentityRegistry) -> Option<Routed> {
        let id = self.id();
        let envelope = match ClientEnvelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!("[Connection] Invalid message from player {}: {}", id, e);
                return None;
            }
        };

        match registry.validate(&envelope.identity) {
            Ok(()) => {}
            Err(e @ IdentityError::Spoofed(_)) => {
                error!("[Connection] Player {} sent a spoofed identity: {}", id, e);
                return None;
            }
            Err(e) => {
                warn!("[Connection] Player {} failed identity validation: {}", id, e);
                return None;
            }
        }
        if envelope.identity.id != id {
            error!(
                "[Connection] Player {} sent a message signed as {}",
                id, envelope.identity.id
            );
            return None;
        }

        let msg = match envelope.into_message() {
            Ok(msg) => msg,
            Err(e) => {
                warn!("[Connection] Invalid message from player {}: {}", id, e);
                return None;
            }
        };
        if let ClientMessage::Unknown(kind) = &msg {
            warn!("[Connection] Unknown message type from player {}: {}", id, kind);
        }
        Some(route(msg, self.is_in_game()))
    }

    /// Push an event into its channel, giving up if the session is cancelled meanwhile.
    async fn forward(&self, inbound: &ConnectionInbound, routed: Routed) {
        let delivered = match routed {
            Routed::Game(event) => tokio::select! {
                _ = self.cancel.cancelled() => false,
                res = inbound.game_tx.send(event) => res.is_ok(),
            },
            Routed::Server(event) => tokio::select! {
                _ = self.cancel.cancelled() => false,
                res = inbound.server_tx.send(event) => res.is_ok(),
            },
        };
        if !delivered {
            debug!("[Connection] Event for player {} not delivered", self.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::server::testing::{duplex, envelope, recv_within};

    struct Fixture {
        registry: Arc<IdentityRegistry>,
        session: Arc<ConnectionSession>,
        server_rx: mpsc::Receiver<ServerEvent>,
        client: crate::server::testing::ClientEnd,
        identity: Identity,
        listener: tokio::task::JoinHandle<()>,
    }

    fn start() -> Fixture {
        let registry = Arc::new(IdentityRegistry::new().expect("entropy"));
        let identity = registry.register().expect("register");
        let (reader, writer, client) = duplex();
        let (session, inbound, server_rx) =
            ConnectionSession::new(identity.clone(), writer, CancellationToken::new());
        let listener = tokio::spawn(Arc::clone(&session).listen(reader, inbound, Arc::clone(&registry)));
        Fixture { registry, session, server_rx, client, identity, listener }
    }

    #[tokio::test]
    async fn test_try_enter_game_seats_once() {
        let f = start();
        assert!(f.session.try_enter_game());
        assert!(!f.session.try_enter_game());
        f.session.set_in_game(false);
        assert!(f.session.try_enter_game());
    }

    #[tokio::test]
    async fn test_routes_by_scope_and_in_game_flag() {
        let mut f = start();

        f.client.send_json(envelope("gameRequest", &f.identity, None));
        assert_eq!(recv_within(&mut f.server_rx).await, Some(ServerEvent::RequestGame));

        f.client.send_json(envelope("leaveGame", &f.identity, None));
        assert_eq!(
            recv_within(&mut f.server_rx).await,
            Some(ServerEvent::NotInGame(GameEvent::LeaveGame))
        );

        f.session.set_in_game(true);
        let mut game_rx = f.session.claim_game_events().await;
        f.client.send_json(envelope("move", &f.identity, Some(json!({"row": 0, "col": 1, "mark": "x"}))));
        f.client.send_json(envelope("dance", &f.identity, None));
        f.client.send_json(envelope("close", &f.identity, Some(json!({"reason": "bye"}))));

        let Some(GameEvent::Move(mv)) = recv_within(&mut *game_rx).await else {
            panic!("expected a move");
        };
        assert_eq!((mv.row, mv.col, mv.mark.as_str()), (0, 1, "x"));
        assert_eq!(recv_within(&mut *game_rx).await, Some(GameEvent::Unknown("dance".into())));
        assert_eq!(recv_within(&mut *game_rx).await, Some(GameEvent::Closed { reason: "bye".into() }));
        f.listener.abort();
    }

    #[tokio::test]
    async fn test_drops_malformed_and_unauthenticated_messages() {
        let mut f = start();

        f.client.send_raw(b"{not json".to_vec());
        let mut forged = f.identity.clone();
        forged.secret = "forged".into();
        f.client.send_json(envelope("gameRequest", &forged, None));
        let stranger = f.registry.register().expect("register");
        f.client.send_json(envelope("gameRequest", &stranger, None));
        f.client.send_json(envelope("leaveQueue", &f.identity, None));

        // Only the last, properly signed message gets through.
        assert_eq!(recv_within(&mut f.server_rx).await, Some(ServerEvent::LeaveQueue));
        assert!(f.server_rx.try_recv().is_err());
        f.listener.abort();
    }

    #[tokio::test]
    async fn test_transport_close_emits_disconnected_and_cancels() {
        let mut f = start();
        f.client.close(true);

        assert_eq!(recv_within(&mut f.server_rx).await, Some(ServerEvent::Disconnected));
        f.listener.await.expect("listener finished");
        assert!(f.session.is_closed());
        // Read loop is gone, so the channel is closed and drained.
        assert_eq!(f.server_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_disconnect_while_in_game_goes_to_game_channel() {
        let mut f = start();
        f.session.set_in_game(true);
        let mut game_rx = f.session.claim_game_events().await;
        f.client.close(false);

        assert_eq!(recv_within(&mut *game_rx).await, Some(GameEvent::Disconnected));
        f.listener.await.expect("listener finished");
        assert_eq!(f.server_rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_cancellation_sends_farewell_and_closes_channels() {
        let mut f = start();
        f.session.cancel_token().cancel();
        f.listener.await.expect("listener finished");

        let farewell = f.client.recv_json().await;
        assert_eq!(farewell["type"], "disconnectedFromServer");
        assert_eq!(f.server_rx.recv().await, None);
        assert!(f.client.is_closed_by_server());
    }

    #[tokio::test]
    async fn test_write_message_serializes_envelope() {
        let mut f = start();
        f.session
            .write_message(&ServerMessage::error("nope"))
            .await
            .expect("written");
        let msg = f.client.recv_json().await;
        assert_eq!(msg, json!({"type": "error", "content": {"message": "nope"}}));

        f.session.close().await;
        assert!(f.session.write_message(&ServerMessage::GameWaiting {}).await.is_err());
        f.listener.abort();
    }
}
