//! Session router: owns the queue, the invites and the identity registry, and reacts to
//! lifecycle events coming from connections and games.
//!
//! Per connection it runs one server-event listener; per game one turn loop and one
//! game-event listener; globally one queue-drain loop. Every task is spawned under the
//! [`Supervisor`] so shutdown can cancel and await all of them.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::matchmaking::PAIRING_INTERVAL_SECS;
use crate::identity::{Identity, IdentityRegistry};
use crate::server::connection::{ConnectionSession, ServerEvent};
use crate::server::game_session::{
    GameKind, GameSession, GameSessionEvent, InviteSessionRegistry, JoinOutcome,
};
use crate::server::matchmaking::MatchmakingQueue;
use crate::server::messages::ServerMessage;
use crate::server::supervisor::Supervisor;
use crate::server::transport::{FrameReader, FrameWriter};

pub struct SessionRouter {
    registry: Arc<IdentityRegistry>,
    queue: Mutex<MatchmakingQueue<Arc<ConnectionSession>>>,
    queue_signal: Notify,
    invites: InviteSessionRegistry,
    supervisor: Supervisor,
}

impl SessionRouter {
    pub fn new(registry: Arc<IdentityRegistry>, supervisor: Supervisor) -> Arc<Self> {
        Arc::new(Self {
            registry,
            queue: Mutex::new(MatchmakingQueue::new()),
            queue_signal: Notify::new(),
            invites: InviteSessionRegistry::new(),
            supervisor,
        })
    }

    pub fn registry(&self) -> &Arc<IdentityRegistry> {
        &self.registry
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn invites(&self) -> &InviteSessionRegistry {
        &self.invites
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_queued(&self, id: &str) -> bool {
        self.queue.lock().is_queued(id)
    }

    /// Start a connection's read loop and its server-event listener.
    pub fn attach(
        self: &Arc<Self>,
        identity: Identity,
        reader: Box<dyn FrameReader>,
        writer: Box<dyn FrameWriter>,
    ) -> Arc<ConnectionSession> {
        let (conn, inbound, server_rx) =
            ConnectionSession::new(identity, writer, self.supervisor.child_token());
        self.supervisor
            .spawn(Arc::clone(&conn).listen(reader, inbound, Arc::clone(&self.registry)));
        self.supervisor
            .spawn(Arc::clone(self).watch_connection(Arc::clone(&conn), server_rx));
        conn
    }

    /// Spawn the queue-drain loop.
    pub fn spawn_queue_loop(self: &Arc<Self>) {
        self.supervisor.spawn(Arc::clone(self).run_queue());
    }

    /// Pair waiting players whenever someone joins the queue, and on a fallback tick.
    async fn run_queue(self: Arc<Self>) {
        let cancel = self.supervisor.token().clone();
        let mut tick = tokio::time::interval(Duration::from_secs(PAIRING_INTERVAL_SECS));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("[Matchmaking] Queue loop started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.queue_signal.notified() => {}
                _ = tick.tick() => {}
            }
            self.pair_all();
        }
        info!("[Matchmaking] Queue loop stopped");
    }

    /// Drain every available pair out of the queue.
    fn pair_all(self: &Arc<Self>) {
        loop {
            let Some((first, second)) = self.queue.lock().try_pair_next() else {
                break;
            };
            match (first.is_closed(), second.is_closed()) {
                (false, false) => self.start_matchmade(first, second),
                (true, false) => self.requeue(second),
                (false, true) => self.requeue(first),
                (true, true) => {}
            }
        }
    }

    /// Seat a popped pair. A player an invite game seated in the meantime is dropped from
    /// matchmaking; the other goes back to the queue.
    fn start_matchmade(self: &Arc<Self>, first: Arc<ConnectionSession>, second: Arc<ConnectionSession>) {
        match (first.try_enter_game(), second.try_enter_game()) {
            (true, true) => {
                for conn in [&first, &second] {
                    let dropped = self.invites.remove_hosted_by(&conn.id());
                    if !dropped.is_empty() {
                        info!("[Matchmaking] Player {} paired, dropped pending invites {:?}", conn.id(), dropped);
                    }
                }
                self.start_game(GameKind::Matchmade, first, second);
            }
            (true, false) => {
                first.set_in_game(false);
                self.requeue(first);
            }
            (false, true) => {
                second.set_in_game(false);
                self.requeue(second);
            }
            (false, false) => {}
        }
    }

    fn requeue(&self, conn: Arc<ConnectionSession>) {
        debug!("[Matchmaking] Partner of {} unavailable, requeueing", conn.id());
        self.queue.lock().enqueue(conn);
    }

    /// Take `conn` out of the queue because it now hosts an invite.
    async fn leave_queue_for_invite(&self, conn: &ConnectionSession) {
        if self.queue.lock().remove_by_id(&conn.id()).is_some() {
            info!("[Matchmaking] Player {} left the queue to host an invite", conn.id());
            conn.send(ServerMessage::RemovedFromQueue {}).await;
        }
    }

    /// Spawn a game's turn loop and its event listener.
    pub fn start_game(
        self: &Arc<Self>,
        kind: GameKind,
        first: Arc<ConnectionSession>,
        second: Arc<ConnectionSession>,
    ) {
        first.set_in_game(true);
        second.set_in_game(true);
        let cancel = self.supervisor.child_token();
        let (session, events) = GameSession::new(kind.clone(), first, second, cancel.clone());
        let [a, b] = session.players();
        info!("[Matchmaking] Game {} created for {} and {}", session.id(), a.id(), b.id());
        self.supervisor.spawn(session.run());
        self.supervisor.spawn(Arc::clone(self).watch_game(kind, events, cancel));
    }

    async fn watch_game(
        self: Arc<Self>,
        kind: GameKind,
        mut events: mpsc::Receiver<GameSessionEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => self.on_game_event(&kind, event).await,
                    None => break,
                },
                _ = cancel.cancelled() => {
                    while let Ok(event) = events.try_recv() {
                        self.on_game_event(&kind, event).await;
                    }
                    break;
                }
            }
        }
    }

    async fn on_game_event(&self, kind: &GameKind, event: GameSessionEvent) {
        debug!("[Router] Game event: {:?}", event);
        match event {
            GameSessionEvent::LeftGame { requester, other } => {
                requester.send(ServerMessage::RemovedFromGame {}).await;
                other.send(ServerMessage::GameClosed {}).await;
                requester.set_in_game(false);
                other.set_in_game(false);
                self.drop_invite(kind);
            }
            GameSessionEvent::Disconnected { who, other } => {
                other.send(ServerMessage::GameClosed {}).await;
                who.set_in_game(false);
                other.set_in_game(false);
                self.drop_invite(kind);
            }
            GameSessionEvent::InviteGameOver { game_id, board, winner, players } => {
                self.invites.remove(&game_id);
                let offered_to: Vec<String> =
                    players.iter().filter(|p| !p.is_closed()).map(|p| p.id()).collect();
                let nobody_left = offered_to.is_empty();
                let new_game_id = self.invites.create_empty(offered_to);
                if nobody_left {
                    // Both players are already gone; nobody could ever claim it.
                    self.invites.remove(&new_game_id);
                }
                info!("[Router] Invite {} finished, rematch invite {}", game_id, new_game_id);
                let winner = winner.map(|w| w.safe_identity());
                for player in players {
                    player.set_in_game(false);
                    player
                        .send(ServerMessage::InviteGameOver {
                            board: board.clone(),
                            winner: winner.clone(),
                            new_game_id: new_game_id.clone(),
                        })
                        .await;
                }
            }
        }
    }

    fn drop_invite(&self, kind: &GameKind) {
        if let Some(id) = kind.invite_id() {
            if self.invites.remove(id) {
                info!("[Router] Invite {} closed", id);
            }
        }
    }

    /// Consume one connection's server channel until it closes, then clean up after it.
    async fn watch_connection(
        self: Arc<Self>,
        conn: Arc<ConnectionSession>,
        mut events: mpsc::Receiver<ServerEvent>,
    ) {
        let cancel = conn.cancel_token().clone();
        loop {
            let event = tokio::select! {
                biased;
                event = events.recv() => event,
                _ = cancel.cancelled() => None,
            };
            match event {
                Some(ServerEvent::Disconnected) | None => break,
                Some(event) => self.on_server_event(&conn, event).await,
            }
        }
        self.cleanup(&conn);
    }

    async fn on_server_event(self: &Arc<Self>, conn: &Arc<ConnectionSession>, event: ServerEvent) {
        let id = conn.id();
        match event {
            ServerEvent::RequestGame => {
                if conn.is_in_game() {
                    conn.send(ServerMessage::error("already in a game")).await;
                    return;
                }
                let enqueued = {
                    let mut queue = self.queue.lock();
                    let added = queue.enqueue(Arc::clone(conn));
                    if added {
                        debug!("[Matchmaking] Queue: {:?}", queue.iter().map(|c| c.id()).collect::<Vec<_>>());
                    }
                    added
                };
                if enqueued {
                    info!("[Matchmaking] Player {} joined the queue", id);
                    conn.send(ServerMessage::GameWaiting {}).await;
                    self.queue_signal.notify_one();
                }
            }
            ServerEvent::LeaveQueue => {
                if self.queue.lock().remove_by_id(&id).is_some() {
                    info!("[Matchmaking] Player {} left the queue", id);
                }
                conn.send(ServerMessage::RemovedFromQueue {}).await;
            }
            ServerEvent::UpdateIdentity(update) => {
                if update.id != id {
                    warn!("[Router] Player {} tried to update identity {}", id, update.id);
                    return;
                }
                if !self.registry.update(&update) {
                    warn!("[Router] Identity update rejected for {}", id);
                    return;
                }
                match self.registry.get(&id) {
                    Ok(identity) => conn.set_identity(identity),
                    Err(e) => warn!("[Router] Identity {} vanished during update: {}", id, e),
                }
            }
            ServerEvent::CreateInviteGame => {
                if conn.is_in_game() {
                    conn.send(ServerMessage::error("already in a game")).await;
                    return;
                }
                self.leave_queue_for_invite(conn).await;
                let game_id = self.invites.create(Arc::clone(conn));
                conn.send(ServerMessage::InviteGameCreated { game_id }).await;
            }
            ServerEvent::JoinInviteGame { game_id } => {
                if conn.is_in_game() {
                    conn.send(ServerMessage::error("already in a game")).await;
                    return;
                }
                match self.invites.join(&game_id, Arc::clone(conn)) {
                    Ok(JoinOutcome::Hosted) => {
                        info!("[Router] Player {} now hosts invite {}", id, game_id);
                        self.leave_queue_for_invite(conn).await;
                        conn.send(ServerMessage::InviteGameCreated { game_id }).await;
                    }
                    Ok(JoinOutcome::Ready(host, guest)) => {
                        {
                            let mut queue = self.queue.lock();
                            queue.remove_by_id(&host.id());
                            queue.remove_by_id(&guest.id());
                        }
                        self.start_game(GameKind::Invite { game_id }, host, guest);
                    }
                    Err(e) => {
                        info!("[Router] Player {} could not join: {}", id, e);
                        conn.send(ServerMessage::error(e.to_string())).await;
                    }
                }
            }
            ServerEvent::LeaveInviteGame { game_id } => {
                if self.invites.remove(&game_id) {
                    info!("[Router] Player {} closed invite {}", id, game_id);
                }
            }
            ServerEvent::NotInGame(event) => {
                debug!("[Router] Dropping {:?} from {}: not in a game", event, id);
            }
            ServerEvent::Disconnected => {}
        }
    }

    /// Forget everything the router holds for `conn`. Safe to call more than once.
    fn cleanup(&self, conn: &ConnectionSession) {
        let id = conn.id();
        self.queue.lock().remove_by_id(&id);
        let mut invites = self.invites.remove_hosted_by(&id);
        invites.extend(self.invites.withdraw_offers(&id));
        self.registry.remove(&id);
        info!("[Router] Cleaned up player {} ({} pending invites dropped)", id, invites.len());
    }
}
