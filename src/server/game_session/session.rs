/// One running game between two connections.
///
/// The session owns the board and both players' game channels for as long as it runs.
/// Moves are only accepted from the active player; everything that ends the game early
/// (leave, close, disconnect) is reported to the router through a [`GameSessionEvent`].

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{mpsc, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::messages::{GameKind, GameOutcome, GameSessionEvent};
use crate::config::matchmaking::CHANNEL_CAPACITY;
use crate::game::board::Board;
use crate::game::types::Mark;
use crate::server::connection::{ConnectionSession, GameEvent};
use crate::server::messages::{MoveRequest, ServerMessage};

struct Seat {
    conn: Arc<ConnectionSession>,
    mark: Mark,
}

pub struct GameSession {
    id: String,
    kind: GameKind,
    seats: [Seat; 2],
    board: Board,
    active: usize,
    events: mpsc::Sender<GameSessionEvent>,
    cancel: CancellationToken,
}

type GameEvents = OwnedMutexGuard<mpsc::Receiver<GameEvent>>;

impl GameSession {
    /// `first` plays `x` and moves first.
    pub fn new(
        kind: GameKind,
        first: Arc<ConnectionSession>,
        second: Arc<ConnectionSession>,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<GameSessionEvent>) {
        let (events, events_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let id = match &kind {
            GameKind::Invite { game_id } => game_id.clone(),
            GameKind::Matchmade => Uuid::new_v4().simple().to_string(),
        };
        let session = Self {
            id,
            kind,
            seats: [
                Seat { conn: first, mark: Mark::X },
                Seat { conn: second, mark: Mark::O },
            ],
            board: Board::new(),
            active: 0,
            events,
            cancel,
        };
        (session, events_rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn players(&self) -> [Arc<ConnectionSession>; 2] {
        [Arc::clone(&self.seats[0].conn), Arc::clone(&self.seats[1].conn)]
    }

    /// Drive the game to completion.
    pub async fn run(mut self) -> GameOutcome {
        let outcome = match self.claim().await {
            Some((mut first_rx, mut second_rx)) => {
                self.start(&mut first_rx, &mut second_rx).await;
                self.turn_loop(&mut first_rx, &mut second_rx).await
            }
            None => GameOutcome::Cancelled,
        };

        for seat in &self.seats {
            seat.conn.set_in_game(false);
        }
        self.cancel.cancel();
        info!("[GameSession] Game {} over: {:?}", self.id, outcome);
        outcome
    }

    /// Take both players' game channels, unless the game is cancelled first.
    async fn claim(&self) -> Option<(GameEvents, GameEvents)> {
        let [first, second] = &self.seats;
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            claimed = async {
                let a = first.conn.claim_game_events().await;
                let b = second.conn.claim_game_events().await;
                (a, b)
            } => Some(claimed),
        }
    }

    async fn start(&self, first_rx: &mut GameEvents, second_rx: &mut GameEvents) {
        for seat in &self.seats {
            seat.conn.set_in_game(true);
        }
        // Leftovers from a previous game on the same connection.
        let stale = std::iter::from_fn(|| first_rx.try_recv().ok()).count()
            + std::iter::from_fn(|| second_rx.try_recv().ok()).count();
        if stale > 0 {
            debug!("[GameSession] Game {} discarded {} stale events", self.id, stale);
        }

        let active_player = self.seats[self.active].conn.id();
        for (idx, seat) in self.seats.iter().enumerate() {
            let opponent = &self.seats[1 - idx].conn;
            seat.conn
                .send(ServerMessage::StartGame {
                    board: self.board.clone(),
                    mark: seat.mark,
                    active_player: active_player.clone(),
                    opponent: opponent.safe_identity(),
                    game_id: self.id.clone(),
                })
                .await;
        }
        info!(
            "[GameSession] Game {} started: {} (x) vs {} (o)",
            self.id,
            self.seats[0].conn.id(),
            self.seats[1].conn.id()
        );
    }

    async fn turn_loop(&mut self, first_rx: &mut GameEvents, second_rx: &mut GameEvents) -> GameOutcome {
        loop {
            let (idx, event) = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return GameOutcome::Cancelled,
                event = first_rx.recv() => (0, event),
                event = second_rx.recv() => (1, event),
            };
            // A closed channel means the read loop is gone.
            let event = event.unwrap_or(GameEvent::Disconnected);
            if let Some(outcome) = self.handle(idx, event).await {
                return outcome;
            }
        }
    }

    async fn handle(&mut self, idx: usize, event: GameEvent) -> Option<GameOutcome> {
        let player = Arc::clone(&self.seats[idx].conn);
        let other = Arc::clone(&self.seats[1 - idx].conn);
        match event {
            GameEvent::Move(mv) => {
                if idx != self.active {
                    debug!("[GameSession] Game {}: ignoring move from inactive player {}", self.id, player.id());
                    return None;
                }
                self.play(mv).await
            }
            GameEvent::Closed { reason } => {
                info!("[GameSession] Game {}: player {} closed ({})", self.id, player.id(), reason);
                Some(self.opponent_gone(player, other).await)
            }
            GameEvent::Disconnected => {
                info!("[GameSession] Game {}: player {} disconnected", self.id, player.id());
                Some(self.opponent_gone(player, other).await)
            }
            GameEvent::LeaveGame => {
                info!("[GameSession] Game {}: player {} left", self.id, player.id());
                let who = player.id();
                self.emit(GameSessionEvent::LeftGame { requester: player, other }).await;
                Some(GameOutcome::Left { who })
            }
            GameEvent::LeaveQueue => {
                debug!("[GameSession] Game {}: leaveQueue from {} while playing, ignored", self.id, player.id());
                None
            }
            GameEvent::Unknown(kind) => {
                warn!("[GameSession] Game {}: unknown message '{}' from {}", self.id, kind, player.id());
                player.send(ServerMessage::error(format!("unknown message type: {}", kind))).await;
                None
            }
        }
    }

    /// Apply a move from the active player.
    async fn play(&mut self, mv: MoveRequest) -> Option<GameOutcome> {
        let mover = Arc::clone(&self.seats[self.active].conn);
        let mark = self.seats[self.active].mark;
        if !mv.mark.is_empty() && mv.mark != mark.to_string() {
            debug!(
                "[GameSession] Game {}: {} claimed mark '{}', playing '{}'",
                self.id,
                mover.id(),
                mv.mark,
                mark
            );
        }

        if let Err(e) = self.board.place(mv.row, mv.col, mark) {
            debug!("[GameSession] Game {}: rejected move from {}: {}", self.id, mover.id(), e);
            mover.send(ServerMessage::error(e.to_string())).await;
            return None;
        }
        let vanished = self.board.decay();
        if vanished > 0 {
            debug!("[GameSession] Game {}: {} marks vanished", self.id, vanished);
        }

        if self.board.check_win() {
            let winner = mover.id();
            self.finish(Some(mover)).await;
            return Some(GameOutcome::Win { winner });
        }
        if self.board.is_full() {
            self.finish(None).await;
            return Some(GameOutcome::Draw);
        }

        self.active = 1 - self.active;
        let active_player = self.seats[self.active].conn.id();
        self.broadcast(ServerMessage::Update {
            board: self.board.clone(),
            active_player,
        })
        .await;
        None
    }

    async fn finish(&self, winner: Option<Arc<ConnectionSession>>) {
        match &self.kind {
            GameKind::Matchmade => {
                self.broadcast(ServerMessage::GameOver {
                    board: self.board.clone(),
                    winner: winner.map(|w| w.safe_identity()),
                })
                .await;
            }
            GameKind::Invite { game_id } => {
                self.emit(GameSessionEvent::InviteGameOver {
                    game_id: game_id.clone(),
                    board: self.board.clone(),
                    winner,
                    players: self.players(),
                })
                .await;
            }
        }
    }

    async fn opponent_gone(&self, who: Arc<ConnectionSession>, other: Arc<ConnectionSession>) -> GameOutcome {
        other.send(ServerMessage::OpponentDisconnected {}).await;
        let gone = who.id();
        self.emit(GameSessionEvent::Disconnected { who, other }).await;
        GameOutcome::Disconnected { who: gone }
    }

    async fn broadcast(&self, msg: ServerMessage) {
        for seat in &self.seats {
            seat.conn.send(msg.clone()).await;
        }
    }

    async fn emit(&self, event: GameSessionEvent) {
        if self.events.send(event).await.is_err() {
            debug!("[GameSession] Game {}: nobody listening for game events", self.id);
        }
    }
}
