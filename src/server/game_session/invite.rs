//! Private games joined by id instead of through the queue.
//!
//! An invite has at most a host and a guest. Attaching the second player, seating both
//! players and marking the invite as started happen under one write lock, so two joiners
//! can never both get in and neither player can be seated in another game meanwhile.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;
use thiserror::Error;
use uuid::Uuid;

use crate::server::connection::ConnectionSession;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InviteError {
    #[error("invite game {0} not found")]
    NotFound(String),
    #[error("invite game {0} is full")]
    Full(String),
    #[error("already joined invite game {0}")]
    AlreadyJoined(String),
    #[error("host of invite game {0} is already in a game")]
    HostBusy(String),
    #[error("already in a game")]
    AlreadyInGame,
}

struct InviteSession {
    host: Option<Arc<ConnectionSession>>,
    guest: Option<Arc<ConnectionSession>>,
    started: bool,
    /// Players a host-less rematch invite was handed to.
    offered_to: Vec<String>,
}

/// Result of a successful join.
pub enum JoinOutcome {
    /// The invite was empty; the joiner is now its host and waits for a guest.
    Hosted,
    /// Both seats are taken: host first, guest second.
    Ready(Arc<ConnectionSession>, Arc<ConnectionSession>),
}

#[derive(Default)]
pub struct InviteSessionRegistry {
    sessions: RwLock<HashMap<String, InviteSession>>,
}

fn new_invite_id() -> String {
    Uuid::new_v4().simple().to_string()
}

impl InviteSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an invite hosted by `host`.
    pub fn create(&self, host: Arc<ConnectionSession>) -> String {
        let id = new_invite_id();
        info!("[Invite] Player {} created invite {}", host.id(), id);
        self.sessions.write().insert(
            id.clone(),
            InviteSession { host: Some(host), guest: None, started: false, offered_to: Vec::new() },
        );
        id
    }

    /// Open an invite with no players yet; the first joiner becomes host.
    ///
    /// The invite lives until someone joins it or every player in `offered_to` is gone.
    pub fn create_empty(&self, offered_to: Vec<String>) -> String {
        let id = new_invite_id();
        self.sessions.write().insert(
            id.clone(),
            InviteSession { host: None, guest: None, started: false, offered_to },
        );
        debug!("[Invite] Created empty invite {}", id);
        id
    }

    /// Seat `conn` in invite `id`. A second seat is only granted if both players can be
    /// marked in-game; on `Ready` they already are.
    pub fn join(&self, id: &str, conn: Arc<ConnectionSession>) -> Result<JoinOutcome, InviteError> {
        let mut sessions = self.sessions.write();
        let invite = sessions.get_mut(id).ok_or_else(|| InviteError::NotFound(id.to_string()))?;
        if invite.started || invite.guest.is_some() {
            return Err(InviteError::Full(id.to_string()));
        }
        match invite.host.clone() {
            Some(host) if host.id() == conn.id() => Err(InviteError::AlreadyJoined(id.to_string())),
            Some(host) => {
                if !host.try_enter_game() {
                    return Err(InviteError::HostBusy(id.to_string()));
                }
                if !conn.try_enter_game() {
                    host.set_in_game(false);
                    return Err(InviteError::AlreadyInGame);
                }
                invite.guest = Some(Arc::clone(&conn));
                invite.started = true;
                Ok(JoinOutcome::Ready(host, conn))
            }
            None => {
                invite.host = Some(conn);
                Ok(JoinOutcome::Hosted)
            }
        }
    }

    /// Drop an invite outright. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.sessions.write().remove(id).is_some()
    }

    /// Drop every invite `player_id` hosts that has not started yet.
    pub fn remove_hosted_by(&self, player_id: &str) -> Vec<String> {
        let mut sessions = self.sessions.write();
        let ids: Vec<String> = sessions
            .iter()
            .filter(|(_, invite)| {
                !invite.started && invite.host.as_ref().is_some_and(|host| host.id() == player_id)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ids {
            sessions.remove(id);
        }
        ids
    }

    /// Withdraw `player_id` from every host-less invite offered to them. Invites nobody
    /// can claim anymore are dropped and their ids returned.
    pub fn withdraw_offers(&self, player_id: &str) -> Vec<String> {
        let mut sessions = self.sessions.write();
        let mut orphaned = Vec::new();
        for (id, invite) in sessions.iter_mut() {
            if invite.host.is_some() || invite.offered_to.is_empty() {
                continue;
            }
            invite.offered_to.retain(|p| p != player_id);
            if invite.offered_to.is_empty() {
                orphaned.push(id.clone());
            }
        }
        for id in &orphaned {
            sessions.remove(id);
        }
        orphaned
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.read().contains_key(id)
    }

    pub fn is_started(&self, id: &str) -> bool {
        self.sessions.read().get(id).is_some_and(|invite| invite.started)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
