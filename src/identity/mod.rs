//! Participant identities.
//!
//! An identity is issued by the [`registry::IdentityRegistry`] on connect and is the
//! only credential a client ever presents. The secret never leaves the registry and
//! its owner's connection: other participants only ever see a [`SafeIdentity`].

pub mod registry;

use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::config::identity::DEFAULT_AVATAR;

pub use registry::IdentityRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub secret: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub display_name: String,
}

/// Public projection of an [`Identity`], safe to show to other players.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeIdentity {
    pub id: String,
    pub avatar: String,
    pub display_name: String,
}

/// Credentials handed to a client during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialIdentity {
    pub id: String,
    pub secret: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: secret.into(),
            avatar: DEFAULT_AVATAR.to_string(),
            display_name: String::new(),
        }
    }

    pub fn safe(&self) -> SafeIdentity {
        SafeIdentity {
            id: self.id.clone(),
            avatar: self.avatar.clone(),
            display_name: self.display_name.clone(),
        }
    }

    pub fn initial(&self) -> InitialIdentity {
        InitialIdentity {
            id: self.id.clone(),
            secret: self.secret.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity {0} not found")]
    NotFound(String),
    #[error("spoofed identity {0}: secret mismatch")]
    Spoofed(String),
    #[error("identity {0} already exists")]
    AlreadyExists(String),
    #[error("secure random source failed: {0}")]
    Entropy(String),
}
