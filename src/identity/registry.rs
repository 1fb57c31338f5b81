/// In-memory identity registry.
///
/// Issues per-connection credentials and validates every credential a client presents.
/// The registry is the sole mutable owner of identities; callers only ever get value
/// snapshots back.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use rand::TryRngCore;
use rand::rngs::OsRng;
use uuid::Uuid;

use super::{Identity, IdentityError};
use crate::config::identity::SECRET_BYTES;

pub struct IdentityRegistry {
    identities: RwLock<HashMap<String, Identity>>,
}

fn generate_secret() -> Result<String, IdentityError> {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| IdentityError::Entropy(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

impl IdentityRegistry {
    /// Create an empty registry, probing the secure random source first.
    pub fn new() -> Result<Self, IdentityError> {
        generate_secret()?;
        Ok(Self {
            identities: RwLock::new(HashMap::new()),
        })
    }

    /// Issue and store a brand new identity.
    pub fn register(&self) -> Result<Identity, IdentityError> {
        let id = Uuid::new_v4().simple().to_string();
        let secret = generate_secret().inspect_err(|e| error!("[Identity] {}", e))?;
        let identity = Identity::new(id, secret);
        self.add(identity.clone())?;
        info!("[Identity] Registered identity {}", identity.id);
        Ok(identity)
    }

    /// Store an identity. An existing id is never overwritten.
    pub fn add(&self, identity: Identity) -> Result<(), IdentityError> {
        let mut identities = self.identities.write();
        if let Some(existing) = identities.get(&identity.id) {
            if existing.secret != identity.secret {
                error!("[Identity] Spoofed registration attempt for id={}", identity.id);
                return Err(IdentityError::Spoofed(identity.id));
            }
            return Err(IdentityError::AlreadyExists(identity.id));
        }
        identities.insert(identity.id.clone(), identity);
        Ok(())
    }

    /// Check that `candidate` holds the secret issued for its id.
    pub fn validate(&self, candidate: &Identity) -> Result<(), IdentityError> {
        let identities = self.identities.read();
        let stored = identities
            .get(&candidate.id)
            .ok_or_else(|| IdentityError::NotFound(candidate.id.clone()))?;
        if stored.secret != candidate.secret {
            return Err(IdentityError::Spoofed(candidate.id.clone()));
        }
        Ok(())
    }

    /// Replace the mutable fields (avatar, display name) of a validated identity.
    ///
    /// Returns false, without mutating anything, if the id is unknown or the secret
    /// does not match.
    pub fn update(&self, updated: &Identity) -> bool {
        let mut identities = self.identities.write();
        let Some(stored) = identities.get_mut(&updated.id) else {
            warn!("[Identity] Update for unknown id={}", updated.id);
            return false;
        };
        if stored.secret != updated.secret {
            error!("[Identity] Spoofed update attempt for id={}", updated.id);
            return false;
        }
        stored.avatar = updated.avatar.clone();
        stored.display_name = updated.display_name.clone();
        debug!("[Identity] Updated id={} display_name={:?}", updated.id, updated.display_name);
        true
    }

    pub fn get(&self, id: &str) -> Result<Identity, IdentityError> {
        self.identities
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| IdentityError::NotFound(id.to_string()))
    }

    pub fn remove(&self, id: &str) {
        if self.identities.write().remove(id).is_some() {
            debug!("[Identity] Removed id={}", id);
        }
    }

    pub fn len(&self) -> usize {
        self.identities.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
