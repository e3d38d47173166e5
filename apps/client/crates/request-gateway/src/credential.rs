//! In-memory access credential storage.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Short-lived bearer token. Never persisted and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCredential(String);

impl AccessCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessCredential(***)")
    }
}

#[derive(Default)]
struct Slot {
    credential: Option<AccessCredential>,
    epoch: u64,
}

/// The single authoritative copy of the access credential.
///
/// Clones share the same slot, so the gateway and the session manager always
/// observe the same value. Every [`set`](Self::set) starts a new epoch; a
/// renewal only lands if no login or logout happened while it was in flight.
#[derive(Clone, Default)]
pub struct CredentialStore {
    slot: Arc<RwLock<Slot>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<AccessCredential> {
        self.slot.read().credential.clone()
    }

    /// Replace the credential and start a new epoch.
    pub fn set(&self, credential: Option<AccessCredential>) {
        let mut slot = self.slot.write();
        slot.credential = credential;
        slot.epoch += 1;
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn is_present(&self) -> bool {
        self.slot.read().credential.is_some()
    }

    pub fn epoch(&self) -> u64 {
        self.slot.read().epoch
    }

    /// Store `credential` only if the store is still in `epoch`. Returns
    /// whether it was stored.
    pub fn set_in_epoch(&self, epoch: u64, credential: Option<AccessCredential>) -> bool {
        let mut slot = self.slot.write();
        if slot.epoch != epoch {
            return false;
        }
        slot.credential = credential;
        true
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("present", &self.is_present())
            .finish()
    }
}
