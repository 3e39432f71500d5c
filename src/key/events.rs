//! Key lifecycle event observers.
//!
//! The [`KeyManager`](super::KeyManager) owns the observer list; observers
//! are invoked synchronously after the triggering store mutation completes
//! and must not re-enter the manager.

use super::identity::KeyInfo;

/// Identifier of the agent session a key event originated from, when any.
pub type SessionId = u64;

/// Receives key lifecycle notifications from a [`KeyManager`](super::KeyManager).
///
/// All methods have empty default bodies, so embedders implement only the
/// events they care about.
pub trait KeyManagerObserver: Send + Sync {
    /// A key was added to the store.
    fn key_added(&self, _key: &KeyInfo) {}

    /// A key is about to be removed; its material is still available.
    fn key_pre_remove(&self, _key: &KeyInfo) {}

    /// A key was removed; identified by fingerprint only.
    fn key_removed(&self, _fingerprint: &str) {}

    /// The store was emptied by a Remove-All request.
    fn keys_cleared(&self) {}

    /// A key produced a signature for a session.
    fn key_used(&self, _key: &KeyInfo, _session: SessionId) {}

    /// A signature with a key was declined by the confirmation hook.
    fn key_declined(&self, _key: &KeyInfo, _session: SessionId) {}

    /// The agent was locked.
    fn locked(&self) {}

    /// The agent was unlocked.
    fn unlocked(&self) {}
}
