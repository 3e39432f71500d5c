//! A held identity and the destination-constraint evaluator.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::manager::KeyStoreError;
use super::public::PublicKey;
use crate::agent::session::SessionScope;
use crate::crypto::{self, KeyPair};
use crate::proto::extension::{DestinationConstraint, MatchInfo};
use crate::proto::{PrivateKeyData, Signature};
use crate::secret::SecretBuffer;

/// Public description of a held identity, handed to observers and hooks.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct KeyInfo {
    /// Algorithm name.
    pub algorithm: String,
    /// Canonical public wire blob.
    pub public_blob: Vec<u8>,
    /// `SHA256:` fingerprint.
    pub fingerprint: String,
    /// Comment supplied at add time.
    pub comment: String,
}

/// The private handle: live while unlocked, sealed ciphertext while locked.
enum KeyState {
    Unlocked(Box<dyn KeyPair>),
    Locked(SecretBuffer),
}

impl std::fmt::Debug for KeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unlocked(_) => write!(f, "KeyState::Unlocked"),
            Self::Locked(_) => write!(f, "KeyState::Locked"),
        }
    }
}

/// A full identity: public half, signing handle and per-key policy.
#[derive(Debug)]
pub struct Identity {
    public: PublicKey,
    comment: String,
    state: KeyState,
    added_at: Instant,
    lifetime_secs: u32,
    confirm_required: bool,
    dest_constraints: Vec<DestinationConstraint>,
}

impl Identity {
    /// Build an identity from decoded private key material.
    pub fn new(data: PrivateKeyData, comment: String) -> Result<Self, KeyStoreError> {
        let public = PublicKey::from_blob(data.public_blob()?)?;
        let handle = crypto::instantiate(data)?;

        Ok(Self {
            public,
            comment,
            state: KeyState::Unlocked(handle),
            added_at: Instant::now(),
            lifetime_secs: 0,
            confirm_required: false,
            dest_constraints: Vec::new(),
        })
    }

    /// The public half.
    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// The comment supplied at add time.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Public description for observers and hooks.
    pub fn info(&self) -> KeyInfo {
        KeyInfo {
            algorithm: self.public.algorithm().into(),
            public_blob: self.public.blob().to_vec(),
            fingerprint: self.public.fingerprint(),
            comment: self.comment.clone(),
        }
    }

    /// Whether each signature needs explicit user confirmation.
    pub fn confirm_required(&self) -> bool {
        self.confirm_required
    }

    pub(crate) fn set_confirm_required(&mut self, confirm_required: bool) {
        self.confirm_required = confirm_required;
    }

    /// Destination constraints attached to this identity, in wire order.
    pub fn dest_constraints(&self) -> &[DestinationConstraint] {
        &self.dest_constraints
    }

    pub(crate) fn set_dest_constraints(&mut self, constraints: Vec<DestinationConstraint>) {
        self.dest_constraints = constraints;
    }

    /// Restart the lifetime clock with a new lifetime in seconds.
    pub(crate) fn set_lifetime(&mut self, lifetime_secs: u32) {
        self.lifetime_secs = lifetime_secs;
        self.added_at = Instant::now();
    }

    /// Remaining seconds before expiry, or `None` for no expiry.
    pub fn expires_in(&self) -> Option<i64> {
        if self.lifetime_secs == 0 {
            return None;
        }
        let elapsed = self.added_at.elapsed().as_secs() as i64;
        Some(i64::from(self.lifetime_secs) - elapsed)
    }

    pub(crate) fn expired_at(&self, now: Instant) -> bool {
        if self.lifetime_secs == 0 {
            return false;
        }
        now.duration_since(self.added_at) >= Duration::from_secs(u64::from(self.lifetime_secs))
    }

    /// Sign `data` with this identity's private key.
    pub fn sign(&self, data: &[u8], flags: u32) -> Result<Signature, KeyStoreError> {
        match &self.state {
            KeyState::Unlocked(handle) => Ok(handle.sign(data, flags)?),
            KeyState::Locked(_) => Err(KeyStoreError::Locked),
        }
    }

    /// Seal the private handle under `passphrase`; signing fails until
    /// [`unlock`](Self::unlock).
    pub(crate) fn lock(&mut self, passphrase: &[u8]) -> Result<(), KeyStoreError> {
        match &self.state {
            KeyState::Unlocked(handle) => {
                let sealed = crypto::protect(handle.keypair_data(), passphrase)?;
                self.state = KeyState::Locked(sealed);
                Ok(())
            }
            KeyState::Locked(_) => Ok(()),
        }
    }

    /// Rebuild the private handle from its sealed form.
    pub(crate) fn unlock(&mut self, passphrase: &[u8]) -> Result<(), KeyStoreError> {
        match &self.state {
            KeyState::Locked(sealed) => {
                let handle = crypto::unprotect(sealed.as_slice(), passphrase)?;
                self.state = KeyState::Unlocked(handle);
                Ok(())
            }
            KeyState::Unlocked(_) => Ok(()),
        }
    }

    /// Whether a constraint matches `(from_key, to_key, user)`.
    pub fn permitted_by_constraints(
        &self,
        from_key: &[u8],
        to_key: &[u8],
        user: &str,
        match_info: Option<&mut MatchInfo>,
    ) -> bool {
        permitted_by_constraints(&self.dest_constraints, from_key, to_key, user, match_info)
    }

    /// Decide whether this identity may sign (or be listed) for `user` on
    /// the given session.
    pub fn permitted(
        &self,
        scope: &SessionScope<'_>,
        user: &str,
        match_info: Option<&mut MatchInfo>,
    ) -> bool {
        identity_permitted(&self.dest_constraints, scope, user, match_info, &self.comment)
    }
}

fn permitted_by_constraints(
    constraints: &[DestinationConstraint],
    from_key: &[u8],
    to_key: &[u8],
    user: &str,
    mut match_info: Option<&mut MatchInfo>,
) -> bool {
    for constraint in constraints {
        let info = match_info.as_mut().map(|info| &mut **info);
        if constraint.matches(from_key, to_key, user, info) {
            return true;
        }
    }
    false
}

/// The destination-constraint walk over a session's binding chain.
///
/// Threads a `from_key` that starts empty and becomes the previous binding's
/// host key. The terminal binding carries the sign-request user; every
/// non-terminal binding must be a forwarding bind, and a terminal forwarding
/// bind refuses an actual signature. After the walk, a key listed at a
/// forwarded hop must also be permitted *onward* from that hop, so keys
/// scoped to the previous hop do not leak into forwarded listings.
pub(crate) fn identity_permitted(
    constraints: &[DestinationConstraint],
    scope: &SessionScope<'_>,
    user: &str,
    mut match_info: Option<&mut MatchInfo>,
    comment: &str,
) -> bool {
    if constraints.is_empty() {
        return true;
    }

    if scope.binding_failed {
        warn!(key = %comment, "previous binding failed, refusing key");
        return false;
    }

    if scope.bindings.is_empty() {
        return true;
    }

    let mut from_key: &[u8] = &[];
    let last = scope.bindings.len() - 1;

    for (index, binding) in scope.bindings.iter().enumerate() {
        if binding.host_key.is_empty() {
            warn!(key = %comment, "session binding has empty host key, refusing key");
            return false;
        }

        let mut user_to_check = "";
        if index == last {
            user_to_check = user;
            if binding.forwarded && !user_to_check.is_empty() {
                warn!(key = %comment, "tried to sign on forwarding hop, refusing key");
                return false;
            }
        } else if !binding.forwarded {
            warn!(key = %comment, "tried to forward through signing bind, refusing key");
            return false;
        }

        let info = match_info.as_mut().map(|info| &mut **info);
        if !permitted_by_constraints(constraints, from_key, &binding.host_key, user_to_check, info)
        {
            debug!(key = %comment, binding = index, "not permitted by constraints");
            return false;
        }

        from_key = &binding.host_key;
    }

    let last_binding = &scope.bindings[last];
    if last_binding.forwarded
        && user.is_empty()
        && !permitted_by_constraints(constraints, &last_binding.host_key, &[], "", None)
    {
        debug!(key = %comment, "permitted at host but not onward, refusing");
        return false;
    }

    true
}
