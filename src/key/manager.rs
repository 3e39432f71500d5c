//! Process-wide identity store.
//!
//! The manager serializes all store mutations behind one lock and emits
//! lifecycle events to registered observers *after* the mutation completes,
//! outside the store lock. Sessions reference identities by public blob on
//! every operation; nothing holds pointers into the store across requests.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::events::{KeyManagerObserver, SessionId};
use super::identity::{Identity, KeyInfo};
use super::lock::LockProvider;
use crate::agent::session::SessionScope;
use crate::crypto::CryptoError;
use crate::proto::extension::{DestinationConstraint, RestrictDestination};
use crate::proto::{Credential, KeyConstraint, ProtoError};

/// Failed unlock attempts beyond this count arm the backoff gate.
const BACKOFF_FREE_ATTEMPTS: u32 = 2;

/// Errors from key store operations.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// Crypto backend failure (includes unknown algorithms).
    #[error("Key store: {0}")]
    Crypto(#[from] CryptoError),

    /// Wire-format failure while handling key material.
    #[error("Key store: {0}")]
    Proto(#[from] ProtoError),

    /// No identity with the given public blob.
    #[error("Key not found")]
    KeyNotFound,

    /// Lock requested while already locked.
    #[error("Agent is already locked")]
    AlreadyLocked,

    /// Unlock requested while not locked.
    #[error("Agent is not locked")]
    NotLocked,

    /// Unlock passphrase did not verify.
    #[error("Incorrect passphrase")]
    BadPassphrase,

    /// Unlock attempted while the brute-force gate is closed.
    #[error("Too many failed unlock attempts, wait {wait_secs} seconds")]
    Backoff {
        /// Seconds until the gate reopens.
        wait_secs: u64,
    },

    /// Operation requires the agent to be unlocked.
    #[error("Agent is locked")]
    Locked,
}

/// One listed identity, as returned by [`KeyManager::list`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PubKeyItem {
    /// `SHA256:` fingerprint.
    pub fingerprint: String,
    /// Algorithm name.
    pub algorithm: String,
    /// Comment supplied at add time.
    pub comment: String,
    /// Canonical public wire blob.
    pub blob: Vec<u8>,
}

/// Cloned per-key state a session needs to gate a signature.
#[derive(Clone, Debug)]
pub struct KeySnapshot {
    /// Public description of the key.
    pub info: KeyInfo,
    /// Whether signatures need explicit confirmation.
    pub confirm_required: bool,
    /// Destination constraints, in wire order.
    pub dest_constraints: Vec<DestinationConstraint>,
}

#[derive(Debug)]
struct Store {
    keys: Vec<Identity>,
    locked: bool,
    failed_attempts: u32,
    locked_until: Option<Instant>,
    lock_provider: Option<Box<dyn LockProvider>>,
}

enum Event {
    Added(KeyInfo),
    PreRemove(KeyInfo),
    Removed(String),
    Cleared,
    Locked,
    Unlocked,
}

/// The process-scoped key store.
///
/// Create once at initialization, share as `Arc<KeyManager>` between the
/// listener, sessions and any embedder plumbing.
pub struct KeyManager {
    store: Mutex<Store>,
    observers: Mutex<Vec<Arc<dyn KeyManagerObserver>>>,
}

impl Default for KeyManager {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyManager {
    /// Create an empty, unlocked store with no lock provider.
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store {
                keys: Vec::new(),
                locked: false,
                failed_attempts: 0,
                locked_until: None,
                lock_provider: None,
            }),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Install the lock provider that verifies the global passphrase.
    pub fn set_lock_provider(&self, provider: Box<dyn LockProvider>) {
        self.guard().lock_provider = Some(provider);
    }

    /// Register an observer for key lifecycle events.
    pub fn register_observer(&self, observer: Arc<dyn KeyManagerObserver>) {
        self.observers.lock().expect("observer lock").push(observer);
    }

    /// Remove a previously registered observer.
    pub fn unregister_observer(&self, observer: &Arc<dyn KeyManagerObserver>) {
        self.observers
            .lock()
            .expect("observer lock")
            .retain(|existing| !Arc::ptr_eq(existing, observer));
    }

    /// Add a credential with no constraints.
    pub fn add(&self, credential: Credential) -> Result<KeyInfo, KeyStoreError> {
        self.add_constrained(credential, &[])
    }

    /// Add a credential, applying lifetime, confirmation and
    /// destination-restriction constraints.
    ///
    /// An identity with the same public blob is evicted first, so re-adding
    /// a key replaces its comment and constraints.
    pub fn add_constrained(
        &self,
        credential: Credential,
        constraints: &[KeyConstraint],
    ) -> Result<KeyInfo, KeyStoreError> {
        // Dedupe on the canonical public blob before building a handle.
        let public_blob = credential.privkey.public_blob()?;

        let mut identity = Identity::new(credential.privkey, credential.comment)?;
        for constraint in constraints {
            match constraint {
                KeyConstraint::Lifetime(seconds) if *seconds > 0 => {
                    identity.set_lifetime(*seconds);
                }
                KeyConstraint::Lifetime(_) => {}
                KeyConstraint::Confirm => identity.set_confirm_required(true),
                KeyConstraint::Extension(extension) => {
                    let Some(restriction) =
                        extension.parse_key_constraint::<RestrictDestination>()?
                    else {
                        return Err(ProtoError::UnknownExtension {
                            name: extension.name.clone(),
                        }
                        .into());
                    };
                    identity.set_dest_constraints(restriction.constraints);
                }
            }
        }

        let info = identity.info();
        {
            let mut store = self.guard();
            if let Some(position) = find_key(&store.keys, &public_blob) {
                info!(fingerprint = %info.fingerprint, "key already exists, replacing");
                store.keys.remove(position);
            }
            store.keys.push(identity);
        }

        self.emit(Event::Added(info.clone()));
        Ok(info)
    }

    /// Remove the identity with the given public blob; missing keys are a
    /// silent no-op.
    pub fn remove(&self, public_blob: &[u8]) {
        let removed = {
            let mut store = self.guard();
            find_key(&store.keys, public_blob).map(|position| {
                let identity = store.keys.remove(position);
                identity.info()
            })
        };

        if let Some(info) = removed {
            self.emit(Event::PreRemove(info.clone()));
            self.emit(Event::Removed(info.fingerprint));
        }
    }

    /// Remove every identity.
    pub fn remove_all(&self) {
        let infos: Vec<KeyInfo> = {
            let mut store = self.guard();
            let keys = std::mem::take(&mut store.keys);
            keys.iter().map(Identity::info).collect()
        };

        info!(count = infos.len(), "removing all identities");
        for info in &infos {
            self.emit(Event::PreRemove(info.clone()));
        }
        for info in infos {
            self.emit(Event::Removed(info.fingerprint));
        }
        self.emit(Event::Cleared);
    }

    /// List the identities visible to a session: those the constraint
    /// evaluator permits with an empty user.
    pub fn list(&self, scope: &SessionScope<'_>) -> Vec<PubKeyItem> {
        let store = self.guard();
        let items: Vec<PubKeyItem> = store
            .keys
            .iter()
            .filter(|identity| identity.permitted(scope, "", None))
            .map(|identity| PubKeyItem {
                fingerprint: identity.public().fingerprint(),
                algorithm: identity.public().algorithm().into(),
                comment: identity.comment().into(),
                blob: identity.public().blob().to_vec(),
            })
            .collect();
        debug!(listed = items.len(), held = store.keys.len(), "listing identities");
        items
    }

    /// Clone the state a session needs to gate a signature with this key.
    pub fn snapshot(&self, public_blob: &[u8]) -> Option<KeySnapshot> {
        let store = self.guard();
        find_key(&store.keys, public_blob).map(|position| {
            let identity = &store.keys[position];
            KeySnapshot {
                info: identity.info(),
                confirm_required: identity.confirm_required(),
                dest_constraints: identity.dest_constraints().to_vec(),
            }
        })
    }

    /// Sign `data` with the identity addressed by `public_blob`.
    pub fn sign(
        &self,
        public_blob: &[u8],
        data: &[u8],
        flags: u32,
    ) -> Result<crate::proto::Signature, KeyStoreError> {
        let store = self.guard();
        let position = find_key(&store.keys, public_blob).ok_or(KeyStoreError::KeyNotFound)?;
        store.keys[position].sign(data, flags)
    }

    /// Look an identity up by its `SHA256:` fingerprint.
    pub fn get_by_fingerprint(&self, fingerprint: &str) -> Option<KeyInfo> {
        let store = self.guard();
        store
            .keys
            .iter()
            .find(|identity| identity.public().fingerprint() == fingerprint)
            .map(Identity::info)
    }

    /// Drop identities whose lifetime has elapsed. Embedders call this
    /// periodically (once a second is plenty).
    pub fn cleanup_expired(&self) {
        self.cleanup_expired_at(Instant::now());
    }

    pub(crate) fn cleanup_expired_at(&self, now: Instant) {
        let removed: Vec<KeyInfo> = {
            let mut store = self.guard();
            let mut infos = Vec::new();
            store.keys.retain(|identity| {
                if identity.expired_at(now) {
                    debug!(fingerprint = %identity.public().fingerprint(), "removing expired key");
                    infos.push(identity.info());
                    false
                } else {
                    true
                }
            });
            infos
        };

        for info in removed {
            self.emit(Event::PreRemove(info.clone()));
            self.emit(Event::Removed(info.fingerprint));
        }
    }

    /// Whether the agent is locked.
    pub fn is_locked(&self) -> bool {
        self.guard().locked
    }

    /// Number of identities held.
    pub fn len(&self) -> usize {
        self.guard().keys.len()
    }

    /// Whether the store holds no identities.
    pub fn is_empty(&self) -> bool {
        self.guard().keys.is_empty()
    }

    /// Lock the agent: store a passphrase verifier and seal every private
    /// handle. Aborts the process when no lock provider is installed, since
    /// continuing would silently void the lock semantic.
    pub fn lock(&self, passphrase: &[u8]) -> Result<(), KeyStoreError> {
        {
            let mut store = self.guard();

            if store.lock_provider.is_none() {
                error!("no lock provider set, cannot lock");
                std::process::abort();
            }

            if store.locked {
                return Err(KeyStoreError::AlreadyLocked);
            }

            // Store the verifier even with no keys held, so the lock applies
            // to identities added later in the locked state's lifetime.
            store
                .lock_provider
                .as_mut()
                .expect("checked above")
                .lock(passphrase);

            for identity in &mut store.keys {
                identity.lock(passphrase)?;
            }

            store.locked = true;
        }

        self.emit(Event::Locked);
        Ok(())
    }

    /// Unlock the agent with the passphrase it was locked with.
    ///
    /// Failed attempts are counted; after more than two the gate closes for
    /// `floor(1.8^attempts)` seconds, during which even the correct
    /// passphrase is refused (and still counted).
    pub fn unlock(&self, passphrase: &[u8]) -> Result<(), KeyStoreError> {
        {
            let mut store = self.guard();

            if !store.locked {
                return Err(KeyStoreError::NotLocked);
            }

            if store.lock_provider.is_none() {
                error!("no lock provider set, cannot unlock");
                std::process::abort();
            }

            let now = Instant::now();
            if let Some(until) = store.locked_until {
                if now < until {
                    store.failed_attempts += 1;
                    let wait_secs = until.duration_since(now).as_secs();
                    return Err(KeyStoreError::Backoff { wait_secs });
                }
            }

            let verified = store
                .lock_provider
                .as_ref()
                .expect("checked above")
                .verify(passphrase);

            let mut outcome = if verified {
                Ok(())
            } else {
                Err(KeyStoreError::BadPassphrase)
            };
            if outcome.is_ok() {
                for identity in &mut store.keys {
                    if let Err(error) = identity.unlock(passphrase) {
                        outcome = Err(error);
                        break;
                    }
                }
            }

            if let Err(error) = outcome {
                store.failed_attempts += 1;
                if store.failed_attempts > BACKOFF_FREE_ATTEMPTS {
                    let wait = 1.8f64.powi(store.failed_attempts as i32).floor() as u64;
                    warn!(wait, "too many failed unlock attempts, backing off");
                    store.locked_until = Some(now + Duration::from_secs(wait));
                }
                return Err(error);
            }

            store.locked = false;
            store.failed_attempts = 0;
            store.locked_until = None;
        }

        self.emit(Event::Unlocked);
        Ok(())
    }

    /// Notify observers that a key produced a signature.
    pub fn emit_key_used(&self, key: &KeyInfo, session: SessionId) {
        for observer in self.observer_list() {
            observer.key_used(key, session);
        }
    }

    /// Notify observers that the confirmation hook declined a signature.
    pub fn emit_key_declined(&self, key: &KeyInfo, session: SessionId) {
        for observer in self.observer_list() {
            observer.key_declined(key, session);
        }
    }

    fn guard(&self) -> MutexGuard<'_, Store> {
        self.store.lock().expect("key store lock poisoned")
    }

    fn observer_list(&self) -> Vec<Arc<dyn KeyManagerObserver>> {
        self.observers.lock().expect("observer lock").clone()
    }

    fn emit(&self, event: Event) {
        for observer in self.observer_list() {
            match &event {
                Event::Added(info) => observer.key_added(info),
                Event::PreRemove(info) => observer.key_pre_remove(info),
                Event::Removed(fingerprint) => observer.key_removed(fingerprint),
                Event::Cleared => observer.keys_cleared(),
                Event::Locked => observer.locked(),
                Event::Unlocked => observer.unlocked(),
            }
        }
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.guard();
        f.debug_struct("KeyManager")
            .field("keys", &store.keys.len())
            .field("locked", &store.locked)
            .finish_non_exhaustive()
    }
}

fn find_key(keys: &[Identity], public_blob: &[u8]) -> Option<usize> {
    keys.iter()
        .position(|identity| identity.public().blob() == public_blob)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use testresult::TestResult;

    use super::*;
    use crate::key::lock::Pbkdf2LockProvider;
    use crate::proto::{Ed25519Keypair, PrivateKeyData};
    use crate::secret::SecretBuffer;

    fn credential(seed: u8, comment: &str) -> Credential {
        let signing = ed25519_dalek::SigningKey::from_bytes(&[seed; 32]);
        let public = signing.verifying_key().to_bytes().to_vec();
        let mut private = signing.to_bytes().to_vec();
        private.extend_from_slice(&public);
        Credential {
            privkey: PrivateKeyData::Ed25519(Ed25519Keypair {
                public,
                private: SecretBuffer::from_vec(private),
            }),
            comment: comment.into(),
        }
    }

    fn no_bindings() -> SessionScope<'static> {
        SessionScope {
            bindings: &[],
            binding_failed: false,
        }
    }

    #[derive(Default)]
    struct Recorder {
        events: StdMutex<Vec<String>>,
    }

    impl KeyManagerObserver for Recorder {
        fn key_added(&self, key: &KeyInfo) {
            self.events.lock().unwrap().push(format!("added:{}", key.comment));
        }
        fn key_pre_remove(&self, key: &KeyInfo) {
            self.events.lock().unwrap().push(format!("pre:{}", key.comment));
        }
        fn key_removed(&self, fingerprint: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("removed:{}", &fingerprint[..12]));
        }
        fn keys_cleared(&self) {
            self.events.lock().unwrap().push("cleared".into());
        }
        fn locked(&self) {
            self.events.lock().unwrap().push("locked".into());
        }
        fn unlocked(&self) {
            self.events.lock().unwrap().push("unlocked".into());
        }
    }

    #[test]
    fn re_adding_a_key_keeps_the_second_comment() -> TestResult {
        let manager = KeyManager::new();
        manager.add(credential(1, "first"))?;
        manager.add(credential(1, "second"))?;

        let listed = manager.list(&no_bindings());
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].comment, "second");
        Ok(())
    }

    #[test]
    fn lifetime_constraint_expires_keys() -> TestResult {
        let manager = KeyManager::new();
        manager.add_constrained(credential(1, "short"), &[KeyConstraint::Lifetime(10)])?;
        manager.add(credential(2, "forever"))?;

        let now = Instant::now();
        manager.cleanup_expired_at(now + Duration::from_secs(5));
        assert_eq!(manager.len(), 2);

        manager.cleanup_expired_at(now + Duration::from_secs(10));
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.list(&no_bindings())[0].comment, "forever");
        Ok(())
    }

    #[test]
    fn observers_see_the_full_lifecycle() -> TestResult {
        let manager = KeyManager::new();
        let recorder = Arc::new(Recorder::default());
        manager.register_observer(recorder.clone());

        let info = manager.add(credential(1, "watched"))?;
        manager.remove(&info.public_blob);
        manager.add(credential(2, "other"))?;
        manager.remove_all();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(events[0], "added:watched");
        assert_eq!(events[1], "pre:watched");
        assert!(events[2].starts_with("removed:SHA256:"));
        assert_eq!(events.last().unwrap(), "cleared");
        Ok(())
    }

    #[test]
    fn unregistered_observer_goes_quiet() -> TestResult {
        let manager = KeyManager::new();
        let recorder = Arc::new(Recorder::default());
        let handle: Arc<dyn KeyManagerObserver> = recorder.clone();
        manager.register_observer(handle.clone());
        manager.unregister_observer(&handle);

        manager.add(credential(1, "silent"))?;
        assert!(recorder.events.lock().unwrap().is_empty());
        Ok(())
    }

    #[test]
    fn lock_gates_signing_and_unlock_restores_it() -> TestResult {
        let manager = KeyManager::new();
        manager.set_lock_provider(Box::new(Pbkdf2LockProvider::new()));
        let info = manager.add(credential(1, "locked"))?;

        manager.lock(b"testpassword")?;
        assert!(manager.is_locked());
        assert!(matches!(
            manager.lock(b"again"),
            Err(KeyStoreError::AlreadyLocked)
        ));
        assert!(manager.sign(&info.public_blob, b"data", 0).is_err());

        manager.unlock(b"testpassword")?;
        assert!(!manager.is_locked());
        assert!(manager.sign(&info.public_blob, b"data", 0).is_ok());

        assert!(matches!(
            manager.unlock(b"testpassword"),
            Err(KeyStoreError::NotLocked)
        ));
        Ok(())
    }

    #[test]
    fn repeated_failures_close_the_backoff_gate() -> TestResult {
        let manager = KeyManager::new();
        manager.set_lock_provider(Box::new(Pbkdf2LockProvider::new()));
        manager.lock(b"testpassword")?;

        for _ in 0..3 {
            assert!(matches!(
                manager.unlock(b"wrong"),
                Err(KeyStoreError::BadPassphrase)
            ));
        }

        // Third failure armed the gate: even the right passphrase waits.
        match manager.unlock(b"testpassword") {
            Err(KeyStoreError::Backoff { wait_secs }) => {
                // floor(1.8^3) = 5
                assert!(wait_secs <= 5);
            }
            other => panic!("expected backoff, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn missing_key_is_key_not_found() {
        let manager = KeyManager::new();
        assert!(matches!(
            manager.sign(&[1, 2, 3], b"data", 0),
            Err(KeyStoreError::KeyNotFound)
        ));
        manager.remove(&[1, 2, 3]);
    }
}
