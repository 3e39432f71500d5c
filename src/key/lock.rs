//! Global lock passphrase verification.

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;
const PBKDF2_ROUNDS: u32 = 600_000;

/// Stores and verifies the agent lock passphrase.
///
/// A provider must be installed before [`KeyManager::lock`](super::KeyManager::lock)
/// is called; locking without one aborts the process, because silently
/// skipping verification would void the lock semantic.
pub trait LockProvider: Send + Sync + std::fmt::Debug {
    /// Store a verifier for `passphrase`; called once per lock.
    fn lock(&mut self, passphrase: &[u8]);

    /// Check a candidate passphrase against the stored verifier.
    fn verify(&self, passphrase: &[u8]) -> bool;
}

/// [`LockProvider`] backed by PBKDF2-HMAC-SHA256 with a random per-lock salt.
#[derive(Default)]
pub struct Pbkdf2LockProvider {
    verifier: Option<([u8; SALT_LEN], [u8; HASH_LEN])>,
}

impl Pbkdf2LockProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    fn derive(passphrase: &[u8], salt: &[u8]) -> [u8; HASH_LEN] {
        let mut hash = [0u8; HASH_LEN];
        pbkdf2_hmac::<Sha256>(passphrase, salt, PBKDF2_ROUNDS, &mut hash);
        hash
    }
}

impl LockProvider for Pbkdf2LockProvider {
    fn lock(&mut self, passphrase: &[u8]) {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let hash = Self::derive(passphrase, &salt);
        self.verifier = Some((salt, hash));
    }

    fn verify(&self, passphrase: &[u8]) -> bool {
        match &self.verifier {
            Some((salt, expected)) => {
                let mut candidate = Self::derive(passphrase, salt);
                let matches = bool::from(candidate.as_slice().ct_eq(expected.as_slice()));
                candidate.zeroize();
                matches
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Pbkdf2LockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pbkdf2LockProvider")
            .field("armed", &self.verifier.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_only_the_locked_passphrase() {
        let mut provider = Pbkdf2LockProvider::new();
        assert!(!provider.verify(b"anything"));

        provider.lock(b"testpassword");
        assert!(provider.verify(b"testpassword"));
        assert!(!provider.verify(b"wrong"));
    }
}
