//! Key management: identities, lifecycle, locking and observers.

pub mod events;
pub mod identity;
pub mod lock;
pub mod manager;
pub mod public;

pub use self::events::KeyManagerObserver;
pub use self::identity::{Identity, KeyInfo};
pub use self::lock::{LockProvider, Pbkdf2LockProvider};
pub use self::manager::{KeyManager, KeyStoreError, PubKeyItem};
pub use self::public::PublicKey;
