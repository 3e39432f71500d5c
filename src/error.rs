//! Crate-level error type.

use std::io;

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::key::KeyStoreError;
use crate::proto::ProtoError;

/// Errors that can surface from an agent session or listener.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Protocol-level failure (malformed or unsupported message).
    #[error("Agent: Protocol error: {0}")]
    Proto(#[from] ProtoError),

    /// Failure inside the cryptographic backend.
    #[error("Agent: Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Failure inside the key store.
    #[error("Agent: Key store error: {0}")]
    Store(#[from] KeyStoreError),

    /// A second sign or identity-list request arrived while one was still
    /// outstanding on the same session. This is a programmer error in the
    /// embedder's transport driver; the offending session is terminated.
    #[error("Agent: concurrent request on a single session")]
    ConcurrentRequest,

    /// I/O failure on the transport.
    #[error("Agent: I/O error: {0}")]
    IO(#[from] io::Error),

    /// Any other embedder-supplied failure.
    #[error("Other error: {0:#}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl AgentError {
    /// Wrap an arbitrary error value.
    pub fn other(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Other(Box::new(error))
    }
}
