//! Protocol error types.

use std::io;

use thiserror::Error;

/// SSH protocol error.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Message contained a string that is not valid UTF-8.
    #[error("String encoding failed: {0}")]
    StringEncoding(#[from] std::str::Utf8Error),

    /// I/O failure while reading or writing a message.
    #[error("IO Error: {0}")]
    IO(#[from] io::Error),

    /// SSH wire-format failure: short read, length overflow or trailing
    /// garbage.
    #[error("SSH encoding error: {0}")]
    SshEncoding(#[from] ssh_encoding::Error),

    /// SSH key-format failure (bad mpint, bad key structure).
    #[error("SSH key error: {0}")]
    SshKey(#[from] ssh_key::Error),

    /// Message type byte is not one this agent recognizes.
    #[error("Command not supported ({command})")]
    UnsupportedCommand {
        /// The received message type byte.
        command: u8,
    },

    /// Add-Identity carried a constraint with an unknown tag.
    #[error("Unknown key constraint ({tag})")]
    UnknownConstraint {
        /// The received constraint tag.
        tag: u8,
    },

    /// Extension name is not known to this agent.
    #[error("Unknown extension {name:?}")]
    UnknownExtension {
        /// The received extension name.
        name: String,
    },

    /// Key algorithm is not one this agent supports.
    #[error("Unknown key algorithm {algorithm:?}")]
    UnknownAlgorithm {
        /// The received algorithm name.
        algorithm: String,
    },

    /// A hop descriptor or destination constraint violated a structural
    /// invariant.
    #[error("Invalid destination constraint: {0}")]
    InvalidConstraint(&'static str),

    /// Data-to-be-signed did not parse as a hostbound userauth request.
    #[error("Invalid userauth request: {0}")]
    InvalidUserAuth(&'static str),

    /// A message exceeded the serialized-size ceiling.
    #[error("Message too large ({size} bytes)")]
    MessageTooLarge {
        /// Claimed or produced message size.
        size: usize,
    },

    /// Response did not match the request that was sent.
    #[error("Unexpected response")]
    UnexpectedResponse,
}

/// Protocol result.
pub type ProtoResult<T> = std::result::Result<T, ProtoError>;
