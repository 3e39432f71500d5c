//! Cryptographic capability backing the agent.
//!
//! The message layer hands this module a typed
//! [`PrivateKeyData`](crate::proto::PrivateKeyData); [`instantiate`] turns it
//! into an opaque signing handle, one implementation per supported algorithm
//! name. [`verify`] checks SSH-framed signatures against canonical public
//! blobs (used by session binding), and [`protect`]/[`unprotect`] move keys
//! in and out of passphrase-sealed form while the agent is locked.

use core::fmt;

use ssh_encoding::{Decode, Encode};
use thiserror::Error;
use zeroize::Zeroize;

use crate::proto::{PrivateKeyData, ProtoError, Signature};
use crate::secret::SecretBuffer;

mod ecdsa;
mod ed25519;
mod ed448;
pub mod protect;
mod rsa;

/// Crypto backend error.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The algorithm name is not registered with this backend.
    #[error("Unknown key algorithm {algorithm:?}")]
    UnknownAlgorithm {
        /// The offending algorithm name.
        algorithm: String,
    },

    /// Key material failed structural validation.
    #[error("Invalid key material: {0}")]
    InvalidKey(&'static str),

    /// Signing or verification failed inside the backend.
    #[error("Signature operation failed: {0}")]
    Signature(#[from] signature::Error),

    /// Wire-format failure while (re)encoding key material.
    #[error("SSH encoding error: {0}")]
    Encoding(#[from] ssh_encoding::Error),

    /// Protocol-level failure while decoding sealed key material.
    #[error("Protocol error: {0}")]
    Proto(#[from] ProtoError),

    /// RSA parameter rejection.
    #[error("RSA error: {0}")]
    Rsa(#[from] ::rsa::Error),

    /// Passphrase did not authenticate the sealed key.
    #[error("Bad passphrase")]
    BadPassphrase,

    /// A signature that was required to verify did not.
    #[error("Signature verification failed")]
    VerificationFailed,
}

/// An instantiated private key, able to sign.
///
/// Implementations exist per algorithm name; embedders normally obtain one
/// through [`instantiate`] and never construct them directly.
pub trait KeyPair: Send + Sync + fmt::Debug {
    /// Algorithm name (e.g. `ssh-ed25519`).
    fn algorithm(&self) -> &'static str;

    /// Key family for display (e.g. `ED25519`, `RSA`).
    fn family(&self) -> &'static str;

    /// Key size in bits, for display.
    fn bits(&self) -> usize;

    /// Produce an SSH-framed signature over `data`.
    ///
    /// `flags` selects the RSA signature flavor; other algorithms ignore it.
    fn sign(&self, data: &[u8], flags: u32) -> Result<Signature, CryptoError>;

    /// The wire form this handle was built from, for sealed export.
    fn keypair_data(&self) -> &PrivateKeyData;
}

/// Build a signing handle from decoded private key material.
pub fn instantiate(data: PrivateKeyData) -> Result<Box<dyn KeyPair>, CryptoError> {
    match data {
        PrivateKeyData::Ed25519(_) => ed25519::Ed25519Pair::new(data).map(boxed),
        PrivateKeyData::Ed448(_) => ed448::Ed448Pair::new(data).map(boxed),
        PrivateKeyData::Rsa(_) => rsa::RsaPair::new(data).map(boxed),
        PrivateKeyData::Ecdsa(_) => ecdsa::EcdsaPair::new(data).map(boxed),
    }
}

fn boxed<T: KeyPair + 'static>(pair: T) -> Box<dyn KeyPair> {
    Box::new(pair)
}

/// Verify an SSH-framed signature blob over `data` under a canonical public
/// wire blob.
///
/// Dispatches on the framed signature algorithm, so `rsa-sha2-512` and
/// `ssh-rsa` both verify against the same RSA public key. Returns `Ok(false)`
/// for a well-formed but wrong signature and an error for structural
/// failures.
pub fn verify(public_blob: &[u8], data: &[u8], signature_blob: &[u8]) -> Result<bool, CryptoError> {
    let mut reader = public_blob;
    let algorithm = String::decode(&mut reader).map_err(ProtoError::from)?;
    let signature = Signature::from_blob(signature_blob)?;

    match algorithm.as_str() {
        crate::proto::ALG_ED25519 => ed25519::verify(&mut reader, data, &signature),
        crate::proto::ALG_ED448 => ed448::verify(&mut reader, data, &signature),
        crate::proto::ALG_RSA => rsa::verify(&mut reader, data, &signature),
        _ => match crate::proto::EcdsaCurve::from_algorithm(&algorithm) {
            Some(curve) => ecdsa::verify(curve, &mut reader, data, &signature),
            None => Err(CryptoError::UnknownAlgorithm { algorithm }),
        },
    }
}

/// Seal private key material under a passphrase.
///
/// The result is opaque ciphertext; the original handle should be dropped
/// once this returns, which is what makes the agent lock effective.
pub fn protect(data: &PrivateKeyData, passphrase: &[u8]) -> Result<SecretBuffer, CryptoError> {
    let mut plain = Vec::new();
    data.algorithm().encode(&mut plain)?;
    data.encode(&mut plain)?;
    let sealed = protect::seal(&plain, passphrase);
    plain.zeroize();
    Ok(SecretBuffer::from_vec(sealed))
}

/// Recover a signing handle from passphrase-sealed key material.
pub fn unprotect(sealed: &[u8], passphrase: &[u8]) -> Result<Box<dyn KeyPair>, CryptoError> {
    let plain = protect::open(sealed, passphrase)?;
    let mut reader = plain.as_slice();
    let algorithm = String::decode(&mut reader).map_err(ProtoError::from)?;
    let data = PrivateKeyData::decode_as(&mut reader, &algorithm)?;
    instantiate(data)
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::proto::{Ed25519Keypair, ALG_ED25519};

    fn demo_keypair() -> PrivateKeyData {
        let signing = ed25519_dalek::SigningKey::from_bytes(&[0x42; 32]);
        let public = signing.verifying_key().to_bytes().to_vec();
        let mut private = signing.to_bytes().to_vec();
        private.extend_from_slice(&public);
        PrivateKeyData::Ed25519(Ed25519Keypair {
            public,
            private: SecretBuffer::from_vec(private),
        })
    }

    #[test]
    fn sign_verify_round_trip() -> TestResult {
        let data = demo_keypair();
        let public_blob = data.public_blob()?;
        let pair = instantiate(data)?;

        assert_eq!(pair.algorithm(), ALG_ED25519);
        assert_eq!(pair.bits(), 256);

        let signature = pair.sign(b"attack at dawn", 0)?;
        let blob = signature.to_blob()?;
        assert!(verify(&public_blob, b"attack at dawn", &blob)?);
        assert!(!verify(&public_blob, b"attack at dusk", &blob)?);
        Ok(())
    }

    #[test]
    fn protect_round_trips_through_passphrase() -> TestResult {
        let data = demo_keypair();
        let sealed = protect(&data, b"hunter2")?;

        let pair = unprotect(sealed.as_slice(), b"hunter2")?;
        assert_eq!(pair.algorithm(), ALG_ED25519);

        assert!(matches!(
            unprotect(sealed.as_slice(), b"hunter3"),
            Err(CryptoError::BadPassphrase)
        ));
        Ok(())
    }
}
