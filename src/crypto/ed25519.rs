//! Ed25519 signing backend.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use ssh_encoding::{Decode, Reader};

use super::{CryptoError, KeyPair};
use crate::proto::{PrivateKeyData, ProtoError, Signature, ALG_ED25519};

pub(super) struct Ed25519Pair {
    data: PrivateKeyData,
    signer: SigningKey,
}

impl Ed25519Pair {
    pub(super) fn new(data: PrivateKeyData) -> Result<Self, CryptoError> {
        let PrivateKeyData::Ed25519(pair) = &data else {
            return Err(CryptoError::InvalidKey("not an ed25519 key"));
        };

        // The wire private half is seed || public point.
        let private = pair.private.as_slice();
        if private.len() != 64 {
            return Err(CryptoError::InvalidKey("ed25519 private half must be 64 bytes"));
        }
        let seed: [u8; 32] = private[..32]
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("ed25519 seed"))?;

        let signer = SigningKey::from_bytes(&seed);
        if signer.verifying_key().to_bytes().as_slice() != pair.public {
            return Err(CryptoError::InvalidKey(
                "ed25519 public point does not match private seed",
            ));
        }

        Ok(Self { data, signer })
    }
}

impl KeyPair for Ed25519Pair {
    fn algorithm(&self) -> &'static str {
        ALG_ED25519
    }

    fn family(&self) -> &'static str {
        "ED25519"
    }

    fn bits(&self) -> usize {
        256
    }

    fn sign(&self, data: &[u8], _flags: u32) -> Result<Signature, CryptoError> {
        let signature = self.signer.try_sign(data)?;
        Ok(Signature {
            algorithm: ALG_ED25519.into(),
            blob: signature.to_bytes().to_vec(),
        })
    }

    fn keypair_data(&self) -> &PrivateKeyData {
        &self.data
    }
}

impl core::fmt::Debug for Ed25519Pair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Ed25519Pair").finish_non_exhaustive()
    }
}

pub(super) fn verify(
    reader: &mut impl Reader,
    data: &[u8],
    signature: &Signature,
) -> Result<bool, CryptoError> {
    if signature.algorithm != ALG_ED25519 {
        return Ok(false);
    }

    let public = Vec::decode(reader).map_err(ProtoError::from)?;
    let public: [u8; 32] = public
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("ed25519 public point must be 32 bytes"))?;
    let verifier = VerifyingKey::from_bytes(&public)?;

    let signature = ed25519_dalek::Signature::try_from(signature.blob.as_slice())?;
    Ok(verifier.verify(data, &signature).is_ok())
}
