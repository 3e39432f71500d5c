//! Ed448 signing backend.

use ed448_goldilocks::{SecretKey, SigningKey, VerifyingKey};
use ssh_encoding::{Decode, Reader};

use super::{CryptoError, KeyPair};
use crate::proto::{PrivateKeyData, ProtoError, Signature, ALG_ED448};

const SECRET_LEN: usize = 57;

pub(super) struct Ed448Pair {
    data: PrivateKeyData,
    signer: SigningKey,
}

impl Ed448Pair {
    pub(super) fn new(data: PrivateKeyData) -> Result<Self, CryptoError> {
        let PrivateKeyData::Ed448(pair) = &data else {
            return Err(CryptoError::InvalidKey("not an ed448 key"));
        };

        let private = pair.private.as_slice();
        if private.len() < SECRET_LEN {
            return Err(CryptoError::InvalidKey("ed448 private half too short"));
        }
        let seed: [u8; SECRET_LEN] = private[..SECRET_LEN]
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("ed448 seed"))?;

        let signer = SigningKey::from(&SecretKey::from(seed));
        Ok(Self { data, signer })
    }
}

impl KeyPair for Ed448Pair {
    fn algorithm(&self) -> &'static str {
        ALG_ED448
    }

    fn family(&self) -> &'static str {
        "ED448"
    }

    fn bits(&self) -> usize {
        456
    }

    fn sign(&self, data: &[u8], _flags: u32) -> Result<Signature, CryptoError> {
        let signature = self.signer.sign_raw(data);
        Ok(Signature {
            algorithm: ALG_ED448.into(),
            blob: signature.to_bytes().to_vec(),
        })
    }

    fn keypair_data(&self) -> &PrivateKeyData {
        &self.data
    }
}

impl core::fmt::Debug for Ed448Pair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Ed448Pair").finish_non_exhaustive()
    }
}

pub(super) fn verify(
    reader: &mut impl Reader,
    data: &[u8],
    signature: &Signature,
) -> Result<bool, CryptoError> {
    if signature.algorithm != ALG_ED448 {
        return Ok(false);
    }

    let public = Vec::decode(reader).map_err(ProtoError::from)?;
    let public: [u8; SECRET_LEN] = public
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKey("ed448 public point must be 57 bytes"))?;
    let verifier =
        VerifyingKey::from_bytes(&public).map_err(|_| CryptoError::InvalidKey("ed448 point"))?;

    let signature = ed448_goldilocks::Signature::try_from(signature.blob.as_slice())
        .map_err(|_| CryptoError::InvalidKey("ed448 signature"))?;
    Ok(verifier.verify_raw(&signature, data).is_ok())
}
