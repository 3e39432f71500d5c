//! RSA signing backend.
//!
//! The signature flavor is chosen by the sign-request flags: absent flags
//! mean the legacy `ssh-rsa` (SHA-1) signature, `0x02` selects
//! `rsa-sha2-256` and `0x04` selects `rsa-sha2-512`.

use rsa::pkcs1v15::{Signature as RsaSignature, SigningKey, VerifyingKey};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use signature::{SignatureEncoding, Signer, Verifier};
use ssh_key::Mpint;
use ssh_encoding::{Decode, Reader};

use super::{CryptoError, KeyPair};
use crate::proto::{
    PrivateKeyData, ProtoError, Signature, ALG_RSA, SIG_FLAG_RSA_SHA2_256, SIG_FLAG_RSA_SHA2_512,
};

const ALG_RSA_SHA2_256: &str = "rsa-sha2-256";
const ALG_RSA_SHA2_512: &str = "rsa-sha2-512";

fn to_biguint(mpint: &Mpint) -> Result<BigUint, CryptoError> {
    let bytes = mpint
        .as_positive_bytes()
        .ok_or(CryptoError::InvalidKey("negative RSA parameter"))?;
    Ok(BigUint::from_bytes_be(bytes))
}

pub(super) struct RsaPair {
    data: PrivateKeyData,
    key: RsaPrivateKey,
}

impl RsaPair {
    pub(super) fn new(data: PrivateKeyData) -> Result<Self, CryptoError> {
        let PrivateKeyData::Rsa(pair) = &data else {
            return Err(CryptoError::InvalidKey("not an RSA key"));
        };

        let key = RsaPrivateKey::from_components(
            to_biguint(&pair.n)?,
            to_biguint(&pair.e)?,
            to_biguint(&pair.d)?,
            vec![to_biguint(&pair.p)?, to_biguint(&pair.q)?],
        )?;

        Ok(Self { data, key })
    }
}

impl KeyPair for RsaPair {
    fn algorithm(&self) -> &'static str {
        ALG_RSA
    }

    fn family(&self) -> &'static str {
        "RSA"
    }

    fn bits(&self) -> usize {
        self.key.size() * 8
    }

    fn sign(&self, data: &[u8], flags: u32) -> Result<Signature, CryptoError> {
        let (algorithm, raw) = if flags & SIG_FLAG_RSA_SHA2_512 != 0 {
            let signature = SigningKey::<Sha512>::new(self.key.clone()).try_sign(data)?;
            (ALG_RSA_SHA2_512, signature.to_vec())
        } else if flags & SIG_FLAG_RSA_SHA2_256 != 0 {
            let signature = SigningKey::<Sha256>::new(self.key.clone()).try_sign(data)?;
            (ALG_RSA_SHA2_256, signature.to_vec())
        } else {
            let signature = SigningKey::<Sha1>::new(self.key.clone()).try_sign(data)?;
            (ALG_RSA, signature.to_vec())
        };

        Ok(Signature {
            algorithm: algorithm.into(),
            blob: raw,
        })
    }

    fn keypair_data(&self) -> &PrivateKeyData {
        &self.data
    }
}

impl core::fmt::Debug for RsaPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RsaPair")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

pub(super) fn verify(
    reader: &mut impl Reader,
    data: &[u8],
    signature: &Signature,
) -> Result<bool, CryptoError> {
    let e = Mpint::decode(reader).map_err(ProtoError::from)?;
    let n = Mpint::decode(reader).map_err(ProtoError::from)?;
    let public = RsaPublicKey::new(to_biguint(&n)?, to_biguint(&e)?)?;

    let Ok(raw) = RsaSignature::try_from(signature.blob.as_slice()) else {
        return Ok(false);
    };

    let ok = match signature.algorithm.as_str() {
        ALG_RSA => VerifyingKey::<Sha1>::new(public).verify(data, &raw).is_ok(),
        ALG_RSA_SHA2_256 => VerifyingKey::<Sha256>::new(public)
            .verify(data, &raw)
            .is_ok(),
        ALG_RSA_SHA2_512 => VerifyingKey::<Sha512>::new(public)
            .verify(data, &raw)
            .is_ok(),
        _ => false,
    };
    Ok(ok)
}
