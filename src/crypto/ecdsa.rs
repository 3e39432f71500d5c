//! ECDSA signing backend for the NIST curves.
//!
//! The digest is fixed per curve (SHA-256/384/512 for P-256/384/521) and the
//! raw signature is the SSH inner blob `mpint r || mpint s`.

use signature::{Signer, Verifier};
use ssh_key::Mpint;
use ssh_encoding::{Decode, Reader};

use super::{CryptoError, KeyPair};
use crate::proto::{EcdsaCurve, EcdsaRawSignature, PrivateKeyData, ProtoError, Signature};

enum EcdsaSigner {
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    P521(p521::ecdsa::SigningKey),
}

pub(super) struct EcdsaPair {
    data: PrivateKeyData,
    signer: EcdsaSigner,
}

impl EcdsaPair {
    pub(super) fn new(data: PrivateKeyData) -> Result<Self, CryptoError> {
        let PrivateKeyData::Ecdsa(pair) = &data else {
            return Err(CryptoError::InvalidKey("not an ECDSA key"));
        };

        let scalar = pair.padded_scalar();
        let signer = match pair.curve {
            EcdsaCurve::NistP256 => p256::ecdsa::SigningKey::from_slice(scalar.as_slice())
                .map(EcdsaSigner::P256)
                .map_err(CryptoError::Signature)?,
            EcdsaCurve::NistP384 => p384::ecdsa::SigningKey::from_slice(scalar.as_slice())
                .map(EcdsaSigner::P384)
                .map_err(CryptoError::Signature)?,
            EcdsaCurve::NistP521 => p521::ecdsa::SigningKey::from_slice(scalar.as_slice())
                .map(EcdsaSigner::P521)
                .map_err(CryptoError::Signature)?,
        };

        Ok(Self { data, signer })
    }

    fn curve(&self) -> EcdsaCurve {
        match &self.data {
            PrivateKeyData::Ecdsa(pair) => pair.curve,
            _ => unreachable!("constructor checked the variant"),
        }
    }
}

fn framed(
    curve: EcdsaCurve,
    r_bytes: &[u8],
    s_bytes: &[u8],
) -> Result<Signature, CryptoError> {
    let raw = EcdsaRawSignature {
        r: Mpint::from_positive_bytes(r_bytes).map_err(ProtoError::from)?,
        s: Mpint::from_positive_bytes(s_bytes).map_err(ProtoError::from)?,
    };

    let mut blob = Vec::new();
    ssh_encoding::Encode::encode(&raw, &mut blob)?;

    Ok(Signature {
        algorithm: curve.algorithm().into(),
        blob,
    })
}

impl KeyPair for EcdsaPair {
    fn algorithm(&self) -> &'static str {
        self.curve().algorithm()
    }

    fn family(&self) -> &'static str {
        "ECDSA"
    }

    fn bits(&self) -> usize {
        match self.curve() {
            EcdsaCurve::NistP256 => 256,
            EcdsaCurve::NistP384 => 384,
            EcdsaCurve::NistP521 => 521,
        }
    }

    fn sign(&self, data: &[u8], _flags: u32) -> Result<Signature, CryptoError> {
        match &self.signer {
            EcdsaSigner::P256(key) => {
                let signature: p256::ecdsa::Signature = key.try_sign(data)?;
                let (r, s) = signature.split_bytes();
                framed(EcdsaCurve::NistP256, r.as_slice(), s.as_slice())
            }
            EcdsaSigner::P384(key) => {
                let signature: p384::ecdsa::Signature = key.try_sign(data)?;
                let (r, s) = signature.split_bytes();
                framed(EcdsaCurve::NistP384, r.as_slice(), s.as_slice())
            }
            EcdsaSigner::P521(key) => {
                let signature: p521::ecdsa::Signature = key.try_sign(data)?;
                let (r, s) = signature.split_bytes();
                framed(EcdsaCurve::NistP521, r.as_slice(), s.as_slice())
            }
        }
    }

    fn keypair_data(&self) -> &PrivateKeyData {
        &self.data
    }
}

impl core::fmt::Debug for EcdsaPair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EcdsaPair")
            .field("curve", &self.curve().as_str())
            .finish_non_exhaustive()
    }
}

/// Left-pad an mpint's magnitude to the curve's field size.
fn scalar_bytes(mpint: &Mpint, size: usize) -> Result<Vec<u8>, CryptoError> {
    let raw = mpint
        .as_positive_bytes()
        .ok_or(CryptoError::InvalidKey("negative ECDSA scalar"))?;
    if raw.len() > size {
        return Err(CryptoError::InvalidKey("oversized ECDSA scalar"));
    }
    let mut out = vec![0u8; size - raw.len()];
    out.extend_from_slice(raw);
    Ok(out)
}

pub(super) fn verify(
    curve: EcdsaCurve,
    reader: &mut impl Reader,
    data: &[u8],
    signature: &Signature,
) -> Result<bool, CryptoError> {
    if signature.algorithm != curve.algorithm() {
        return Ok(false);
    }

    let curve_name = String::decode(reader).map_err(ProtoError::from)?;
    if EcdsaCurve::from_curve_name(&curve_name) != Some(curve) {
        return Err(CryptoError::InvalidKey("ECDSA curve name mismatch"));
    }
    let q = Vec::decode(reader).map_err(ProtoError::from)?;

    let raw: EcdsaRawSignature = {
        let mut blob = signature.blob.as_slice();
        match EcdsaRawSignature::decode(&mut blob) {
            Ok(raw) => raw,
            Err(_) => return Ok(false),
        }
    };
    let size = curve.field_size();
    let r = scalar_bytes(&raw.r, size)?;
    let s = scalar_bytes(&raw.s, size)?;

    let ok = match curve {
        EcdsaCurve::NistP256 => {
            let verifier = p256::ecdsa::VerifyingKey::from_sec1_bytes(&q)?;
            let signature = p256::ecdsa::Signature::from_scalars(
                *p256::FieldBytes::from_slice(&r),
                *p256::FieldBytes::from_slice(&s),
            )?;
            verifier.verify(data, &signature).is_ok()
        }
        EcdsaCurve::NistP384 => {
            let verifier = p384::ecdsa::VerifyingKey::from_sec1_bytes(&q)?;
            let signature = p384::ecdsa::Signature::from_scalars(
                *p384::FieldBytes::from_slice(&r),
                *p384::FieldBytes::from_slice(&s),
            )?;
            verifier.verify(data, &signature).is_ok()
        }
        EcdsaCurve::NistP521 => {
            let verifier = p521::ecdsa::VerifyingKey::from_sec1_bytes(&q)?;
            let signature = p521::ecdsa::Signature::from_scalars(
                *p521::FieldBytes::from_slice(&r),
                *p521::FieldBytes::from_slice(&s),
            )?;
            verifier.verify(data, &signature).is_ok()
        }
    };
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use p256::elliptic_curve::sec1::ToEncodedPoint;
    use testresult::TestResult;

    use super::*;
    use crate::proto::EcdsaKeypair;
    use crate::secret::SecretBuffer;

    #[test]
    fn p256_sign_verify_round_trip() -> TestResult {
        let signing = p256::ecdsa::SigningKey::from_slice(&[0x17; 32])?;
        let point = signing
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();

        let data = PrivateKeyData::Ecdsa(EcdsaKeypair {
            curve: EcdsaCurve::NistP256,
            public: point,
            private: Mpint::from_positive_bytes(&[0x17; 32])?,
        });
        let public_blob = data.public_blob()?;
        let pair = EcdsaPair::new(data)?;

        let signature = pair.sign(b"host binding", 0)?;
        assert_eq!(signature.algorithm, "ecdsa-sha2-nistp256");

        let blob = signature.to_blob()?;
        assert!(crate::crypto::verify(&public_blob, b"host binding", &blob)?);
        assert!(!crate::crypto::verify(&public_blob, b"other data", &blob)?);
        Ok(())
    }

    #[test]
    fn mismatched_signature_algorithm_is_rejected() -> TestResult {
        let signing = p256::ecdsa::SigningKey::from_slice(&[0x17; 32])?;
        let point = signing
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();

        let data = PrivateKeyData::Ecdsa(EcdsaKeypair {
            curve: EcdsaCurve::NistP256,
            public: point,
            private: Mpint::from_positive_bytes(&[0x17; 32])?,
        });
        let public_blob = data.public_blob()?;
        let pair = EcdsaPair::new(data)?;

        let mut signature = pair.sign(b"host binding", 0)?;
        signature.algorithm = "ssh-ed25519".into();
        let blob = signature.to_blob()?;
        // Unknown-to-this-key algorithm verifies false, not an error.
        assert!(!crate::crypto::verify(&public_blob, b"host binding", &blob)?);
        Ok(())
    }

    #[test]
    fn padded_scalar_reaches_field_size() -> TestResult {
        let data = EcdsaKeypair {
            curve: EcdsaCurve::NistP521,
            public: vec![0x04; 133],
            private: Mpint::from_positive_bytes(&[0x01; 60])?,
        };
        let padded: SecretBuffer = data.padded_scalar();
        assert_eq!(padded.len(), 66);
        Ok(())
    }
}
