//! Typed wire forms of agent private keys.
//!
//! An Add-Identity payload carries `string key_type` followed by the
//! key-type-specific private fields. [`PrivateKeyData`] is the decoded form:
//! a tagged variant per supported algorithm, separable from the opaque
//! signing handle the crypto backend builds from it
//! ([`crate::crypto::instantiate`]).

use core::fmt;

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};
use ssh_key::Mpint;
use subtle::{Choice, ConstantTimeEq};

use super::error::{ProtoError, ProtoResult};
use crate::secret::SecretBuffer;

/// `ssh-ed25519` algorithm name.
pub const ALG_ED25519: &str = "ssh-ed25519";
/// `ssh-ed448` algorithm name.
pub const ALG_ED448: &str = "ssh-ed448";
/// `ssh-rsa` algorithm name.
pub const ALG_RSA: &str = "ssh-rsa";
/// `ecdsa-sha2-nistp256` algorithm name.
pub const ALG_ECDSA_P256: &str = "ecdsa-sha2-nistp256";
/// `ecdsa-sha2-nistp384` algorithm name.
pub const ALG_ECDSA_P384: &str = "ecdsa-sha2-nistp384";
/// `ecdsa-sha2-nistp521` algorithm name.
pub const ALG_ECDSA_P521: &str = "ecdsa-sha2-nistp521";

/// Ed25519 key pair: `blob public(32) || blob private(64)`.
///
/// OpenSSH is a little inconsistent here: Ed25519 is the only algorithm
/// whose private half always encodes the full key pair.
#[derive(Clone)]
pub struct Ed25519Keypair {
    /// Public point.
    pub public: Vec<u8>,
    /// Private half (seed followed by the public point).
    pub private: SecretBuffer,
}

impl Decode for Ed25519Keypair {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let public = Vec::decode(reader)?;
        let private = SecretBuffer::from_vec(Vec::decode(reader)?);
        Ok(Self { public, private })
    }
}

impl fmt::Debug for Ed25519Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519Keypair").finish_non_exhaustive()
    }
}

impl Encode for Ed25519Keypair {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [
            self.public.encoded_len()?,
            self.private.as_slice().encoded_len()?,
        ]
        .checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.public.encode(writer)?;
        self.private.as_slice().encode(writer)?;
        Ok(())
    }
}

/// Ed448 key pair: `blob public(57) || blob private(57)`.
#[derive(Clone)]
pub struct Ed448Keypair {
    /// Public point.
    pub public: Vec<u8>,
    /// Private scalar.
    pub private: SecretBuffer,
}

impl Decode for Ed448Keypair {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let public = Vec::decode(reader)?;
        let private = SecretBuffer::from_vec(Vec::decode(reader)?);
        Ok(Self { public, private })
    }
}

impl fmt::Debug for Ed448Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed448Keypair").finish_non_exhaustive()
    }
}

impl Encode for Ed448Keypair {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [
            self.public.encoded_len()?,
            self.private.as_slice().encoded_len()?,
        ]
        .checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.public.encode(writer)?;
        self.private.as_slice().encode(writer)?;
        Ok(())
    }
}

/// RSA key pair: `mpint n || mpint e || mpint d || blob iqmp || mpint p || mpint q`.
#[derive(Clone)]
pub struct RsaKeypair {
    /// Modulus.
    pub n: Mpint,
    /// Public exponent.
    pub e: Mpint,
    /// Private exponent.
    pub d: Mpint,
    /// CRT coefficient, `q^-1 mod p`.
    pub iqmp: Mpint,
    /// First prime factor.
    pub p: Mpint,
    /// Second prime factor.
    pub q: Mpint,
}

impl Decode for RsaKeypair {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let n = Mpint::decode(reader)?;
        let e = Mpint::decode(reader)?;
        let d = Mpint::decode(reader)?;
        let iqmp = Mpint::decode(reader)?;
        let p = Mpint::decode(reader)?;
        let q = Mpint::decode(reader)?;
        Ok(Self {
            n,
            e,
            d,
            iqmp,
            p,
            q,
        })
    }
}

impl fmt::Debug for RsaKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaKeypair").finish_non_exhaustive()
    }
}

impl Encode for RsaKeypair {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [
            self.n.encoded_len()?,
            self.e.encoded_len()?,
            self.d.encoded_len()?,
            self.iqmp.encoded_len()?,
            self.p.encoded_len()?,
            self.q.encoded_len()?,
        ]
        .checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.n.encode(writer)?;
        self.e.encode(writer)?;
        self.d.encode(writer)?;
        self.iqmp.encode(writer)?;
        self.p.encode(writer)?;
        self.q.encode(writer)?;
        Ok(())
    }
}

/// NIST curve identifier carried inside ECDSA keys and signatures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EcdsaCurve {
    /// NIST P-256.
    NistP256,
    /// NIST P-384.
    NistP384,
    /// NIST P-521.
    NistP521,
}

impl EcdsaCurve {
    /// Curve name as it appears on the wire (`nistp256` etc).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NistP256 => "nistp256",
            Self::NistP384 => "nistp384",
            Self::NistP521 => "nistp521",
        }
    }

    /// Full algorithm name (`ecdsa-sha2-nistp256` etc).
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::NistP256 => ALG_ECDSA_P256,
            Self::NistP384 => ALG_ECDSA_P384,
            Self::NistP521 => ALG_ECDSA_P521,
        }
    }

    /// Byte length of a field element; private scalars are left-padded with
    /// zeros to this length before use.
    pub fn field_size(&self) -> usize {
        match self {
            Self::NistP256 => 32,
            Self::NistP384 => 48,
            Self::NistP521 => 66,
        }
    }

    /// Parse a wire curve name.
    pub fn from_curve_name(name: &str) -> Option<Self> {
        match name {
            "nistp256" => Some(Self::NistP256),
            "nistp384" => Some(Self::NistP384),
            "nistp521" => Some(Self::NistP521),
            _ => None,
        }
    }

    /// Parse a full algorithm name.
    pub fn from_algorithm(algorithm: &str) -> Option<Self> {
        match algorithm {
            ALG_ECDSA_P256 => Some(Self::NistP256),
            ALG_ECDSA_P384 => Some(Self::NistP384),
            ALG_ECDSA_P521 => Some(Self::NistP521),
            _ => None,
        }
    }
}

/// ECDSA key pair: `string curve || blob Q || mpint d`.
#[derive(Clone)]
pub struct EcdsaKeypair {
    /// Curve this key lives on.
    pub curve: EcdsaCurve,
    /// Public point in SEC1 uncompressed form.
    pub public: Vec<u8>,
    /// Private scalar.
    pub private: Mpint,
}

impl EcdsaKeypair {
    fn decode_as(reader: &mut impl Reader, curve: EcdsaCurve) -> ProtoResult<Self> {
        let curve_name = String::decode(reader)?;
        if EcdsaCurve::from_curve_name(&curve_name) != Some(curve) {
            return Err(ProtoError::UnknownAlgorithm {
                algorithm: curve_name,
            });
        }
        let public = Vec::decode(reader)?;
        let private = Mpint::decode(reader)?;
        Ok(Self {
            curve,
            public,
            private,
        })
    }

    /// Private scalar left-padded with zeros to the curve's field size.
    pub fn padded_scalar(&self) -> SecretBuffer {
        let raw = self.private.as_positive_bytes().unwrap_or(&[]);
        let size = self.curve.field_size();
        let mut out = vec![0u8; size.saturating_sub(raw.len())];
        out.extend_from_slice(raw);
        SecretBuffer::from_vec(out)
    }
}

impl fmt::Debug for EcdsaKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EcdsaKeypair")
            .field("curve", &self.curve.as_str())
            .finish_non_exhaustive()
    }
}

impl Encode for EcdsaKeypair {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [
            self.curve.as_str().encoded_len()?,
            self.public.encoded_len()?,
            self.private.encoded_len()?,
        ]
        .checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.curve.as_str().encode(writer)?;
        self.public.encode(writer)?;
        self.private.encode(writer)?;
        Ok(())
    }
}

/// Decoded private-key payload of an Add-Identity message.
#[derive(Clone)]
pub enum PrivateKeyData {
    /// Ed25519 key pair.
    Ed25519(Ed25519Keypair),
    /// Ed448 key pair.
    Ed448(Ed448Keypair),
    /// RSA key pair.
    Rsa(RsaKeypair),
    /// ECDSA key pair on one of the NIST curves.
    Ecdsa(EcdsaKeypair),
}

impl PrivateKeyData {
    /// Decode the private fields for a previously-read algorithm name.
    pub fn decode_as(reader: &mut impl Reader, algorithm: &str) -> ProtoResult<Self> {
        match algorithm {
            ALG_ED25519 => Ed25519Keypair::decode(reader).map(Self::Ed25519),
            ALG_ED448 => Ed448Keypair::decode(reader).map(Self::Ed448),
            ALG_RSA => RsaKeypair::decode(reader).map(Self::Rsa),
            _ => match EcdsaCurve::from_algorithm(algorithm) {
                Some(curve) => EcdsaKeypair::decode_as(reader, curve).map(Self::Ecdsa),
                None => Err(ProtoError::UnknownAlgorithm {
                    algorithm: algorithm.into(),
                }),
            },
        }
    }

    /// Algorithm name of this key.
    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::Ed25519(_) => ALG_ED25519,
            Self::Ed448(_) => ALG_ED448,
            Self::Rsa(_) => ALG_RSA,
            Self::Ecdsa(key) => key.curve.algorithm(),
        }
    }

    /// Canonical public wire blob (`string key_type || public fields`).
    ///
    /// Derived without instantiating a signing handle; this is the stable
    /// addressing key in the agent store and the fingerprint input.
    pub fn public_blob(&self) -> ProtoResult<Vec<u8>> {
        let mut blob = Vec::new();
        match self {
            Self::Ed25519(key) => {
                ALG_ED25519.encode(&mut blob)?;
                key.public.encode(&mut blob)?;
            }
            Self::Ed448(key) => {
                ALG_ED448.encode(&mut blob)?;
                key.public.encode(&mut blob)?;
            }
            Self::Rsa(key) => {
                ALG_RSA.encode(&mut blob)?;
                key.e.encode(&mut blob)?;
                key.n.encode(&mut blob)?;
            }
            Self::Ecdsa(key) => {
                key.curve.algorithm().encode(&mut blob)?;
                key.curve.as_str().encode(&mut blob)?;
                key.public.encode(&mut blob)?;
            }
        }
        Ok(blob)
    }
}

impl Encode for PrivateKeyData {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        match self {
            Self::Ed25519(key) => key.encoded_len(),
            Self::Ed448(key) => key.encoded_len(),
            Self::Rsa(key) => key.encoded_len(),
            Self::Ecdsa(key) => key.encoded_len(),
        }
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        match self {
            Self::Ed25519(key) => key.encode(writer),
            Self::Ed448(key) => key.encode(writer),
            Self::Rsa(key) => key.encode(writer),
            Self::Ecdsa(key) => key.encode(writer),
        }
    }
}

impl fmt::Debug for PrivateKeyData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ed25519(_) => write!(f, "PrivateKeyData::Ed25519"),
            Self::Ed448(_) => write!(f, "PrivateKeyData::Ed448"),
            Self::Rsa(_) => write!(f, "PrivateKeyData::Rsa"),
            Self::Ecdsa(_) => write!(f, "PrivateKeyData::Ecdsa"),
        }
    }
}

impl ConstantTimeEq for PrivateKeyData {
    fn ct_eq(&self, other: &Self) -> Choice {
        // Constant-time with respect to key data, not algorithm selection.
        match (self, other) {
            (Self::Ed25519(a), Self::Ed25519(b)) => {
                a.private.as_slice().ct_eq(b.private.as_slice())
            }
            (Self::Ed448(a), Self::Ed448(b)) => a.private.as_slice().ct_eq(b.private.as_slice()),
            (Self::Rsa(a), Self::Rsa(b)) => a.d.as_bytes().ct_eq(b.d.as_bytes())
                & a.p.as_bytes().ct_eq(b.p.as_bytes())
                & a.q.as_bytes().ct_eq(b.q.as_bytes()),
            (Self::Ecdsa(a), Self::Ecdsa(b)) => {
                a.private.as_bytes().ct_eq(b.private.as_bytes())
            }
            _ => Choice::from(0),
        }
    }
}

impl PartialEq for PrivateKeyData {
    fn eq(&self, other: &Self) -> bool {
        self.ct_eq(other).into()
    }
}

impl Eq for PrivateKeyData {}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn ed25519_fixture() -> Vec<u8> {
        let mut wire = Vec::new();
        vec![0x01u8; 32].encode(&mut wire).unwrap();
        vec![0x02u8; 64].encode(&mut wire).unwrap();
        wire
    }

    #[test]
    fn decode_ed25519_layout() -> TestResult {
        let wire = ed25519_fixture();
        let mut reader = &wire[..];
        let key = PrivateKeyData::decode_as(&mut reader, ALG_ED25519)?;

        assert_eq!(key.algorithm(), ALG_ED25519);
        let PrivateKeyData::Ed25519(pair) = &key else {
            panic!("wrong variant");
        };
        assert_eq!(pair.public, vec![0x01; 32]);
        assert_eq!(pair.private.as_slice(), &[0x02; 64][..]);

        // Canonical public blob: string "ssh-ed25519" || blob public.
        let mut expected = Vec::new();
        "ssh-ed25519".encode(&mut expected)?;
        vec![0x01u8; 32].encode(&mut expected)?;
        assert_eq!(key.public_blob()?, expected);
        Ok(())
    }

    #[test]
    fn reencode_is_byte_identical() -> TestResult {
        let wire = ed25519_fixture();
        let mut reader = &wire[..];
        let key = PrivateKeyData::decode_as(&mut reader, ALG_ED25519)?;

        let mut out = Vec::new();
        key.encode(&mut out)?;
        assert_eq!(out, wire);
        assert_eq!(key.encoded_len()?, wire.len());
        Ok(())
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let wire = ed25519_fixture();
        let mut reader = &wire[..];
        assert!(PrivateKeyData::decode_as(&mut reader, "ssh-dss").is_err());
    }

    #[test]
    fn ecdsa_curve_mismatch_is_rejected() {
        let mut wire = Vec::new();
        "nistp384".encode(&mut wire).unwrap();
        vec![0x04u8; 97].encode(&mut wire).unwrap();
        Mpint::from_positive_bytes(&[0x11; 48]).unwrap().encode(&mut wire).unwrap();

        let mut reader = &wire[..];
        assert!(PrivateKeyData::decode_as(&mut reader, ALG_ECDSA_P256).is_err());
    }

    #[test]
    fn ecdsa_scalar_is_left_padded() -> TestResult {
        let mut wire = Vec::new();
        "nistp256".encode(&mut wire)?;
        vec![0x04u8; 65].encode(&mut wire)?;
        // 31-byte scalar must pad to 32.
        Mpint::from_positive_bytes(&[0x7f; 31])?.encode(&mut wire)?;

        let mut reader = &wire[..];
        let PrivateKeyData::Ecdsa(pair) = PrivateKeyData::decode_as(&mut reader, ALG_ECDSA_P256)?
        else {
            panic!("wrong variant");
        };
        let padded = pair.padded_scalar();
        assert_eq!(padded.len(), 32);
        assert_eq!(padded.as_slice()[0], 0x00);
        assert_eq!(padded.as_slice()[1], 0x7f);
        Ok(())
    }
}
