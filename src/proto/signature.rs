//! SSH-framed signatures and sign-request flags.

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};
use ssh_key::Mpint;

use super::error::{ProtoError, ProtoResult};

/// Sign-request flag: produce an `rsa-sha2-256` signature.
pub const SIG_FLAG_RSA_SHA2_256: u32 = 0x02;
/// Sign-request flag: produce an `rsa-sha2-512` signature.
pub const SIG_FLAG_RSA_SHA2_512: u32 = 0x04;

/// An SSH signature: `string algorithm || blob raw_signature`.
///
/// The algorithm names the signature flavor, which for RSA differs from the
/// key algorithm (`rsa-sha2-512` vs `ssh-rsa`).
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Signature {
    /// Signature algorithm name.
    pub algorithm: String,
    /// Raw signature bytes; for ECDSA this is itself an encoded
    /// [`EcdsaRawSignature`].
    pub blob: Vec<u8>,
}

impl Signature {
    /// Frame this signature as a single wire blob.
    pub fn to_blob(&self) -> ProtoResult<Vec<u8>> {
        let mut out = Vec::new();
        self.encode(&mut out)?;
        Ok(out)
    }

    /// Parse a framed signature blob.
    pub fn from_blob(blob: &[u8]) -> ProtoResult<Self> {
        let mut reader = blob;
        Self::decode(&mut reader)
    }
}

impl Decode for Signature {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let algorithm = String::decode(reader)?;
        let blob = Vec::decode(reader)?;
        Ok(Self { algorithm, blob })
    }
}

impl Encode for Signature {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [self.algorithm.encoded_len()?, self.blob.encoded_len()?].checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.algorithm.encode(writer)?;
        self.blob.encode(writer)?;
        Ok(())
    }
}

/// Inner blob of an ECDSA signature: `mpint r || mpint s`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct EcdsaRawSignature {
    /// First signature scalar.
    pub r: Mpint,
    /// Second signature scalar.
    pub s: Mpint,
}

impl Decode for EcdsaRawSignature {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let r = Mpint::decode(reader)?;
        let s = Mpint::decode(reader)?;
        Ok(Self { r, s })
    }
}

impl Encode for EcdsaRawSignature {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [self.r.encoded_len()?, self.s.encoded_len()?].checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.r.encode(writer)?;
        self.s.encode(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn signature_blob_round_trip() -> TestResult {
        let signature = Signature {
            algorithm: "ssh-ed25519".into(),
            blob: vec![0xab; 64],
        };
        let framed = signature.to_blob()?;
        assert_eq!(Signature::from_blob(&framed)?, signature);
        assert_eq!(framed.len(), signature.encoded_len()?);
        Ok(())
    }

    #[test]
    fn ecdsa_inner_round_trip() -> TestResult {
        let raw = EcdsaRawSignature {
            r: Mpint::from_positive_bytes(&[0x80; 32])?,
            s: Mpint::from_positive_bytes(&[0x01; 32])?,
        };
        let mut out = Vec::new();
        raw.encode(&mut out)?;
        // High-bit r gains a leading zero octet, s does not.
        assert_eq!(out.len(), 4 + 33 + 4 + 32);
        let mut reader = &out[..];
        assert_eq!(EcdsaRawSignature::decode(&mut reader)?, raw);
        Ok(())
    }
}
