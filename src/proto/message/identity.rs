//! Data returned to the client when listing keys.

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};

use crate::proto::error::{ProtoError, ProtoResult};

/// One entry of an identities-answer: a public key blob and its comment.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Identity {
    /// Canonical public-key wire blob.
    pub pubkey: Vec<u8>,

    /// Human-readable comment.
    pub comment: String,
}

impl Identity {
    pub(crate) fn decode_vec(reader: &mut impl Reader) -> ProtoResult<Vec<Self>> {
        let len = u32::decode(reader)?;
        let mut identities = vec![];

        for _ in 0..len {
            identities.push(Self::decode(reader)?);
        }

        Ok(identities)
    }
}

impl Decode for Identity {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let pubkey = Vec::decode(reader)?;
        let comment = String::decode(reader)?;

        Ok(Self { pubkey, comment })
    }
}

impl Encode for Identity {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [self.pubkey.encoded_len()?, self.comment.encoded_len()?].checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.pubkey.encode(writer)?;
        self.comment.encode(writer)?;
        Ok(())
    }
}
