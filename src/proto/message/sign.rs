//! Signature request with data to be signed with a key in the agent.

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};

use crate::proto::error::{ProtoError, ProtoResult};

/// Body of an `SSH_AGENTC_SIGN_REQUEST` message.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SignRequest {
    /// Public key blob addressing the signing key.
    pub pubkey: Vec<u8>,

    /// Data to be signed.
    pub data: Vec<u8>,

    /// Signature flags; see
    /// [`SIG_FLAG_RSA_SHA2_256`](crate::proto::SIG_FLAG_RSA_SHA2_256) and
    /// [`SIG_FLAG_RSA_SHA2_512`](crate::proto::SIG_FLAG_RSA_SHA2_512).
    pub flags: u32,
}

impl Decode for SignRequest {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let pubkey = Vec::decode(reader)?;
        let data = Vec::decode(reader)?;
        let flags = u32::decode(reader)?;

        Ok(Self {
            pubkey,
            data,
            flags,
        })
    }
}

impl Encode for SignRequest {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [
            self.pubkey.encoded_len()?,
            self.data.encoded_len()?,
            self.flags.encoded_len()?,
        ]
        .checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.pubkey.encode(writer)?;
        self.data.encode(writer)?;
        self.flags.encode(writer)?;
        Ok(())
    }
}
