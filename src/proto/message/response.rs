//! Agent protocol response messages.

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};

use super::{Extension, Identity};
use crate::proto::error::{ProtoError, ProtoResult};
use crate::proto::signature::Signature;

/// Messages sent from the agent *to* a client, one per request.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Response {
    /// Generic agent failure.
    Failure,

    /// Generic agent success.
    Success,

    /// The identities held by the agent and visible to the session.
    IdentitiesAnswer(Vec<Identity>),

    /// A signature produced for a sign request.
    SignResponse(Signature),

    /// Generic extension failure.
    ExtensionFailure,

    /// Extension-defined response content.
    ExtensionResponse(Extension),
}

impl Response {
    /// The wire identifier of this message type.
    pub fn message_id(&self) -> u8 {
        match self {
            Self::Failure => 5,
            Self::Success => 6,
            Self::IdentitiesAnswer(_) => 12,
            Self::SignResponse(_) => 14,
            Self::ExtensionFailure => 28,
            Self::ExtensionResponse(_) => 29,
        }
    }
}

impl Decode for Response {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let message_type = u8::decode(reader)?;

        match message_type {
            5 => Ok(Self::Failure),
            6 => Ok(Self::Success),
            12 => Identity::decode_vec(reader).map(Self::IdentitiesAnswer),
            14 => Ok(reader
                .read_prefixed(|reader| Signature::decode(reader).map(Self::SignResponse))?),
            28 => Ok(Self::ExtensionFailure),
            29 => Extension::decode(reader).map(Self::ExtensionResponse),
            command => Err(ProtoError::UnsupportedCommand { command }),
        }
    }
}

impl Encode for Response {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        let message_id_len = 1;
        let payload_len = match self {
            Self::Failure => 0,
            Self::Success => 0,
            Self::IdentitiesAnswer(ids) => {
                let mut lengths = Vec::with_capacity(1 + ids.len());
                // Entry count prefix.
                lengths.push(4);

                for id in ids {
                    lengths.push(id.encoded_len()?);
                }

                lengths.checked_sum()?
            }
            Self::SignResponse(signature) => signature.encoded_len_prefixed()?,
            Self::ExtensionFailure => 0,
            Self::ExtensionResponse(extension) => extension.encoded_len()?,
        };

        [message_id_len, payload_len].checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.message_id().encode(writer)?;

        match self {
            Self::Failure => {}
            Self::Success => {}
            Self::IdentitiesAnswer(ids) => {
                (ids.len() as u32).encode(writer)?;
                for id in ids {
                    id.encode(writer)?;
                }
            }
            Self::SignResponse(signature) => signature.encode_prefixed(writer)?,
            Self::ExtensionFailure => {}
            Self::ExtensionResponse(extension) => extension.encode(writer)?,
        };

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn identities_answer_round_trip() -> TestResult {
        let response = Response::IdentitiesAnswer(vec![
            Identity {
                pubkey: vec![1, 2, 3],
                comment: "alpha".into(),
            },
            Identity {
                pubkey: vec![4, 5],
                comment: "beta".into(),
            },
        ]);

        let mut wire = Vec::new();
        response.encode(&mut wire)?;
        assert_eq!(wire.len(), response.encoded_len()?);

        let mut reader = &wire[..];
        assert_eq!(Response::decode(&mut reader)?, response);
        Ok(())
    }

    #[test]
    fn sign_response_is_doubly_framed() -> TestResult {
        let response = Response::SignResponse(Signature {
            algorithm: "ssh-ed25519".into(),
            blob: vec![0xcd; 64],
        });

        let mut wire = Vec::new();
        response.encode(&mut wire)?;
        // type byte, outer blob length, alg frame, sig frame
        assert_eq!(wire.len(), 1 + 4 + (4 + 11) + (4 + 64));

        let mut reader = &wire[..];
        assert_eq!(Response::decode(&mut reader)?, response);
        Ok(())
    }
}
