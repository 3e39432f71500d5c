//! Adding and removing keys, with or without constraints.

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};

use super::extension::Extension;
use super::unparsed::Unparsed;
use crate::proto::error::{ProtoError, ProtoResult};
use crate::proto::privatekey::PrivateKeyData;

/// A private key with its comment, as carried by Add-Identity.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Credential {
    /// Decoded private key material.
    pub privkey: PrivateKeyData,

    /// Human-readable comment.
    pub comment: String,
}

impl Decode for Credential {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let key_type = String::decode(reader)?;
        let privkey = PrivateKeyData::decode_as(reader, &key_type)?;
        let comment = String::decode(reader)?;

        Ok(Self { privkey, comment })
    }
}

impl Encode for Credential {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [
            self.privkey.algorithm().encoded_len()?,
            self.privkey.encoded_len()?,
            self.comment.encoded_len()?,
        ]
        .checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.privkey.algorithm().encode(writer)?;
        self.privkey.encode(writer)?;
        self.comment.encode(writer)?;
        Ok(())
    }
}

/// Body of an `SSH_AGENTC_ADD_IDENTITY` message.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AddIdentity {
    /// The credential to add.
    pub credential: Credential,
}

impl Decode for AddIdentity {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let credential = Credential::decode(reader)?;
        Ok(Self { credential })
    }
}

impl Encode for AddIdentity {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        self.credential.encoded_len()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.credential.encode(writer)
    }
}

/// A constraint limiting how and where a key may be used.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum KeyConstraint {
    /// Delete the key after the given number of seconds.
    Lifetime(u32),

    /// Require explicit user confirmation for each signature.
    Confirm,

    /// A named constraint extension
    /// (e.g. `restrict-destination-v00@openssh.com`).
    Extension(Extension),
}

impl Decode for KeyConstraint {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let constraint_type = u8::decode(reader)?;
        Ok(match constraint_type {
            1 => KeyConstraint::Lifetime(u32::decode(reader)?),
            2 => KeyConstraint::Confirm,
            255 => {
                let name = String::decode(reader)?;
                let details: Vec<u8> = Vec::decode(reader)?;
                KeyConstraint::Extension(Extension {
                    name,
                    details: Unparsed::from(details),
                })
            }
            tag => return Err(ProtoError::UnknownConstraint { tag }),
        })
    }
}

impl Encode for KeyConstraint {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        let tag_len = 1usize;

        match self {
            Self::Lifetime(lifetime) => [tag_len, lifetime.encoded_len()?].checked_sum(),
            Self::Confirm => Ok(tag_len),
            Self::Extension(extension) => [
                tag_len,
                extension.name.encoded_len()?,
                extension.details.encoded_len_prefixed()?,
            ]
            .checked_sum(),
        }
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        match self {
            Self::Lifetime(lifetime) => {
                1u8.encode(writer)?;
                lifetime.encode(writer)
            }
            Self::Confirm => 2u8.encode(writer),
            Self::Extension(extension) => {
                255u8.encode(writer)?;
                extension.name.encode(writer)?;
                extension.details.encode_prefixed(writer)
            }
        }
    }
}

/// Body of an `SSH_AGENTC_ADD_ID_CONSTRAINED` message: a credential followed
/// by constraint TLVs until end of payload.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AddIdentityConstrained {
    /// The credential to add.
    pub identity: AddIdentity,

    /// Constraints placed on it.
    pub constraints: Vec<KeyConstraint>,
}

impl Decode for AddIdentityConstrained {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let identity = AddIdentity::decode(reader)?;
        let mut constraints = vec![];

        while !reader.is_finished() {
            constraints.push(KeyConstraint::decode(reader)?);
        }

        Ok(Self {
            identity,
            constraints,
        })
    }
}

impl Encode for AddIdentityConstrained {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        self.constraints
            .iter()
            .try_fold(self.identity.encoded_len()?, |acc, constraint| {
                let constraint_len = constraint.encoded_len()?;
                usize::checked_add(acc, constraint_len).ok_or(ssh_encoding::Error::Length)
            })
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.identity.encode(writer)?;
        for constraint in &self.constraints {
            constraint.encode(writer)?;
        }
        Ok(())
    }
}

/// Body of an `SSH_AGENTC_REMOVE_IDENTITY` message.
///
/// The public blob is the addressing key: removal matches byte-for-byte.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RemoveIdentity {
    /// Public key blob of the identity to remove.
    pub pubkey: Vec<u8>,
}

impl Decode for RemoveIdentity {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let pubkey = Vec::decode(reader)?;
        Ok(Self { pubkey })
    }
}

impl Encode for RemoveIdentity {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        self.pubkey.encoded_len()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.pubkey.encode(writer)
    }
}

/// Pointer to a key on a hardware token.
///
/// Recognized so the message parses, but this agent answers smartcard
/// requests with FAILURE.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SmartcardKey {
    /// Opaque token identifier.
    pub id: String,

    /// Optional PIN.
    pub pin: String,
}

impl Decode for SmartcardKey {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let id = String::decode(reader)?;
        let pin = String::decode(reader)?;
        Ok(Self { id, pin })
    }
}

impl Encode for SmartcardKey {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [self.id.encoded_len()?, self.pin.encoded_len()?].checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.id.encode(writer)?;
        self.pin.encode(writer)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;
    use crate::proto::privatekey::{Ed25519Keypair, ALG_ED25519};
    use crate::secret::SecretBuffer;

    fn demo_credential() -> Credential {
        Credential {
            privkey: PrivateKeyData::Ed25519(Ed25519Keypair {
                public: vec![0x01; 32],
                private: SecretBuffer::from_vec(vec![0x02; 64]),
            }),
            comment: "alpha".into(),
        }
    }

    #[test]
    fn add_identity_round_trip() -> TestResult {
        let msg = AddIdentity {
            credential: demo_credential(),
        };
        let mut wire = Vec::new();
        msg.encode(&mut wire)?;
        assert_eq!(wire.len(), msg.encoded_len()?);

        let mut reader = &wire[..];
        assert_eq!(AddIdentity::decode(&mut reader)?, msg);
        Ok(())
    }

    #[test]
    fn constrained_add_keeps_tlv_order() -> TestResult {
        let msg = AddIdentityConstrained {
            identity: AddIdentity {
                credential: demo_credential(),
            },
            constraints: vec![KeyConstraint::Confirm, KeyConstraint::Lifetime(120)],
        };
        let mut wire = Vec::new();
        msg.encode(&mut wire)?;

        let mut reader = &wire[..];
        let decoded = AddIdentityConstrained::decode(&mut reader)?;
        assert_eq!(decoded.constraints, msg.constraints);
        assert_eq!(decoded.identity.credential.privkey.algorithm(), ALG_ED25519);
        Ok(())
    }

    #[test]
    fn unknown_constraint_tag_fails_the_message() -> TestResult {
        let mut wire = Vec::new();
        AddIdentity {
            credential: demo_credential(),
        }
        .encode(&mut wire)?;
        3u8.encode(&mut wire)?;

        let mut reader = &wire[..];
        assert!(matches!(
            AddIdentityConstrained::decode(&mut reader),
            Err(ProtoError::UnknownConstraint { tag: 3 })
        ));
        Ok(())
    }
}
