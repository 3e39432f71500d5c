//! Agent protocol request messages.

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};

use super::{AddIdentity, AddIdentityConstrained, Extension, RemoveIdentity, SmartcardKey};
use super::sign::SignRequest;
use crate::proto::error::{ProtoError, ProtoResult};
use crate::secret::SecretBuffer;

/// Messages sent from a client *to* the agent.
///
/// Message identifiers follow
/// [draft-miller-ssh-agent-14 § 6.1](https://www.ietf.org/archive/id/draft-miller-ssh-agent-14.html#section-6.1).
#[derive(Clone, PartialEq, Debug)]
pub enum Request {
    /// Deprecated SSH1 bulk removal; treated as
    /// [`Request::RemoveAllIdentities`].
    RemoveAllRsaIdentities,

    /// Request a list of all identities held by the agent.
    RequestIdentities,

    /// Perform a private key signature operation.
    SignRequest(SignRequest),

    /// Add an identity to the agent.
    AddIdentity(AddIdentity),

    /// Remove an identity from the agent.
    RemoveIdentity(RemoveIdentity),

    /// Remove all identities from the agent.
    RemoveAllIdentities,

    /// Add an identity backed by a hardware token (answered with FAILURE).
    AddSmartcardKey(SmartcardKey),

    /// Remove a hardware-token identity (answered with FAILURE).
    RemoveSmartcardKey(SmartcardKey),

    /// Temporarily lock the agent with a passphrase.
    Lock(SecretBuffer),

    /// Unlock a locked agent with a passphrase.
    Unlock(SecretBuffer),

    /// Add an identity with usage constraints.
    AddIdConstrained(AddIdentityConstrained),

    /// Add a constrained hardware-token identity (answered with FAILURE).
    AddSmartcardKeyConstrained(SmartcardKey),

    /// A named protocol extension.
    Extension(Extension),
}

impl Request {
    /// The wire identifier of this message type.
    pub fn message_id(&self) -> u8 {
        match self {
            Self::RemoveAllRsaIdentities => 9,
            Self::RequestIdentities => 11,
            Self::SignRequest(_) => 13,
            Self::AddIdentity(_) => 17,
            Self::RemoveIdentity(_) => 18,
            Self::RemoveAllIdentities => 19,
            Self::AddSmartcardKey(_) => 20,
            Self::RemoveSmartcardKey(_) => 21,
            Self::Lock(_) => 22,
            Self::Unlock(_) => 23,
            Self::AddIdConstrained(_) => 25,
            Self::AddSmartcardKeyConstrained(_) => 26,
            Self::Extension(_) => 27,
        }
    }

    /// Human-readable message type name, for logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::RemoveAllRsaIdentities => "SSH_AGENTC_REMOVE_ALL_RSA_IDENTITIES",
            Self::RequestIdentities => "SSH_AGENTC_REQUEST_IDENTITIES",
            Self::SignRequest(_) => "SSH_AGENTC_SIGN_REQUEST",
            Self::AddIdentity(_) => "SSH_AGENTC_ADD_IDENTITY",
            Self::RemoveIdentity(_) => "SSH_AGENTC_REMOVE_IDENTITY",
            Self::RemoveAllIdentities => "SSH_AGENTC_REMOVE_ALL_IDENTITIES",
            Self::AddSmartcardKey(_) => "SSH_AGENTC_ADD_SMARTCARD_KEY",
            Self::RemoveSmartcardKey(_) => "SSH_AGENTC_REMOVE_SMARTCARD_KEY",
            Self::Lock(_) => "SSH_AGENTC_LOCK",
            Self::Unlock(_) => "SSH_AGENTC_UNLOCK",
            Self::AddIdConstrained(_) => "SSH_AGENTC_ADD_ID_CONSTRAINED",
            Self::AddSmartcardKeyConstrained(_) => "SSH_AGENTC_ADD_SMARTCARD_KEY_CONSTRAINED",
            Self::Extension(_) => "SSH_AGENTC_EXTENSION",
        }
    }
}

impl Decode for Request {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let message_type = u8::decode(reader)?;

        match message_type {
            9 => Ok(Self::RemoveAllRsaIdentities),
            11 => Ok(Self::RequestIdentities),
            13 => SignRequest::decode(reader).map(Self::SignRequest),
            17 => AddIdentity::decode(reader).map(Self::AddIdentity),
            18 => RemoveIdentity::decode(reader).map(Self::RemoveIdentity),
            19 => Ok(Self::RemoveAllIdentities),
            20 => SmartcardKey::decode(reader).map(Self::AddSmartcardKey),
            21 => SmartcardKey::decode(reader).map(Self::RemoveSmartcardKey),
            22 => Ok(Self::Lock(SecretBuffer::from_vec(Vec::decode(reader)?))),
            23 => Ok(Self::Unlock(SecretBuffer::from_vec(Vec::decode(reader)?))),
            25 => AddIdentityConstrained::decode(reader).map(Self::AddIdConstrained),
            26 => SmartcardKey::decode(reader).map(Self::AddSmartcardKeyConstrained),
            27 => Extension::decode(reader).map(Self::Extension),
            command => Err(ProtoError::UnsupportedCommand { command }),
        }
    }
}

impl Encode for Request {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        let message_id_len = 1;
        let payload_len = match self {
            Self::RemoveAllRsaIdentities => 0,
            Self::RequestIdentities => 0,
            Self::SignRequest(request) => request.encoded_len()?,
            Self::AddIdentity(identity) => identity.encoded_len()?,
            Self::RemoveIdentity(identity) => identity.encoded_len()?,
            Self::RemoveAllIdentities => 0,
            Self::AddSmartcardKey(key) => key.encoded_len()?,
            Self::RemoveSmartcardKey(key) => key.encoded_len()?,
            Self::Lock(passphrase) => passphrase.as_slice().encoded_len()?,
            Self::Unlock(passphrase) => passphrase.as_slice().encoded_len()?,
            Self::AddIdConstrained(identity) => identity.encoded_len()?,
            Self::AddSmartcardKeyConstrained(key) => key.encoded_len()?,
            Self::Extension(extension) => extension.encoded_len()?,
        };

        [message_id_len, payload_len].checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.message_id().encode(writer)?;

        match self {
            Self::RemoveAllRsaIdentities => {}
            Self::RequestIdentities => {}
            Self::SignRequest(request) => request.encode(writer)?,
            Self::AddIdentity(identity) => identity.encode(writer)?,
            Self::RemoveIdentity(identity) => identity.encode(writer)?,
            Self::RemoveAllIdentities => {}
            Self::AddSmartcardKey(key) => key.encode(writer)?,
            Self::RemoveSmartcardKey(key) => key.encode(writer)?,
            Self::Lock(passphrase) => passphrase.as_slice().encode(writer)?,
            Self::Unlock(passphrase) => passphrase.as_slice().encode(writer)?,
            Self::AddIdConstrained(identity) => identity.encode(writer)?,
            Self::AddSmartcardKeyConstrained(key) => key.encode(writer)?,
            Self::Extension(extension) => extension.encode(writer)?,
        };

        Ok(())
    }
}
