//! Container for agent protocol extension messages.

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};

use super::unparsed::Unparsed;
use crate::proto::error::{ProtoError, ProtoResult};
use crate::proto::extension::{KeyConstraintExtension, MessageExtension};

/// A named extension with extension-defined content.
///
/// Sent as the body of an `SSH_AGENTC_EXTENSION` message, and as the body of
/// a constraint TLV with tag 255 in constrained Add-Identity messages.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Extension {
    /// Extension name, suffixed by the implementation domain
    /// (e.g. `session-bind@openssh.com`).
    pub name: String,

    /// Extension-specific content.
    pub details: Unparsed,
}

impl Extension {
    /// Build an extension message from a typed [`MessageExtension`] value.
    pub fn new_message<T>(extension: T) -> ProtoResult<Self>
    where
        T: MessageExtension + Encode,
    {
        Ok(Self {
            name: T::NAME.into(),
            details: Unparsed::new(&extension)?,
        })
    }

    /// Parse the payload as a typed [`MessageExtension`].
    ///
    /// Returns `None` when the name does not match `T::NAME`.
    pub fn parse_message<T>(&self) -> std::result::Result<Option<T>, <T as Decode>::Error>
    where
        T: MessageExtension + Decode,
    {
        if T::NAME == self.name {
            Ok(Some(self.details.parse::<T>()?))
        } else {
            Ok(None)
        }
    }

    /// Build a key-constraint extension from a typed
    /// [`KeyConstraintExtension`] value.
    pub fn new_key_constraint<T>(extension: T) -> ProtoResult<Self>
    where
        T: KeyConstraintExtension + Encode,
    {
        Ok(Self {
            name: T::NAME.into(),
            details: Unparsed::new(&extension)?,
        })
    }

    /// Parse the payload as a typed [`KeyConstraintExtension`].
    ///
    /// Returns `None` when the name does not match `T::NAME`.
    pub fn parse_key_constraint<T>(&self) -> std::result::Result<Option<T>, <T as Decode>::Error>
    where
        T: KeyConstraintExtension + Decode,
    {
        if T::NAME == self.name {
            Ok(Some(self.details.parse::<T>()?))
        } else {
            Ok(None)
        }
    }
}

impl Decode for Extension {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let name = String::decode(reader)?;
        let mut details = vec![0; reader.remaining_len()];
        reader.read(&mut details)?;
        Ok(Self {
            name,
            details: Unparsed::from(details),
        })
    }
}

impl Encode for Extension {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [self.name.encoded_len()?, self.details.encoded_len()?].checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.name.encode(writer)?;
        self.details.encode(writer)?;
        Ok(())
    }
}
