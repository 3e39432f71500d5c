//! Generic container for extension-specific content.

use ssh_encoding::{Decode, Encode, Writer};

/// Raw bytes of an extension payload whose structure is extension-defined.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Unparsed(Vec<u8>);

impl Unparsed {
    /// Decode the raw bytes as an SSH structure.
    pub fn parse<T>(&self) -> std::result::Result<T, <T as Decode>::Error>
    where
        T: Decode,
    {
        let mut v = &self.0[..];
        T::decode(&mut v)
    }

    /// Borrow the raw content.
    pub fn as_raw(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Build an [`Unparsed`] payload by encoding a value.
    pub fn new<T>(value: &T) -> ssh_encoding::Result<Self>
    where
        T: Encode,
    {
        let mut buffer: Vec<u8> = vec![];
        value.encode(&mut buffer)?;
        Ok(Self(buffer))
    }
}

impl From<Vec<u8>> for Unparsed {
    fn from(value: Vec<u8>) -> Self {
        Self(value)
    }
}

impl Encode for Unparsed {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        Ok(self.0.len())
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        // No length prefix of its own: the layout of extension content is
        // defined by the extension that owns it.
        writer.write(&self.0[..])?;
        Ok(())
    }
}
