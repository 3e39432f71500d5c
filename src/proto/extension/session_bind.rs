//! `session-bind@openssh.com` message extension.

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};

use super::MessageExtension;
use crate::proto::error::{ProtoError, ProtoResult};

/// Binds an agent connection to a particular SSH session.
///
/// The host key and session identifier are kept as raw wire blobs: session
/// bindings are compared byte-for-byte against destination-constraint keys,
/// so no canonicalizing re-encode must happen here. The signature must
/// verify over `session_id` under `host_key` before a binding is accepted;
/// the session performs that check via the crypto backend.
///
/// Described in [OpenSSH PROTOCOL.agent § 1](https://github.com/openssh/openssh-portable/blob/master/PROTOCOL.agent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionBind {
    /// Server host public key, as a canonical public wire blob.
    pub host_key: Vec<u8>,

    /// Hash derived from the initial key exchange.
    pub session_id: Vec<u8>,

    /// Server's signature of the session identifier using the host key,
    /// SSH-framed (`string algorithm || blob signature`).
    pub signature: Vec<u8>,

    /// Whether this binding is for forwarding rather than authentication.
    pub is_forwarding: bool,
}

impl Decode for SessionBind {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let host_key = Vec::decode(reader)?;
        let session_id = Vec::decode(reader)?;
        let signature = Vec::decode(reader)?;
        Ok(Self {
            host_key,
            session_id,
            signature,
            is_forwarding: u8::decode(reader)? != 0,
        })
    }
}

impl Encode for SessionBind {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [
            self.host_key.encoded_len()?,
            self.session_id.encoded_len()?,
            self.signature.encoded_len()?,
            1usize,
        ]
        .checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.host_key.encode(writer)?;
        self.session_id.encode(writer)?;
        self.signature.encode(writer)?;
        u8::from(self.is_forwarding).encode(writer)?;
        Ok(())
    }
}

impl MessageExtension for SessionBind {
    const NAME: &'static str = "session-bind@openssh.com";
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn parse_bind() -> TestResult {
        // Captured from an OpenSSH client binding an ed25519 host key.
        let buffer: &[u8] = &[
            0, 0, 0, 51, 0, 0, 0, 11, 115, 115, 104, 45, 101, 100, 50, 53, 53, 49, 57, 0, 0, 0, 32,
            177, 185, 198, 92, 165, 45, 127, 95, 202, 195, 226, 63, 6, 115, 10, 104, 18, 137, 172,
            240, 153, 154, 174, 74, 83, 7, 1, 204, 14, 177, 153, 40, 0, 0, 0, 32, 138, 165, 196,
            144, 149, 107, 183, 188, 222, 182, 34, 173, 59, 118, 9, 35, 186, 147, 114, 114, 50,
            106, 41, 182, 196, 119, 226, 82, 233, 148, 236, 135, 0, 0, 0, 83, 0, 0, 0, 11, 115,
            115, 104, 45, 101, 100, 50, 53, 53, 49, 57, 0, 0, 0, 64, 95, 212, 52, 189, 8, 162, 17,
            3, 15, 218, 2, 4, 136, 7, 47, 57, 121, 6, 194, 165, 221, 27, 175, 241, 6, 57, 84, 141,
            77, 55, 235, 9, 77, 160, 32, 76, 11, 227, 240, 235, 122, 178, 80, 133, 183, 91, 89, 89,
            142, 115, 145, 15, 78, 112, 139, 28, 201, 8, 197, 222, 117, 141, 88, 5, 0,
        ];
        let mut reader = buffer;
        let bind = SessionBind::decode(&mut reader)?;

        assert!(!bind.is_forwarding);
        assert_eq!(bind.host_key.len(), 51);
        assert_eq!(bind.session_id.len(), 32);
        assert!(bind.host_key.starts_with(&[0, 0, 0, 11]));

        let mut out = Vec::new();
        bind.encode(&mut out)?;
        assert_eq!(out, buffer);
        assert_eq!(bind.encoded_len()?, buffer.len());
        Ok(())
    }
}
