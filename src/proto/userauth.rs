//! Hostbound `userauth-request` parsing.
//!
//! When a key carries destination constraints, the data an SSH client asks
//! the agent to sign must be a `publickey-hostbound-v00@openssh.com`
//! userauth request; the session extracts the username and session
//! identifier from it to gate the signature.

use ssh_encoding::{Decode, Reader};

use super::error::{ProtoError, ProtoResult};

const SSH_MSG_USERAUTH_REQUEST: u8 = 50;

/// Parsed hostbound userauth request.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct UserAuthRequest {
    /// Session identifier derived from the key exchange.
    pub session_id: Vec<u8>,
    /// User the client wants to authenticate as.
    pub username: String,
    /// Algorithm name of the authenticating public key.
    pub key_type: String,
    /// Public key the client is authenticating with.
    pub public_key: Vec<u8>,
    /// Host key of the server the client is talking to.
    pub server_host_key: Vec<u8>,
}

impl Decode for UserAuthRequest {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let session_id = Vec::decode(reader)?;
        if session_id.is_empty() {
            return Err(ProtoError::InvalidUserAuth("empty session ID"));
        }

        if u8::decode(reader)? != SSH_MSG_USERAUTH_REQUEST {
            return Err(ProtoError::InvalidUserAuth("not a userauth request"));
        }

        let username = String::decode(reader)?;
        let service = String::decode(reader)?;
        let method = String::decode(reader)?;
        let has_signature = u8::decode(reader)? != 0;
        if service != "ssh-connection"
            || method != "publickey-hostbound-v00@openssh.com"
            || !has_signature
        {
            return Err(ProtoError::InvalidUserAuth(
                "unsupported service/method/signature",
            ));
        }

        let key_type = String::decode(reader)?;
        let public_key = Vec::decode(reader)?;
        let server_host_key = Vec::decode(reader)?;

        Ok(Self {
            session_id,
            username,
            key_type,
            public_key,
            server_host_key,
        })
    }
}

#[cfg(test)]
mod tests {
    use ssh_encoding::Encode;
    use testresult::TestResult;

    use super::*;

    pub(crate) fn encode_userauth(
        session_id: &[u8],
        username: &str,
        method: &str,
    ) -> Vec<u8> {
        let mut data = Vec::new();
        session_id.encode(&mut data).unwrap();
        50u8.encode(&mut data).unwrap();
        username.encode(&mut data).unwrap();
        "ssh-connection".encode(&mut data).unwrap();
        method.encode(&mut data).unwrap();
        1u8.encode(&mut data).unwrap();
        "ssh-ed25519".encode(&mut data).unwrap();
        [0x01u8; 32].as_slice().encode(&mut data).unwrap();
        [0x02u8; 51].as_slice().encode(&mut data).unwrap();
        data
    }

    #[test]
    fn parses_hostbound_request() -> TestResult {
        let data = encode_userauth(
            &[0x10, 0x20, 0x30],
            "bob",
            "publickey-hostbound-v00@openssh.com",
        );
        let mut reader = &data[..];
        let request = UserAuthRequest::decode(&mut reader)?;
        assert_eq!(request.session_id, vec![0x10, 0x20, 0x30]);
        assert_eq!(request.username, "bob");
        assert_eq!(request.key_type, "ssh-ed25519");
        Ok(())
    }

    #[test]
    fn rejects_plain_publickey_method() {
        let data = encode_userauth(&[0x10], "bob", "publickey");
        let mut reader = &data[..];
        assert!(UserAuthRequest::decode(&mut reader).is_err());
    }

    #[test]
    fn rejects_empty_session_id() {
        let data = encode_userauth(&[], "bob", "publickey-hostbound-v00@openssh.com");
        let mut reader = &data[..];
        assert!(UserAuthRequest::decode(&mut reader).is_err());
    }
}
