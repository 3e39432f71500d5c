//! `restrict-destination-v00@openssh.com` key constraint extension.
//!
//! A destination constraint restricts which remote host (and user) a key may
//! sign for. Each constraint is a `(from-hop, to-hop)` pair; the empty hop
//! means "any endpoint", so `ssh-add -h user@host` produces a constraint
//! with an empty `from` and a populated `to`, and `ssh-add -h "A>B"` a
//! forwarding constraint from `A` to `B`.

use ssh_encoding::{CheckedSum, Decode, Encode, Reader, Writer};
use tracing::{debug, warn};

use super::KeyConstraintExtension;
use crate::proto::error::{ProtoError, ProtoResult};

/// A host key listed in a hop descriptor.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct HopKey {
    /// Canonical public wire blob of the host key.
    pub key: Vec<u8>,

    /// Whether the key is a certification authority key.
    pub is_ca: bool,
}

/// One end of an SSH connection: `(user, hostname, keys)`.
///
/// The empty hop (`"", "", []`) reads as "any endpoint"; once any field is
/// present that reading is gone.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct HopDescriptor {
    /// User at this hop, usually only set on the `to` side.
    pub user: String,

    /// Hostname of this hop.
    pub hostname: String,

    /// Host keys identifying this hop.
    pub keys: Vec<HopKey>,
}

impl HopDescriptor {
    /// Whether this is the empty, match-anything hop.
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.hostname.is_empty() && self.keys.is_empty()
    }

    /// Whether `key` byte-for-byte equals one of this hop's non-CA keys.
    ///
    /// CA-marked entries are skipped rather than verified: a hop listing
    /// only CA keys matches nothing.
    pub fn matches_key(&self, key: &[u8]) -> bool {
        for hop_key in &self.keys {
            if hop_key.key.is_empty() {
                warn!("empty key in hop descriptor");
                return false;
            }

            if hop_key.is_ca {
                warn!("skipping CA key in hop descriptor (CA matching unsupported)");
                continue;
            }

            if hop_key.key == key {
                return true;
            }
        }
        false
    }
}

impl Decode for HopDescriptor {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let user = String::decode(reader)?;
        let hostname = String::decode(reader)?;

        let extensions: Vec<u8> = Vec::decode(reader)?;
        if !extensions.is_empty() {
            return Err(ProtoError::InvalidConstraint(
                "extensions in hop descriptor not supported",
            ));
        }

        let mut keys = vec![];
        while !reader.is_finished() {
            let key = Vec::decode(reader)?;
            let is_ca = u8::decode(reader)? != 0;
            keys.push(HopKey { key, is_ca });
        }

        Ok(Self {
            user,
            hostname,
            keys,
        })
    }
}

impl Encode for HopDescriptor {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        let mut lengths = vec![
            self.user.encoded_len()?,
            self.hostname.encoded_len()?,
            // empty extensions blob
            4,
        ];
        for key in &self.keys {
            lengths.push(key.key.encoded_len()?);
            lengths.push(1);
        }
        lengths.checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.user.encode(writer)?;
        self.hostname.encode(writer)?;
        0u32.encode(writer)?;
        for key in &self.keys {
            key.key.encode(writer)?;
            u8::from(key.is_ca).encode(writer)?;
        }
        Ok(())
    }
}

/// Hostnames and user recorded when a constraint matches, for display in
/// confirmation prompts. Cleared on every sign-request boundary.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MatchInfo {
    /// Hostname of the matching `from` hop.
    pub from: String,

    /// Hostname of the matching `to` hop.
    pub to: String,

    /// User the match was evaluated for.
    pub user: String,
}

impl MatchInfo {
    /// Reset to the empty state.
    pub fn clear(&mut self) {
        self.from.clear();
        self.to.clear();
        self.user.clear();
    }
}

/// A `(from-hop, to-hop)` destination constraint.
///
/// Structural invariants enforced at decode time:
/// - `to` must carry both a hostname and at least one key;
/// - `from.user` must be empty;
/// - `from.hostname` is empty iff `from.keys` is empty;
/// - extensions inside the constraint are rejected.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DestinationConstraint {
    /// Source hop; empty means the constraint starts at the local agent.
    pub from: HopDescriptor,

    /// Destination hop.
    pub to: HopDescriptor,
}

impl DestinationConstraint {
    /// Evaluate this constraint against a `(from_key, to_key, user)` tuple.
    ///
    /// On a match, `match_info` (when provided) receives the hop hostnames
    /// and the user.
    pub fn matches(
        &self,
        from_key: &[u8],
        to_key: &[u8],
        user: &str,
        match_info: Option<&mut MatchInfo>,
    ) -> bool {
        if from_key.is_empty() {
            if !self.from.hostname.is_empty() || !self.from.keys.is_empty() {
                return false;
            }
        } else if !self.from.matches_key(from_key) {
            return false;
        }

        if !to_key.is_empty() && !self.to.matches_key(to_key) {
            return false;
        }

        if !self.to.user.is_empty() && !user.is_empty() {
            // OpenSSH treats this as a pattern; this agent matches exactly.
            if self.to.user != user {
                return false;
            }
        }

        if let Some(info) = match_info {
            info.from = self.from.hostname.clone();
            info.to = self.to.hostname.clone();
            info.user = user.into();
        }

        debug!(to = %self.to.hostname, "constraint permits destination");
        true
    }
}

impl Decode for DestinationConstraint {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let from = reader.read_prefixed(HopDescriptor::decode)?;
        let to = reader.read_prefixed(HopDescriptor::decode)?;

        let extensions: Vec<u8> = Vec::decode(reader)?;
        if !extensions.is_empty() {
            return Err(ProtoError::InvalidConstraint(
                "extensions in destination constraint not supported",
            ));
        }

        if from.hostname.is_empty() != from.keys.is_empty() || !from.user.is_empty() {
            return Err(ProtoError::InvalidConstraint("invalid from hop"));
        }

        if to.hostname.is_empty() || to.keys.is_empty() {
            return Err(ProtoError::InvalidConstraint("invalid to hop"));
        }

        Ok(Self { from, to })
    }
}

impl Encode for DestinationConstraint {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        [
            self.from.encoded_len_prefixed()?,
            self.to.encoded_len_prefixed()?,
            // empty extensions blob
            4,
        ]
        .checked_sum()
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        self.from.encode_prefixed(writer)?;
        self.to.encode_prefixed(writer)?;
        0u32.encode(writer)?;
        Ok(())
    }
}

/// The `restrict-destination-v00@openssh.com` constraint payload: one or
/// more concatenated constraint blobs.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RestrictDestination {
    /// The destination constraints, in wire order.
    pub constraints: Vec<DestinationConstraint>,
}

impl Decode for RestrictDestination {
    type Error = ProtoError;

    fn decode(reader: &mut impl Reader) -> ProtoResult<Self> {
        let mut constraints = vec![];
        loop {
            constraints.push(reader.read_prefixed(DestinationConstraint::decode)?);
            if reader.is_finished() {
                break;
            }
        }
        Ok(Self { constraints })
    }
}

impl Encode for RestrictDestination {
    fn encoded_len(&self) -> ssh_encoding::Result<usize> {
        self.constraints
            .iter()
            .try_fold(0usize, |acc, constraint| {
                let len = constraint.encoded_len_prefixed()?;
                usize::checked_add(acc, len).ok_or(ssh_encoding::Error::Length)
            })
    }

    fn encode(&self, writer: &mut impl Writer) -> ssh_encoding::Result<()> {
        for constraint in &self.constraints {
            constraint.encode_prefixed(writer)?;
        }
        Ok(())
    }
}

impl KeyConstraintExtension for RestrictDestination {
    const NAME: &'static str = "restrict-destination-v00@openssh.com";
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use testresult::TestResult;

    use super::*;

    fn hop(hostname: &str, keys: &[(&[u8], bool)]) -> HopDescriptor {
        HopDescriptor {
            user: String::new(),
            hostname: hostname.into(),
            keys: keys
                .iter()
                .map(|(key, is_ca)| HopKey {
                    key: key.to_vec(),
                    is_ca: *is_ca,
                })
                .collect(),
        }
    }

    // `ssh-add -h github.com` payload captured from OpenSSH: empty from-hop,
    // to-hop "github.com" with an ed25519 and an RSA host key.
    #[test]
    fn parse_openssh_restriction() -> TestResult {
        let msg: &[u8] = &hex!(
            "
            0000 026f 0000 000c 0000 0000 0000 0000
            0000 0000 0000 0257 0000 0000 0000 000a
            6769 7468 7562 2e63 6f6d 0000 0000 0000
            0033 0000 000b 7373 682d 6564 3235 3531
            3900 0000 20e3 2aaa 7915 ceb9 b449 d1ba
            50ea 2a28 bb1a 6e01 f90b da24 5a2d 1d87
            697d 18a2 6500 0000 0197 0000 0007 7373
            682d 7273 6100 0000 0301 0001 0000 0181
            00a3 ee77 4dc5 0a30 81c4 278e c85c 2eba
            8f12 28a9 867b 7e55 34ef 0cfe a61c 12fd
            8f56 8d52 4638 51ed 60bf 09c6 2d59 4e84
            6798 ae76 5a32 044a ebe3 ca09 45da 0db0
            bbaa d6d6 f202 2484 beda 182b 0eaf f0b9
            e922 4ccb f042 65fc 5dd6 75b3 00ec 520c
            f815 b267 ab38 161f 36a9 6d57 dfe1 582a
            81cb 020d 211f b974 883a 2532 7bda 9704
            a448 dc62 05e4 1366 0415 7575 2479 ec2a
            06cb 58d9 6149 ca9b d949 b246 4432 cad4
            4bb4 bfb7 f131 b193 109f 9663 bee5 9f02
            4923 58ec 689d 8cc2 19ed 0e33 3230 369f
            59c6 ae54 c393 3c03 0acc 3ec2 a14f 1900
            35ef d727 7c65 8e59 156b ba3d 7acf a5f2
            bf1b e327 06f3 d304 19ef 95ca e6d2 926f
            b14d c9e2 04b3 84d3 e239 3e4b 8761 3de0
            140b 9cbe 6c36 22ad 880c e060 bbb8 49f3
            b676 7269 5590 ec1d fcd4 02b8 41da f0b7
            9d59 a84c 4a6d 0a53 50d9 fe12 3aa8 4f0b
            ea36 3e24 ab1e 5050 2234 4e14 bf62 43b1
            2425 e63d 4599 6e18 e90a 0e7a 8bed 9a07
            a0a6 2b62 4686 7e7b 2b99 a3d0 c35d 0570
            38fd 69f0 1fa5 e83d 6273 2b93 72bb 6cc1
            de70 19a7 e4b9 8694 2cfa 9d6f 375f f0b2
            3900 0000 0068 0000 0013 6563 6473 612d
            7368 6132 2d6e 6973 7470 3235 3600 0000
            086e 6973 7470 3235 3600 0000 4104 498a
            4843 6340 47b3 3a6c 6464 ccbb a292 a0c0
            507d 9e4b 7961 1ad8 3233 6e1b 937c eee4
            6083 a08b adba 39c0 0753 ff2e afd2 6295
            d14d b0d1 6676 601f fef9 3a68 7248 0000
            0000 00"
        );
        let mut reader = msg;
        let restriction = RestrictDestination::decode(&mut reader)?;

        assert_eq!(restriction.constraints.len(), 1);
        let constraint = &restriction.constraints[0];
        assert!(constraint.from.is_empty());
        assert_eq!(constraint.to.hostname, "github.com");
        assert_eq!(constraint.to.keys.len(), 3);
        assert!(constraint.to.keys.iter().all(|key| !key.is_ca));

        let mut out = Vec::new();
        restriction.encode(&mut out)?;
        assert_eq!(out, msg);
        assert_eq!(restriction.encoded_len()?, msg.len());
        Ok(())
    }

    #[test]
    fn hop_extensions_are_rejected() {
        let mut wire = Vec::new();
        "".encode(&mut wire).unwrap();
        "h1".encode(&mut wire).unwrap();
        [0x01u8].as_slice().encode(&mut wire).unwrap();

        let mut reader = &wire[..];
        assert!(HopDescriptor::decode(&mut reader).is_err());
    }

    #[test]
    fn from_hop_with_user_is_rejected() {
        let mut constraint = Vec::new();
        HopDescriptor {
            user: "root".into(),
            hostname: String::new(),
            keys: vec![],
        }
        .encode_prefixed(&mut constraint)
        .unwrap();
        hop("h1", &[(&[0xaa; 8], false)])
            .encode_prefixed(&mut constraint)
            .unwrap();
        0u32.encode(&mut constraint).unwrap();

        let mut reader = &constraint[..];
        assert!(DestinationConstraint::decode(&mut reader).is_err());
    }

    #[test]
    fn to_hop_needs_hostname_and_key() {
        let mut constraint = Vec::new();
        HopDescriptor::default()
            .encode_prefixed(&mut constraint)
            .unwrap();
        hop("h1", &[]).encode_prefixed(&mut constraint).unwrap();
        0u32.encode(&mut constraint).unwrap();

        let mut reader = &constraint[..];
        assert!(DestinationConstraint::decode(&mut reader).is_err());
    }

    #[test]
    fn empty_from_key_requires_empty_from_hop() {
        let anywhere = DestinationConstraint {
            from: HopDescriptor::default(),
            to: hop("h1", &[(&[0xaa; 8], false)]),
        };
        assert!(anywhere.matches(&[], &[0xaa; 8], "bob", None));

        let hopped = DestinationConstraint {
            from: hop("h0", &[(&[0xbb; 8], false)]),
            to: hop("h1", &[(&[0xaa; 8], false)]),
        };
        assert!(!hopped.matches(&[], &[0xaa; 8], "bob", None));
        assert!(hopped.matches(&[0xbb; 8], &[0xaa; 8], "bob", None));
    }

    #[test]
    fn ca_keys_never_match() {
        let constraint = DestinationConstraint {
            from: HopDescriptor::default(),
            to: hop("h1", &[(&[0xaa; 8], true)]),
        };
        assert!(!constraint.matches(&[], &[0xaa; 8], "", None));
    }

    #[test]
    fn user_match_is_exact() {
        let mut to = hop("h1", &[(&[0xaa; 8], false)]);
        to.user = "bob".into();
        let constraint = DestinationConstraint {
            from: HopDescriptor::default(),
            to,
        };

        let mut info = MatchInfo::default();
        assert!(constraint.matches(&[], &[0xaa; 8], "bob", Some(&mut info)));
        assert_eq!(info.to, "h1");
        assert_eq!(info.user, "bob");

        assert!(!constraint.matches(&[], &[0xaa; 8], "b*", None));
        assert!(!constraint.matches(&[], &[0xaa; 8], "alice", None));
        // Listing (empty user) skips the user check.
        assert!(constraint.matches(&[], &[0xaa; 8], "", None));
    }
}
