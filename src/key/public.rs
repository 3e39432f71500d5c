//! Public half of an identity: wire blob, fingerprints and display helpers.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use ssh_encoding::Decode;
use ssh_key::Mpint;

use crate::proto::{EcdsaCurve, ProtoError, ProtoResult, ALG_ED25519, ALG_ED448, ALG_RSA};

const FLDBASE: usize = 8;
const FLDSIZE_Y: usize = FLDBASE + 1;
const FLDSIZE_X: usize = FLDBASE * 2 + 1;
const SYMBOLS: &[u8] = b" .o+=*BOX@%&#/^";

/// A canonical public key wire blob with its parsed algorithm name.
///
/// The fingerprint is a pure function of the wire blob; two identities with
/// identical blobs always produce identical fingerprints.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PublicKey {
    algorithm: String,
    blob: Vec<u8>,
    family: &'static str,
    bits: usize,
}

impl PublicKey {
    /// Parse a canonical public wire blob.
    pub fn from_blob(blob: Vec<u8>) -> ProtoResult<Self> {
        let mut reader = blob.as_slice();
        let algorithm = String::decode(&mut reader)?;

        let (family, bits) = match algorithm.as_str() {
            ALG_ED25519 => ("ED25519", 256),
            ALG_ED448 => ("ED448", 456),
            ALG_RSA => {
                let _e = Mpint::decode(&mut reader)?;
                let n = Mpint::decode(&mut reader)?;
                ("RSA", bit_length(n.as_positive_bytes().unwrap_or(&[])))
            }
            other => match EcdsaCurve::from_algorithm(other) {
                Some(curve) => (
                    "ECDSA",
                    match curve {
                        EcdsaCurve::NistP256 => 256,
                        EcdsaCurve::NistP384 => 384,
                        EcdsaCurve::NistP521 => 521,
                    },
                ),
                None => {
                    return Err(ProtoError::UnknownAlgorithm {
                        algorithm: algorithm.clone(),
                    })
                }
            },
        };

        Ok(Self {
            algorithm,
            blob,
            family,
            bits,
        })
    }

    /// Algorithm name (e.g. `ssh-ed25519`).
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    /// The canonical wire blob.
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// Key family for display (e.g. `ED25519`).
    pub fn family(&self) -> &'static str {
        self.family
    }

    /// Key size in bits.
    pub fn bits(&self) -> usize {
        self.bits
    }

    /// SHA-256 digest of the wire blob.
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(&self.blob).into()
    }

    /// `SHA256:`-prefixed base64 fingerprint, without padding.
    pub fn fingerprint(&self) -> String {
        let b64 = BASE64.encode(self.digest());
        format!("SHA256:{}", b64.trim_end_matches('='))
    }

    /// Lower-hex form of the fingerprint digest.
    pub fn fingerprint_hex(&self) -> String {
        self.digest().iter().map(|byte| format!("{byte:02x}")).collect()
    }

    /// One `authorized_keys` line: `<algorithm> <base64 blob> <comment>`.
    pub fn authorized_key_line(&self, comment: &str) -> String {
        format!("{} {} {}", self.algorithm, BASE64.encode(&self.blob), comment)
    }

    /// OpenSSH-style "visual host key": a 9×17 randomart board framed by a
    /// `[<FAMILY> <BITS>]` header and a `[SHA256]` footer.
    ///
    /// The walker reads the digest two bits at a time (low bits first),
    /// moving diagonally and bumping the visit count of each visited cell.
    pub fn randomart(&self) -> Vec<String> {
        let mut grid = [[0usize; FLDSIZE_X]; FLDSIZE_Y];
        let mut x = FLDSIZE_X / 2;
        let mut y = FLDSIZE_Y / 2;

        for byte in self.digest() {
            let mut input = byte;
            for _ in 0..4 {
                x = if input & 0x1 != 0 { x + 1 } else { x.saturating_sub(1) };
                y = if input & 0x2 != 0 { y + 1 } else { y.saturating_sub(1) };
                x = x.min(FLDSIZE_X - 1);
                y = y.min(FLDSIZE_Y - 1);
                if grid[y][x] < SYMBOLS.len() - 2 {
                    grid[y][x] += 1;
                }
                input >>= 2;
            }
        }

        let mut result = Vec::with_capacity(FLDSIZE_Y + 2);
        let key_type = format!("[{} {}]", self.family, self.bits);
        let front_pad = (FLDSIZE_X - key_type.len()) / 2;
        let back_pad = FLDSIZE_X - key_type.len() - front_pad;
        result.push(format!(
            "+{}{}{}+",
            "-".repeat(front_pad),
            key_type,
            "-".repeat(back_pad)
        ));

        for (row, cells) in grid.iter().enumerate() {
            let mut line = String::from("|");
            for (col, &count) in cells.iter().enumerate() {
                if row == FLDSIZE_Y / 2 && col == FLDSIZE_X / 2 {
                    line.push('S');
                } else if row == y && col == x {
                    line.push('E');
                } else {
                    line.push(SYMBOLS[count] as char);
                }
            }
            line.push('|');
            result.push(line);
        }

        result.push("+----[SHA256]-----+".into());
        result
    }
}

fn bit_length(bytes: &[u8]) -> usize {
    match bytes.iter().position(|&byte| byte != 0) {
        Some(first) => (bytes.len() - first) * 8 - bytes[first].leading_zeros() as usize,
        None => 0,
    }
}

#[cfg(test)]
mod tests {
    use ssh_encoding::Encode;
    use testresult::TestResult;

    use super::*;

    fn ed25519_blob(point: u8) -> Vec<u8> {
        let mut blob = Vec::new();
        "ssh-ed25519".encode(&mut blob).unwrap();
        vec![point; 32].encode(&mut blob).unwrap();
        blob
    }

    #[test]
    fn fingerprint_hashes_exactly_the_public_blob() -> TestResult {
        let blob = ed25519_blob(0x01);
        let key = PublicKey::from_blob(blob.clone())?;

        // Independent digest of the literal blob bytes: hashing anything
        // else (e.g. the private half) would not match.
        let digest = Sha256::digest(&blob);
        let expected = format!(
            "SHA256:{}",
            BASE64.encode(digest).trim_end_matches('=')
        );
        assert_eq!(key.fingerprint(), expected);
        assert!(key.fingerprint().starts_with("SHA256:"));
        assert!(!key.fingerprint().ends_with('='));
        Ok(())
    }

    #[test]
    fn identical_blobs_identical_fingerprints() -> TestResult {
        let a = PublicKey::from_blob(ed25519_blob(0x01))?;
        let b = PublicKey::from_blob(ed25519_blob(0x01))?;
        let c = PublicKey::from_blob(ed25519_blob(0x02))?;
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint_hex().len(), 64);

        let line = a.authorized_key_line("user@host");
        assert!(line.starts_with("ssh-ed25519 "));
        assert!(line.ends_with(" user@host"));
        Ok(())
    }

    #[test]
    fn randomart_has_frame_start_and_end() -> TestResult {
        let key = PublicKey::from_blob(ed25519_blob(0x01))?;
        let art = key.randomart();

        assert_eq!(art.len(), FLDSIZE_Y + 2);
        assert_eq!(art[0].len(), FLDSIZE_X + 2);
        assert!(art[0].contains("[ED25519 256]"));
        assert_eq!(art[art.len() - 1], "+----[SHA256]-----+");

        let board = art[1..=FLDSIZE_Y].join("");
        assert!(board.contains('S'));
        assert!(board.contains('E'));
        Ok(())
    }

    #[test]
    fn rsa_bits_follow_modulus_length() -> TestResult {
        let mut blob = Vec::new();
        "ssh-rsa".encode(&mut blob)?;
        Mpint::from_positive_bytes(&[0x01, 0x00, 0x01])?.encode(&mut blob)?;
        let mut modulus = vec![0x80u8];
        modulus.extend_from_slice(&vec![0x55; 255]);
        Mpint::from_positive_bytes(&modulus)?.encode(&mut blob)?;

        let key = PublicKey::from_blob(blob)?;
        assert_eq!(key.family(), "RSA");
        assert_eq!(key.bits(), 2048);
        Ok(())
    }
}
