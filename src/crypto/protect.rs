//! Passphrase-based sealing of exported private keys.
//!
//! Layout of a sealed blob: `salt(16) || iv(16) || ciphertext || mac(32)`.
//! The encryption key is derived from the passphrase with PBKDF2-HMAC-SHA256,
//! a separate MAC key is expanded from it with HKDF, and the MAC covers
//! salt, IV and ciphertext (encrypt-then-MAC). Opening verifies the MAC in
//! constant time before touching the ciphertext.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::CryptoError;
use crate::secret::SecretBuffer;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

const SALT_LEN: usize = 16;
const IV_LEN: usize = 16;
const KEY_LEN: usize = 32;
const MAC_LEN: usize = 32;
const PBKDF2_ROUNDS: u32 = 600_000;

fn derive_key(passphrase: &[u8], salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(passphrase, salt, PBKDF2_ROUNDS, &mut *key);
    key
}

fn derive_mac_key(encryption_key: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    let hkdf = Hkdf::<Sha256>::new(None, encryption_key);
    let mut mac_key = Zeroizing::new([0u8; KEY_LEN]);
    hkdf.expand(b"key seal mac", &mut *mac_key)
        .expect("HKDF expand cannot fail for 32-byte output");
    mac_key
}

fn mac(mac_key: &[u8], payload: &[u8]) -> [u8; MAC_LEN] {
    let mut hmac =
        HmacSha256::new_from_slice(mac_key).expect("HMAC accepts any key length");
    hmac.update(payload);
    hmac.finalize().into_bytes().into()
}

/// Seal `plaintext` under `passphrase`.
pub fn seal(plaintext: &[u8], passphrase: &[u8]) -> Vec<u8> {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut iv);

    let key = derive_key(passphrase, &salt);
    let mac_key = derive_mac_key(&*key);

    let cipher = Aes256CbcEnc::new((&*key).into(), (&iv).into());
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut sealed = Vec::with_capacity(SALT_LEN + IV_LEN + ciphertext.len() + MAC_LEN);
    sealed.extend_from_slice(&salt);
    sealed.extend_from_slice(&iv);
    sealed.extend_from_slice(&ciphertext);
    let tag = mac(&*mac_key, &sealed);
    sealed.extend_from_slice(&tag);
    sealed
}

/// Open a sealed blob; fails with [`CryptoError::BadPassphrase`] on MAC
/// mismatch.
pub fn open(sealed: &[u8], passphrase: &[u8]) -> Result<SecretBuffer, CryptoError> {
    if sealed.len() < SALT_LEN + IV_LEN + MAC_LEN {
        return Err(CryptoError::InvalidKey("sealed blob too short"));
    }

    let (body, tag) = sealed.split_at(sealed.len() - MAC_LEN);
    let salt = &body[..SALT_LEN];
    let iv = &body[SALT_LEN..SALT_LEN + IV_LEN];
    let ciphertext = &body[SALT_LEN + IV_LEN..];

    let key = derive_key(passphrase, salt);
    let mac_key = derive_mac_key(&*key);

    let expected = mac(&*mac_key, body);
    if !bool::from(expected.as_slice().ct_eq(tag)) {
        return Err(CryptoError::BadPassphrase);
    }

    let cipher = Aes256CbcDec::new((&*key).into(), iv.into());
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::BadPassphrase)?;

    Ok(SecretBuffer::from_vec(plaintext))
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn seal_open_round_trip() -> TestResult {
        let sealed = seal(b"private bits", b"passphrase");
        let opened = open(&sealed, b"passphrase")?;
        assert_eq!(opened.as_slice(), b"private bits");
        Ok(())
    }

    #[test]
    fn wrong_passphrase_is_rejected_before_decrypt() {
        let sealed = seal(b"private bits", b"passphrase");
        assert!(matches!(
            open(&sealed, b"password"),
            Err(CryptoError::BadPassphrase)
        ));
    }

    #[test]
    fn tampered_ciphertext_is_rejected() {
        let mut sealed = seal(b"private bits", b"passphrase");
        let flip = SALT_LEN + IV_LEN;
        sealed[flip] ^= 0x01;
        assert!(open(&sealed, b"passphrase").is_err());
    }

    #[test]
    fn truncated_blob_is_structural_error() {
        assert!(matches!(
            open(&[0u8; 10], b"passphrase"),
            Err(CryptoError::InvalidKey(_))
        ));
    }
}
