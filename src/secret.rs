//! Zeroizing byte container for key material and passphrases.
//!
//! Every field that may hold private keys, passphrases, signatures-in-flight
//! or mpints flows through [`SecretBuffer`]: the backing bytes are overwritten
//! on release and, on Unix, the pages are advised as non-swappable while the
//! buffer is alive. The `Debug` representation never prints the contents.

use core::fmt;

use zeroize::Zeroize;

/// Growable byte buffer that wipes its contents on drop.
///
/// Pages backing the buffer are `mlock`ed while the buffer is alive (on
/// platforms that support it); growth re-locks the new allocation and wipes
/// the old one before it is returned to the allocator.
#[derive(Default, Clone)]
pub struct SecretBuffer {
    data: Vec<u8>,
}

impl SecretBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an existing byte vector.
    ///
    /// The vector is moved, not copied, so no unwiped duplicate is left
    /// behind by this call.
    pub fn from_vec(data: Vec<u8>) -> Self {
        lock_pages(&data);
        Self { data }
    }

    /// Copy bytes out of a borrowed slice.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    /// Borrow the contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes held.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append bytes, re-locking the allocation if it moved.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        if self.data.capacity() - self.data.len() >= bytes.len() {
            self.data.extend_from_slice(bytes);
            return;
        }

        let mut grown = Vec::with_capacity(self.data.len() + bytes.len());
        grown.extend_from_slice(&self.data);
        grown.extend_from_slice(bytes);
        lock_pages(&grown);

        let mut old = core::mem::replace(&mut self.data, grown);
        unlock_pages(&old);
        old.zeroize();
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        unlock_pages(&self.data);
        self.data.zeroize();
    }
}

impl Zeroize for SecretBuffer {
    fn zeroize(&mut self) {
        self.data.zeroize();
    }
}

impl fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretBuffer({} bytes)", self.data.len())
    }
}

impl From<Vec<u8>> for SecretBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_vec(data)
    }
}

impl From<&[u8]> for SecretBuffer {
    fn from(data: &[u8]) -> Self {
        Self::from_slice(data)
    }
}

impl AsRef<[u8]> for SecretBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl PartialEq for SecretBuffer {
    fn eq(&self, other: &Self) -> bool {
        use subtle::ConstantTimeEq;

        self.data.ct_eq(&other.data).into()
    }
}

impl Eq for SecretBuffer {}

#[cfg(unix)]
#[allow(unsafe_code)]
fn lock_pages(data: &[u8]) {
    if data.is_empty() {
        return;
    }
    // Advisory only: failure (e.g. RLIMIT_MEMLOCK exhausted) must not take
    // the agent down, so the return value is ignored.
    unsafe {
        let _ = libc::mlock(data.as_ptr().cast(), data.len());
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn unlock_pages(data: &[u8]) {
    if data.is_empty() {
        return;
    }
    unsafe {
        let _ = libc::munlock(data.as_ptr().cast(), data.len());
    }
}

#[cfg(not(unix))]
fn lock_pages(_data: &[u8]) {}

#[cfg(not(unix))]
fn unlock_pages(_data: &[u8]) {}
