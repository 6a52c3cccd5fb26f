//! Owns sensitive bytes (passwords, derived keys, IVs) and guarantees they
//! are scrubbed on release in a way the compiler cannot optimise away.

use crate::csprng;
use zeroize::Zeroize;

/// A byte buffer with exclusive ownership that is scrubbed on drop.
///
/// The scrub overwrites the buffer with CSPRNG-sourced random bytes, then
/// zeroes it, then truncates to length zero. The random pass is what keeps
/// the *original* length from being reconstructable from allocator traces
/// (spec §9): a plain zero-fill leaves a buffer whose capacity still hints
/// at how long the password was.
pub struct SecureBuffer {
    data: Vec<u8>,
}

impl SecureBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0u8; len],
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Scrub the buffer's contents and consume it. Called explicitly at
    /// every point the spec calls out a password leaving scope; also run
    /// implicitly by `Drop` so a stray early return still scrubs.
    pub fn scrub_and_drop(mut self) {
        self.scrub();
    }

    fn scrub(&mut self) {
        if self.data.is_empty() {
            return;
        }
        // Overwrite with random bytes of length `len + small_random` bytes
        // so that the true length isn't the only thing left in memory.
        let pad = csprng::random_byte() as usize % 11;
        let mut scratch = vec![0u8; self.data.len() + pad];
        let _ = csprng::random_bytes(&mut scratch);
        let n = self.data.len();
        self.data.copy_from_slice(&scratch[..n]);
        std::hint::black_box(&self.data);
        self.data.zeroize();
        self.data.clear();
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        self.scrub();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrub_clears_contents() {
        let mut buf = SecureBuffer::from_vec(b"hunter2".to_vec());
        buf.as_mut_slice()[0] = b'H';
        buf.scrub_and_drop();
        // Nothing to assert on `buf` itself (moved), but scrub must not panic
        // and must not leak the original bytes through a double-scrub.
    }

    #[test]
    fn new_allocates_zeroed_buffer() {
        let buf = SecureBuffer::new(32);
        assert_eq!(buf.len(), 32);
        assert!(buf.as_slice().iter().all(|&b| b == 0));
    }
}
