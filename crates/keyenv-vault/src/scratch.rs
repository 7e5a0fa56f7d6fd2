// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wipe-on-drop buffers for decrypted plaintext.
//!
//! Plaintext only ever lives in a [`ScratchBuffer`]. The buffer is sized up
//! front by its producer so it never reallocates (a reallocation would leave
//! an unwiped copy behind), and its full capacity is zeroed when it drops,
//! on success and error paths alike.

use std::fmt;
use std::ops::Deref;

use zeroize::Zeroizing;

/// A byte buffer holding plaintext, zeroed on drop.
pub struct ScratchBuffer {
    bytes: Zeroizing<Vec<u8>>,
}

impl ScratchBuffer {
    /// Empty buffer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Zeroizing::new(Vec::with_capacity(capacity)),
        }
    }

    /// Take ownership of an existing vector. It is wiped when this buffer drops.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    /// Append bytes. Callers size the buffer so this stays within capacity.
    pub fn extend_from_slice(&mut self, data: &[u8]) {
        debug_assert!(
            self.bytes.len() + data.len() <= self.bytes.capacity(),
            "scratch buffer would reallocate"
        );
        self.bytes.extend_from_slice(data);
    }

    /// Shorten the buffer; the dropped tail stays in the allocation and is
    /// still wiped on drop.
    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    pub(crate) fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.bytes
    }

    #[cfg(test)]
    pub(crate) fn capacity(&self) -> usize {
        self.bytes.capacity()
    }
}

impl Deref for ScratchBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.bytes
    }
}

impl AsRef<[u8]> for ScratchBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for ScratchBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("len", &self.bytes.len())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extend_within_capacity_keeps_allocation() {
        let mut buf = ScratchBuffer::with_capacity(16);
        let before = buf.capacity();
        buf.extend_from_slice(b"OPENAI_API_KEY");
        assert_eq!(&buf[..], b"OPENAI_API_KEY");
        assert_eq!(buf.capacity(), before);
    }

    #[test]
    fn truncate_shortens_view() {
        let mut buf = ScratchBuffer::from_vec(b"secret-and-tag".to_vec());
        buf.truncate(6);
        assert_eq!(&buf[..], b"secret");
    }

    #[test]
    fn debug_output_is_redacted() {
        let buf = ScratchBuffer::from_vec(b"sk-live-123".to_vec());
        let rendered = format!("{buf:?}");
        assert!(!rendered.contains("sk-live"));
        assert!(rendered.contains("REDACTED"));
    }
}
