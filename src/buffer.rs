// Copyright 2024 Simo Sorce
// See LICENSE.txt file for terms

//! Accumulator for data that must be presented to a token primitive in
//! one piece: raw message bytes waiting for a card-side signature, or a
//! digest folded in just before the terminal call. The contents may be
//! plaintext or digest material, so every superseded allocation is wiped
//! before it is returned to the allocator.

use std::fmt;

use crate::error::{Error, Result};
use crate::pkcs11::*;

use zeroize::Zeroize;

/// Grow-only byte accumulator with secure reallocation.
#[derive(Default)]
pub struct SecureBuffer {
    buf: Vec<u8>,
}

impl SecureBuffer {
    /// Creates an empty accumulator. No allocation happens until the
    /// first non-empty append.
    pub fn new() -> SecureBuffer {
        SecureBuffer { buf: Vec::new() }
    }

    /// Appends `data`, moving the accumulated bytes into a fresh
    /// exact-size allocation and wiping the previous one.
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        if data.len() == 0 {
            return Ok(());
        }
        let mut newbuf = Vec::new();
        if newbuf.try_reserve_exact(self.buf.len() + data.len()).is_err() {
            return Err(Error::ck_rv(CKR_HOST_MEMORY));
        }
        newbuf.extend_from_slice(&self.buf);
        newbuf.extend_from_slice(data);
        self.buf.zeroize();
        self.buf = newbuf;
        Ok(())
    }

    /// The accumulated bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_slice()
    }

    /// Number of accumulated bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True when nothing has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        self.buf.zeroize();
    }
}

impl fmt::Debug for SecureBuffer {
    /* never expose the contents in traces */
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureBuffer").field("len", &self.buf.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_grows() {
        let mut b = SecureBuffer::new();
        assert!(b.is_empty());
        b.append(b"abc").unwrap();
        b.append(b"").unwrap();
        b.append(b"def").unwrap();
        assert_eq!(b.len(), 6);
        assert_eq!(b.as_slice(), b"abcdef");
    }

    #[test]
    fn test_debug_hides_contents() {
        let mut b = SecureBuffer::new();
        b.append(b"topsecret").unwrap();
        let s = format!("{:?}", b);
        assert!(!s.contains("topsecret"));
        assert!(s.contains("len"));
    }
}
