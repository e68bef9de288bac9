//! Reference-counted byte buffers shared between application and IO paths
//!
//! Outbound data is handed to the library as a [`SharedBuf`], an immutable
//! reference-counted view. Cloning is O(1) and never copies the bytes, which
//! is what lets a queued send outlive the application's copy of the buffer.
//! [`MutableBuf`] is the build-side companion; [`MutableBuf::freeze`] is the
//! only conversion into a `SharedBuf` and consumes the mutable view.

use bytes::{Bytes, BytesMut};
use std::ops::Deref;

/// Immutable, reference-counted contiguous bytes.
///
/// Once constructed the contents never change; clones share the same
/// allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedBuf {
    inner: Bytes,
}

impl SharedBuf {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            inner: Bytes::new(),
        }
    }

    /// Number of bytes in the buffer
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Borrow the contents as a byte slice
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }
}

impl Deref for SharedBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.inner
    }
}

impl AsRef<[u8]> for SharedBuf {
    fn as_ref(&self) -> &[u8] {
        &self.inner
    }
}

impl From<Bytes> for SharedBuf {
    fn from(inner: Bytes) -> Self {
        Self { inner }
    }
}

impl From<Vec<u8>> for SharedBuf {
    fn from(v: Vec<u8>) -> Self {
        Self {
            inner: Bytes::from(v),
        }
    }
}

impl From<&[u8]> for SharedBuf {
    fn from(s: &[u8]) -> Self {
        Self {
            inner: Bytes::copy_from_slice(s),
        }
    }
}

impl From<MutableBuf> for SharedBuf {
    fn from(m: MutableBuf) -> Self {
        m.freeze()
    }
}

/// Growable byte buffer that can be frozen into a [`SharedBuf`] without
/// copying.
#[derive(Debug, Default)]
pub struct MutableBuf {
    inner: BytesMut,
}

impl MutableBuf {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self {
            inner: BytesMut::new(),
        }
    }

    /// Create an empty buffer with `cap` bytes preallocated
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            inner: BytesMut::with_capacity(cap),
        }
    }

    /// Append a slice to the end of the buffer
    pub fn append(&mut self, s: &[u8]) -> &mut Self {
        self.inner.extend_from_slice(s);
        self
    }

    /// Resize to `len` bytes, filling new space with `fill`
    pub fn resize(&mut self, len: usize, fill: u8) {
        self.inner.resize(len, fill);
    }

    /// Discard all contents, keeping the allocation
    pub fn clear(&mut self) {
        self.inner.clear();
    }

    /// Number of bytes currently in the buffer
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check whether the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Borrow the contents as a byte slice
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Borrow the contents as a mutable byte slice
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.inner
    }

    /// Convert into an immutable [`SharedBuf`], consuming this buffer.
    /// No bytes are copied.
    pub fn freeze(self) -> SharedBuf {
        SharedBuf {
            inner: self.inner.freeze(),
        }
    }
}

impl From<&[u8]> for MutableBuf {
    fn from(s: &[u8]) -> Self {
        let mut m = Self::with_capacity(s.len());
        m.append(s);
        m
    }
}
