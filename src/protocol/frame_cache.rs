//! Frame cache for unsolicited co-processor frames.
//!
//! A fixed-capacity byte ring. Each entry is a u16 little-endian length
//! followed by the raw Spinel frame; entries may wrap around the end of the
//! storage. One byte of capacity is kept free so that `head == tail` always
//! means empty.
//!
//! A push that does not fit fails with [`SpinelError::NoBufs`] and writes
//! nothing. Older entries are never overwritten.
//!
//! # Example
//!
//! ```
//! use ncp_spinel::protocol::FrameCache;
//!
//! let mut cache = FrameCache::with_capacity(64);
//! cache.push(&[0x80, 0x06, 0x00, 0x72]).unwrap();
//!
//! assert_eq!(&cache.peek().unwrap()[..], &[0x80, 0x06, 0x00, 0x72]);
//! cache.shift();
//! assert!(cache.is_empty());
//! ```

use bytes::Bytes;

use crate::error::{Result, SpinelError};

/// Default cache capacity in bytes.
pub const DEFAULT_FRAME_CACHE_CAPACITY: usize = 4096;

const LENGTH_PREFIX: usize = 2;

/// Ring buffer of length-prefixed frames.
pub struct FrameCache {
    storage: Box<[u8]>,
    /// Offset of the oldest entry.
    head: usize,
    /// Offset where the next entry is written.
    tail: usize,
}

impl FrameCache {
    /// Create a cache with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_FRAME_CACHE_CAPACITY)
    }

    /// Create a cache backed by `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity.max(LENGTH_PREFIX + 1)].into_boxed_slice(),
            head: 0,
            tail: 0,
        }
    }

    /// Total storage in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Bytes currently resident, prefixes included.
    #[inline]
    pub fn used(&self) -> usize {
        if self.tail >= self.head {
            self.tail - self.head
        } else {
            self.capacity() - self.head + self.tail
        }
    }

    /// Bytes a push may still consume.
    #[inline]
    pub fn available(&self) -> usize {
        self.capacity() - self.used() - 1
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    /// Append a frame at the tail.
    pub fn push(&mut self, frame: &[u8]) -> Result<()> {
        let len = u16::try_from(frame.len()).map_err(|_| SpinelError::NoBufs)?;
        if LENGTH_PREFIX + frame.len() > self.available() {
            return Err(SpinelError::NoBufs);
        }

        let tail = self.write_at(self.tail, &len.to_le_bytes());
        self.tail = self.write_at(tail, frame);
        Ok(())
    }

    /// Copy of the oldest frame, or `None` if empty.
    pub fn peek(&self) -> Option<Bytes> {
        if self.is_empty() {
            return None;
        }

        let (len, start) = self.entry_len(self.head);
        let mut frame = vec![0u8; len];
        self.read_at(start, &mut frame);
        Some(Bytes::from(frame))
    }

    /// Remove the oldest frame. No-op when empty.
    pub fn shift(&mut self) {
        if self.is_empty() {
            return;
        }
        let (len, start) = self.entry_len(self.head);
        self.head = (start + len) % self.capacity();
    }

    /// Discard every cached frame.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
    }

    fn entry_len(&self, offset: usize) -> (usize, usize) {
        let mut prefix = [0u8; LENGTH_PREFIX];
        let start = self.read_at(offset, &mut prefix);
        (u16::from_le_bytes(prefix) as usize, start)
    }

    /// Copy `data` in at `offset`, wrapping; returns the offset after it.
    fn write_at(&mut self, offset: usize, data: &[u8]) -> usize {
        let cap = self.capacity();
        let first = data.len().min(cap - offset);
        self.storage[offset..offset + first].copy_from_slice(&data[..first]);
        self.storage[..data.len() - first].copy_from_slice(&data[first..]);
        (offset + data.len()) % cap
    }

    /// Fill `out` from `offset`, wrapping; returns the offset after it.
    fn read_at(&self, offset: usize, out: &mut [u8]) -> usize {
        let cap = self.capacity();
        let first = out.len().min(cap - offset);
        out[..first].copy_from_slice(&self.storage[offset..offset + first]);
        let rest = out.len() - first;
        out[first..].copy_from_slice(&self.storage[..rest]);
        (offset + out.len()) % cap
    }
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCache")
            .field("capacity", &self.capacity())
            .field("used", &self.used())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cache() {
        let mut cache = FrameCache::with_capacity(32);
        assert!(cache.is_empty());
        assert!(cache.peek().is_none());
        cache.shift();
        assert!(cache.is_empty());
        assert_eq!(cache.used(), 0);
    }

    #[test]
    fn test_fifo_order() {
        let mut cache = FrameCache::with_capacity(64);
        cache.push(b"first").unwrap();
        cache.push(b"second").unwrap();
        cache.push(b"third").unwrap();

        let mut drained = Vec::new();
        while let Some(frame) = cache.peek() {
            drained.push(frame);
            cache.shift();
        }

        assert_eq!(drained, vec![&b"first"[..], &b"second"[..], &b"third"[..]]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_peek_does_not_remove() {
        let mut cache = FrameCache::with_capacity(32);
        cache.push(b"frame").unwrap();

        assert_eq!(&cache.peek().unwrap()[..], b"frame");
        assert_eq!(&cache.peek().unwrap()[..], b"frame");
        assert!(!cache.is_empty());
    }

    #[test]
    fn test_full_cache_rejects_without_partial_write() {
        let mut cache = FrameCache::with_capacity(16);
        // 2 + 10 = 12 of 15 usable bytes
        cache.push(&[0xAA; 10]).unwrap();
        let used = cache.used();

        let result = cache.push(&[0xBB; 2]);
        assert!(matches!(result, Err(SpinelError::NoBufs)));
        assert_eq!(cache.used(), used);
        assert_eq!(&cache.peek().unwrap()[..], &[0xAA; 10]);

        // Exactly fits the remaining space.
        cache.push(&[0xCC; 1]).unwrap();
        assert_eq!(cache.available(), 0);
    }

    #[test]
    fn test_oversize_frame_rejected() {
        let mut cache = FrameCache::with_capacity(8);
        assert!(matches!(
            cache.push(&[0u8; 8]),
            Err(SpinelError::NoBufs)
        ));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_wraparound() {
        let mut cache = FrameCache::with_capacity(16);

        cache.push(b"abcdef").unwrap();
        cache.push(b"ghi").unwrap();
        cache.shift();

        // Head is now at 8; this entry spans the end of storage.
        cache.push(b"jklmnop").unwrap();

        assert_eq!(&cache.peek().unwrap()[..], b"ghi");
        cache.shift();
        assert_eq!(&cache.peek().unwrap()[..], b"jklmnop");
        cache.shift();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_length_prefix_wraps() {
        let mut cache = FrameCache::with_capacity(10);

        cache.push(b"1234567").unwrap();
        cache.shift();

        // Tail sits at 9: the prefix straddles the end.
        cache.push(b"xy").unwrap();
        assert_eq!(&cache.peek().unwrap()[..], b"xy");
        cache.shift();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut cache = FrameCache::with_capacity(32);
        cache.push(b"one").unwrap();
        cache.push(b"two").unwrap();

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.available(), 31);
    }
}
