//! Transaction ID allocation.
//!
//! TIDs 1..=15 are handed out round-robin from a cursor. Only the TID right
//! after the cursor is considered: if it is still in use the allocation fails,
//! so a slow response can never collide with a newer request.

use crate::protocol::next_tid;

/// Bitmap of in-flight TIDs plus the allocation cursor.
#[derive(Debug, Default)]
pub struct TidPool {
    /// Bit `n` set means TID `n` is in flight.
    in_use: u16,
    /// Last TID handed out (0 before the first allocation).
    cursor: u8,
}

impl TidPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next TID, or `None` if it is still in flight.
    pub fn allocate(&mut self) -> Option<u8> {
        let tid = next_tid(self.cursor);
        if self.in_use & (1 << tid) != 0 {
            return None;
        }
        self.in_use |= 1 << tid;
        self.cursor = tid;
        Some(tid)
    }

    /// Release a TID. Releasing TID 0 or a free TID is a no-op.
    pub fn free(&mut self, tid: u8) {
        if tid != 0 && tid <= 15 {
            self.in_use &= !(1 << tid);
        }
    }

    /// Check if `tid` is currently allocated.
    #[cfg(test)]
    pub fn is_in_use(&self, tid: u8) -> bool {
        tid <= 15 && self.in_use & (1 << tid) != 0
    }

    /// Number of TIDs in flight.
    #[cfg(test)]
    pub fn in_flight(&self) -> u32 {
        self.in_use.count_ones()
    }

    /// Release every TID.
    pub fn clear(&mut self) {
        self.in_use = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_allocation() {
        let mut pool = TidPool::new();
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), Some(2));
        assert_eq!(pool.in_flight(), 2);
    }

    #[test]
    fn test_tid_zero_never_allocated() {
        let mut pool = TidPool::new();
        for _ in 0..100 {
            let tid = pool.allocate().unwrap();
            assert!((1..=15).contains(&tid));
            pool.free(tid);
        }
    }

    #[test]
    fn test_freed_tids_cycle() {
        let mut pool = TidPool::new();
        let mut seen = Vec::new();
        for _ in 0..16 {
            let tid = pool.allocate().unwrap();
            seen.push(tid);
            pool.free(tid);
        }
        assert_eq!(seen[14], 15);
        assert_eq!(seen[15], 1);
    }

    #[test]
    fn test_next_in_use_is_busy() {
        let mut pool = TidPool::new();
        // Hold TID 1 and cycle the cursor all the way round to it.
        let held = pool.allocate().unwrap();
        for _ in 0..14 {
            let tid = pool.allocate().unwrap();
            pool.free(tid);
        }

        assert_eq!(pool.allocate(), None);
        assert!(pool.is_in_use(held));

        pool.free(held);
        assert_eq!(pool.allocate(), Some(1));
    }

    #[test]
    fn test_all_tids_exhausted() {
        let mut pool = TidPool::new();
        for _ in 0..15 {
            assert!(pool.allocate().is_some());
        }
        assert_eq!(pool.allocate(), None);
        assert_eq!(pool.in_flight(), 15);

        pool.clear();
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_free_zero_is_noop() {
        let mut pool = TidPool::new();
        let tid = pool.allocate().unwrap();
        pool.free(0);
        assert!(pool.is_in_use(tid));
    }
}
