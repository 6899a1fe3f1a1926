//! A resident coin page and its per-page lock.
//!
//! The page mutex must be held for every read or write of the coin data.
//! Reservations are soft: a session id plus a timestamp, lazily expired
//! on the next check rather than by a background sweep.

use raida_core::record::{An, MFS_FREE};
use raida_core::{Denomination, AN_SIZE, PAGE_DATA_SIZE, RECORD_SIZE};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Seconds after which a page reservation goes stale
pub const RESERVED_PAGE_RELEASE_SECONDS: u64 = 16;

/// The lockable payload of a page: coin data plus bookkeeping
pub struct PageData {
    bytes: Vec<u8>,
    dirty: bool,
    reserved_by: u32,
    reserved_at: Instant,
}

impl PageData {
    pub fn new(bytes: Vec<u8>) -> Self {
        debug_assert_eq!(bytes.len(), PAGE_DATA_SIZE);
        PageData {
            bytes,
            dirty: false,
            reserved_by: 0,
            reserved_at: Instant::now(),
        }
    }

    pub fn zeroed() -> Self {
        Self::new(vec![0u8; PAGE_DATA_SIZE])
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Authentication number of record `index`
    pub fn an(&self, index: usize) -> An {
        let off = index * RECORD_SIZE;
        let mut an = [0u8; AN_SIZE];
        an.copy_from_slice(&self.bytes[off..off + AN_SIZE]);
        an
    }

    /// MFS stamp of record `index`
    pub fn mfs(&self, index: usize) -> u8 {
        self.bytes[index * RECORD_SIZE + AN_SIZE]
    }

    pub fn is_free(&self, index: usize) -> bool {
        self.mfs(index) == MFS_FREE
    }

    /// Overwrite record `index` and mark the page dirty
    pub fn write_record(&mut self, index: usize, an: &An, mfs: u8) {
        let off = index * RECORD_SIZE;
        self.bytes[off..off + AN_SIZE].copy_from_slice(an);
        self.bytes[off + AN_SIZE] = mfs;
        self.dirty = true;
    }

    pub fn set_mfs(&mut self, index: usize, mfs: u8) {
        self.bytes[index * RECORD_SIZE + AN_SIZE] = mfs;
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// True iff a live reservation by another session exists.
    /// Stale reservations are cleared as a side effect.
    pub fn is_reserved(&mut self) -> bool {
        if self.reserved_by == 0 {
            return false;
        }
        if self.reserved_at.elapsed().as_secs() >= RESERVED_PAGE_RELEASE_SECONDS {
            self.reserved_by = 0;
            return false;
        }
        true
    }

    /// True iff the page is currently reserved by exactly this session
    pub fn is_reserved_by(&mut self, session: u32) -> bool {
        self.is_reserved() && self.reserved_by == session
    }

    pub fn reserve(&mut self, session: u32) {
        self.reserved_by = session;
        self.reserved_at = Instant::now();
    }

    pub fn release_reservation(&mut self) {
        self.reserved_by = 0;
    }

    #[cfg(test)]
    pub(crate) fn backdate_reservation(&mut self, secs: u64) {
        self.reserved_at = Instant::now() - std::time::Duration::from_secs(secs);
    }
}

/// A page resident in the cache
pub struct Page {
    pub denomination: Denomination,
    pub number: u32,
    data: Mutex<PageData>,
}

impl Page {
    pub fn new(denomination: Denomination, number: u32, data: PageData) -> Self {
        Page {
            denomination,
            number,
            data: Mutex::new(data),
        }
    }

    /// Take the per-page lock. A poisoned lock is recovered rather than
    /// propagated; handlers never unwind with the lock held.
    pub fn lock(&self) -> MutexGuard<'_, PageData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, PageData>> {
        self.data.try_lock().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_page() -> Page {
        let d = Denomination::new(0).unwrap();
        Page::new(d, 7, PageData::zeroed())
    }

    #[test]
    fn test_record_layout() {
        let page = test_page();
        let mut data = page.lock();
        let an = [0xAB; 16];
        data.write_record(3, &an, 9);
        assert_eq!(data.an(3), an);
        assert_eq!(data.mfs(3), 9);
        assert!(!data.is_free(3));
        assert!(data.is_free(2));
        assert!(data.is_free(4));
        // Byte-exact placement
        assert_eq!(data.bytes()[3 * RECORD_SIZE], 0xAB);
        assert_eq!(data.bytes()[3 * RECORD_SIZE + 16], 9);
    }

    #[test]
    fn test_write_marks_dirty() {
        let page = test_page();
        let mut data = page.lock();
        assert!(!data.is_dirty());
        data.write_record(0, &[1; 16], 1);
        assert!(data.is_dirty());
        data.clear_dirty();
        assert!(!data.is_dirty());
    }

    #[test]
    fn test_reservation_lifecycle() {
        let page = test_page();
        let mut data = page.lock();
        assert!(!data.is_reserved());

        data.reserve(42);
        assert!(data.is_reserved());
        assert!(data.is_reserved_by(42));
        assert!(!data.is_reserved_by(43));

        data.release_reservation();
        assert!(!data.is_reserved());
    }

    #[test]
    fn test_reservation_goes_stale() {
        let page = test_page();
        let mut data = page.lock();
        data.reserve(42);
        data.backdate_reservation(RESERVED_PAGE_RELEASE_SECONDS + 1);
        assert!(!data.is_reserved());
        // Stale check cleared the holder
        assert!(!data.is_reserved_by(42));
    }
}
