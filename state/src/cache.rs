//! On-demand page cache.
//!
//! Resident pages live in an arena of slots. A hash map keyed by
//! (denomination index, page number) holds the slot id, and the slots
//! carry intrusive LRU links as indices into the same arena, so the list
//! needs no self-referential pointers. The map owns the single strong
//! reference; lookups hand out `Arc<Page>` clones.
//!
//! Lock order is cache mutex first, then page mutex, never inverted.
//! The cache mutex is never held across disk I/O: a miss reads the page
//! file first, then re-checks the map, so two racing misses cost one
//! wasted read instead of a stall.

use crate::error::StateError;
use crate::page::{Page, PageData};
use raida_core::{Coin, Denomination, PAGES_PER_DENOMINATION, PAGE_DATA_SIZE};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error};

/// Most pages resident at once, per process
pub const MAX_CACHED_PAGES: usize = 1000;

/// Bounded attempts for a single page-file write
const WRITE_RETRIES: u32 = 3;

const NIL: u32 = u32::MAX;

struct Slot {
    page: Option<Arc<Page>>,
    prev: u32,
    next: u32,
}

struct CacheInner {
    map: HashMap<(usize, u32), u32>,
    slots: Vec<Slot>,
    free: Vec<u32>,
    /// Most recently used slot
    head: u32,
    /// Least recently used slot
    tail: u32,
}

impl CacheInner {
    fn new() -> Self {
        CacheInner {
            map: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
        }
    }

    fn unlink(&mut self, sid: u32) {
        let slot = &self.slots[sid as usize];
        let (prev, next) = (slot.prev, slot.next);
        if prev != NIL {
            self.slots[prev as usize].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next as usize].prev = prev;
        } else {
            self.tail = prev;
        }
        let slot = &mut self.slots[sid as usize];
        slot.prev = NIL;
        slot.next = NIL;
    }

    fn push_front(&mut self, sid: u32) {
        let old_head = self.head;
        {
            let slot = &mut self.slots[sid as usize];
            slot.prev = NIL;
            slot.next = old_head;
        }
        if old_head != NIL {
            self.slots[old_head as usize].prev = sid;
        } else {
            self.tail = sid;
        }
        self.head = sid;
    }

    fn touch(&mut self, sid: u32) {
        if self.head != sid {
            self.unlink(sid);
            self.push_front(sid);
        }
    }

    fn pop_tail(&mut self) -> Option<u32> {
        if self.tail == NIL {
            return None;
        }
        let sid = self.tail;
        self.unlink(sid);
        Some(sid)
    }

    fn alloc(&mut self, page: Arc<Page>) -> u32 {
        if let Some(sid) = self.free.pop() {
            self.slots[sid as usize].page = Some(page);
            sid
        } else {
            self.slots.push(Slot {
                page: Some(page),
                prev: NIL,
                next: NIL,
            });
            (self.slots.len() - 1) as u32
        }
    }

    fn page_at(&self, sid: u32) -> Arc<Page> {
        // Mapped slots always hold a page
        Arc::clone(
            self.slots[sid as usize]
                .page
                .as_ref()
                .unwrap_or_else(|| unreachable!("mapped slot without page")),
        )
    }

    /// Pages in least-to-most recently used order
    fn lru_pages(&self) -> Vec<Arc<Page>> {
        let mut pages = Vec::with_capacity(self.map.len());
        let mut sid = self.tail;
        while sid != NIL {
            if let Some(page) = &self.slots[sid as usize].page {
                pages.push(Arc::clone(page));
            }
            sid = self.slots[sid as usize].prev;
        }
        pages
    }
}

/// The process-wide page cache over `{data_dir}/Data`
pub struct PageCache {
    data_dir: PathBuf,
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl PageCache {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self::with_capacity(data_dir, MAX_CACHED_PAGES)
    }

    pub fn with_capacity(data_dir: impl Into<PathBuf>, capacity: usize) -> Self {
        PageCache {
            data_dir: data_dir.into(),
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::new()),
        }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// On-disk location of a page file
    pub fn page_path(&self, denomination: Denomination, page_no: u32) -> PathBuf {
        self.data_dir
            .join("Data")
            .join(format!("{:02x}", denomination.index()))
            .join(format!("{:02x}", page_no >> 8))
            .join(format!("{:04x}.bin", page_no))
    }

    fn lock_inner(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetch the page holding `coin`, loading it from disk on a miss
    pub fn get_page_for_coin(&self, coin: Coin) -> Result<Arc<Page>, StateError> {
        self.get_page(coin.denomination, coin.page_number())
    }

    /// Fetch a page by number, loading it from disk on a miss.
    /// The returned page is moved to the MRU end of the eviction list.
    pub fn get_page(
        &self,
        denomination: Denomination,
        page_no: u32,
    ) -> Result<Arc<Page>, StateError> {
        if page_no >= PAGES_PER_DENOMINATION {
            return Err(StateError::Core(
                raida_core::CoreError::SerialOutOfRange(page_no),
            ));
        }
        let key = (denomination.index(), page_no);

        {
            let mut inner = self.lock_inner();
            if let Some(&sid) = inner.map.get(&key) {
                inner.touch(sid);
                return Ok(inner.page_at(sid));
            }
        }

        // Miss: read the file with no cache lock held
        let bytes = self.read_page_file(denomination, page_no)?;
        let fresh = Arc::new(Page::new(denomination, page_no, PageData::new(bytes)));

        let mut victims = Vec::new();
        let page = {
            let mut inner = self.lock_inner();
            if let Some(&sid) = inner.map.get(&key) {
                // Lost the race to another thread; its copy wins
                inner.touch(sid);
                inner.page_at(sid)
            } else {
                let sid = inner.alloc(Arc::clone(&fresh));
                inner.map.insert(key, sid);
                inner.push_front(sid);
                while inner.map.len() > self.capacity {
                    let Some(vid) = inner.pop_tail() else { break };
                    if let Some(victim) = inner.slots[vid as usize].page.take() {
                        inner
                            .map
                            .remove(&(victim.denomination.index(), victim.number));
                        victims.push(victim);
                    }
                    inner.free.push(vid);
                }
                fresh
            }
        };

        for victim in victims {
            debug!(
                denomination = %victim.denomination,
                page = victim.number,
                "evicting page"
            );
            self.flush_if_dirty(&victim);
        }
        Ok(page)
    }

    fn read_page_file(
        &self,
        denomination: Denomination,
        page_no: u32,
    ) -> Result<Vec<u8>, StateError> {
        let path = self.page_path(denomination, page_no);
        let mut bytes = vec![0u8; PAGE_DATA_SIZE];
        let mut file = match fs::File::open(&path) {
            Ok(f) => f,
            // Absent pages start life zero-filled: every coin free
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(bytes),
            Err(e) => {
                return Err(StateError::PageIo {
                    path: path.display().to_string(),
                    source: e,
                })
            }
        };
        let mut filled = 0;
        while filled < PAGE_DATA_SIZE {
            match file.read(&mut bytes[filled..]) {
                Ok(0) => break, // short file: tail stays zero
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(StateError::PageIo {
                        path: path.display().to_string(),
                        source: e,
                    })
                }
            }
        }
        Ok(bytes)
    }

    /// Write a page's full data region to its file, with bounded retries
    pub fn sync_page(&self, page: &Page) -> Result<(), StateError> {
        let mut data = page.lock();
        self.write_locked(page, &mut data)
    }

    fn write_locked(
        &self,
        page: &Page,
        data: &mut crate::page::PageData,
    ) -> Result<(), StateError> {
        let path = self.page_path(page.denomination, page.number);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| StateError::PageIo {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        let mut last_err = None;
        for _ in 0..WRITE_RETRIES {
            match fs::File::create(&path).and_then(|mut f| f.write_all(data.bytes())) {
                Ok(()) => {
                    data.clear_dirty();
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(StateError::PageIo {
            path: path.display().to_string(),
            source: last_err.unwrap_or_else(|| ErrorKind::Other.into()),
        })
    }

    fn flush_if_dirty(&self, page: &Page) {
        let mut data = page.lock();
        if !data.is_dirty() {
            return;
        }
        if let Err(e) = self.write_locked(page, &mut data) {
            error!(
                denomination = %page.denomination,
                page = page.number,
                "page flush failed: {e}"
            );
        }
    }

    /// One pass of the background persistence thread: walk resident pages
    /// in LRU order and flush the dirty ones whose lock is free. Pages
    /// that are busy or fail to write stay dirty for the next cycle.
    pub fn flush_cycle(&self) -> usize {
        let pages = self.lock_inner().lru_pages();
        let mut flushed = 0;
        for page in pages {
            let Some(mut data) = page.try_lock() else {
                continue;
            };
            if !data.is_dirty() {
                continue;
            }
            match self.write_locked(&page, &mut data) {
                Ok(()) => flushed += 1,
                Err(e) => {
                    error!(
                        denomination = %page.denomination,
                        page = page.number,
                        "background flush failed, will retry: {e}"
                    );
                }
            }
        }
        flushed
    }

    /// Blocking flush of every dirty resident page (shutdown path)
    pub fn flush_all(&self) -> usize {
        let pages = self.lock_inner().lru_pages();
        let mut flushed = 0;
        for page in pages {
            let mut data = page.lock();
            if data.is_dirty() && self.write_locked(&page, &mut data).is_ok() {
                flushed += 1;
            }
        }
        flushed
    }

    pub fn resident_count(&self) -> usize {
        self.lock_inner().map.len()
    }

    pub fn dirty_count(&self) -> usize {
        self.lock_inner()
            .lru_pages()
            .iter()
            .filter_map(|p| p.try_lock().map(|d| d.is_dirty()))
            .filter(|&d| d)
            .count()
    }

    #[cfg(test)]
    pub(crate) fn is_resident(&self, denomination: Denomination, page_no: u32) -> bool {
        self.lock_inner()
            .map
            .contains_key(&(denomination.index(), page_no))
    }

    #[cfg(test)]
    pub(crate) fn lru_order(&self) -> Vec<u32> {
        self.lock_inner()
            .lru_pages()
            .iter()
            .map(|p| p.number)
            .collect()
    }
}
