// Request counters for the admin stats command

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters, updated lock-free from the handlers
#[derive(Default)]
pub struct Stats {
    pub requests: AtomicU64,
    pub errors: AtomicU64,
    pub detect_coins: AtomicU64,
    pub pown_coins: AtomicU64,
    pub lockers_stored: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_detects(&self, n: u64) {
        self.detect_coins.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_powns(&self, n: u64) {
        self.pown_coins.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_lockers(&self, n: u64) {
        self.lockers_stored.fetch_add(n, Ordering::Relaxed);
    }

    /// Counters as big-endian u64 fields, in wire order
    pub fn snapshot(&self) -> [u64; 5] {
        [
            self.requests.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
            self.detect_coins.load(Ordering::Relaxed),
            self.pown_coins.load(Ordering::Relaxed),
            self.lockers_stored.load(Ordering::Relaxed),
        ]
    }
}
