//! Background page persistence.
//!
//! A dedicated thread wakes on a fixed period, walks the cache in LRU
//! order and flushes whatever dirty pages it can try-lock. Writes that
//! fail stay dirty and are retried next cycle. On shutdown the thread
//! performs one final blocking flush of everything.

use crate::cache::PageCache;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

const TICK: Duration = Duration::from_millis(250);

/// Handle to the persistence thread
pub struct Flusher {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Flusher {
    /// Spawn the persistence thread with the given flush period
    pub fn spawn(cache: Arc<PageCache>, period: Duration) -> std::io::Result<Flusher> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = thread::Builder::new()
            .name("page-flusher".into())
            .spawn(move || {
                let mut since_flush = Duration::ZERO;
                while !flag.load(Ordering::Relaxed) {
                    thread::sleep(TICK);
                    since_flush += TICK;
                    if since_flush >= period {
                        since_flush = Duration::ZERO;
                        let flushed = cache.flush_cycle();
                        if flushed > 0 {
                            debug!(flushed, "background flush cycle");
                        }
                    }
                }
                let flushed = cache.flush_all();
                info!(flushed, "final flush on shutdown");
            })?;

        Ok(Flusher {
            shutdown,
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for its final flush
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Flusher {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
