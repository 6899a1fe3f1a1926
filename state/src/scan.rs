//! Startup scan over persisted pages.
//!
//! One pass per denomination rebuilds everything derived from the page
//! files: the free-serial bitmap and both locker indexes. The scan reads
//! files directly instead of going through the cache so a cold start
//! does not evict its way through 15,000 pages.

use crate::bitmap::FreeIndex;
use crate::cache::PageCache;
use crate::error::StateError;
use crate::locker::{is_locker_an, is_trade_an, LockerStore};
use raida_core::record::MFS_FREE;
use raida_core::{Coin, Denomination, AN_SIZE, PAGES_PER_DENOMINATION, RECORDS_PER_PAGE, RECORD_SIZE};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use tracing::info;

/// What the startup scan found
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanSummary {
    pub pages_on_disk: u32,
    pub issued_coins: u64,
    pub locker_entries: usize,
    pub trade_entries: usize,
}

/// Rebuild the free bitmap and locker indexes from the page files
pub fn scan_data_dir(
    cache: &PageCache,
    free: &FreeIndex,
    lockers: &LockerStore,
) -> Result<ScanSummary, StateError> {
    let mut summary = ScanSummary::default();
    let mut locker_coins: HashMap<[u8; AN_SIZE], Vec<Coin>> = HashMap::new();
    let mut trade_coins: HashMap<[u8; AN_SIZE], Vec<Coin>> = HashMap::new();

    for d in Denomination::all() {
        for page_no in 0..PAGES_PER_DENOMINATION {
            let path = cache.page_path(d, page_no);
            let bytes = match fs::read(&path) {
                Ok(b) => b,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(StateError::PageIo {
                        path: path.display().to_string(),
                        source: e,
                    })
                }
            };
            summary.pages_on_disk += 1;

            let records = (bytes.len() / RECORD_SIZE).min(RECORDS_PER_PAGE as usize);
            for index in 0..records {
                let off = index * RECORD_SIZE;
                let mfs = bytes[off + AN_SIZE];
                if mfs == MFS_FREE {
                    continue;
                }
                let serial = page_no * RECORDS_PER_PAGE + index as u32;
                free.update_free(d, serial, false);
                summary.issued_coins += 1;

                let mut an = [0u8; AN_SIZE];
                an.copy_from_slice(&bytes[off..off + AN_SIZE]);
                let coin = Coin {
                    denomination: d,
                    serial,
                };
                if is_locker_an(&an) {
                    locker_coins.entry(an).or_default().push(coin);
                } else if is_trade_an(&an) {
                    trade_coins.entry(an).or_default().push(coin);
                }
            }
        }
    }

    summary.locker_entries = locker_coins.len();
    summary.trade_entries = trade_coins.len();
    for (an, coins) in locker_coins {
        lockers.lockers.add(an, &coins);
    }
    for (an, coins) in trade_coins {
        lockers.trade.add(an, &coins);
    }

    info!(
        pages = summary.pages_on_disk,
        issued = summary.issued_coins,
        lockers = summary.locker_entries,
        trade_lockers = summary.trade_entries,
        "startup scan complete"
    );
    Ok(summary)
}
