//! The executive: every shared subsystem a command handler touches.
//!
//! Built once at startup and passed by reference through dispatch.
//! There are no process globals; tests construct one over a tempdir.

use crate::stats::Stats;
use raida_core::record::An;
use raida_core::{Coin, Status};
use raida_state::{records, FreeIndex, LockerStore, PageCache};
use std::sync::Arc;

pub struct Executive {
    pub raida_id: u8,
    pub admin_key: An,
    pub cache: Arc<PageCache>,
    pub free: Arc<FreeIndex>,
    pub lockers: Arc<LockerStore>,
    pub stats: Arc<Stats>,
}

impl Executive {
    pub(crate) fn stored_an(&self, coin: Coin) -> Result<An, Status> {
        records::stored_an(&self.cache, coin).map_err(|_| Status::Internal)
    }

    pub(crate) fn write_coin(&self, coin: Coin, an: &An, mfs: u8) -> Result<(), Status> {
        records::write_coin(&self.cache, &self.free, coin, an, mfs).map_err(|_| Status::Internal)
    }

    /// XOR of the stored ANs of a batch
    pub(crate) fn xor_stored(&self, coins: &[Coin]) -> Result<An, Status> {
        let mut acc = [0u8; 16];
        for coin in coins {
            let stored = self.stored_an(*coin)?;
            for (a, b) in acc.iter_mut().zip(stored.iter()) {
                *a ^= b;
            }
        }
        Ok(acc)
    }
}
