//! Record access shared by the command handlers.
//!
//! These helpers bundle the page lookup, the page lock and the bitmap
//! update so every caller changes MFS and the free bit in the same
//! critical section.

use crate::bitmap::FreeIndex;
use crate::cache::PageCache;
use crate::error::StateError;
use raida_core::record::{An, MFS_FREE};
use raida_core::Coin;

/// The AN currently stored for a coin
pub fn stored_an(cache: &PageCache, coin: Coin) -> Result<An, StateError> {
    let page = cache.get_page_for_coin(coin)?;
    let data = page.lock();
    Ok(data.an(coin.record_index()))
}

/// The MFS stamp currently stored for a coin
pub fn stored_mfs(cache: &PageCache, coin: Coin) -> Result<u8, StateError> {
    let page = cache.get_page_for_coin(coin)?;
    let data = page.lock();
    Ok(data.mfs(coin.record_index()))
}

/// Overwrite a coin's record, marking the page dirty and keeping the
/// free bitmap in step under the page lock.
pub fn write_coin(
    cache: &PageCache,
    free: &FreeIndex,
    coin: Coin,
    an: &An,
    mfs: u8,
) -> Result<(), StateError> {
    let page = cache.get_page_for_coin(coin)?;
    let mut data = page.lock();
    data.write_record(coin.record_index(), an, mfs);
    free.update_free(coin.denomination, coin.serial, mfs == MFS_FREE);
    Ok(())
}
