//! The months-from-start issuance clock.
//!
//! MFS counts whole months since February 2023 and is stored as one byte
//! per record. Zero is reserved for "never issued", so the epoch month
//! itself stamps as zero only for free coins.

use chrono::{Datelike, Utc};

/// First year of the MFS epoch
pub const MFS_EPOCH_YEAR: i32 = 2023;

/// First month of the MFS epoch (February)
pub const MFS_EPOCH_MONTH: u32 = 2;

/// Months elapsed since February 2023 for a given calendar month,
/// clamped into the u8 range.
pub fn months_from_start(year: i32, month: u32) -> u8 {
    let months =
        (year as i64 - MFS_EPOCH_YEAR as i64) * 12 + (month as i64 - MFS_EPOCH_MONTH as i64);
    months.clamp(0, 255) as u8
}

/// Current MFS stamp from UTC wall-clock time
pub fn mfs_now() -> u8 {
    let now = Utc::now();
    months_from_start(now.year(), now.month())
}
