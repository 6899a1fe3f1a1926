//! Free-serial bitmap.
//!
//! One bit per serial number per denomination: set means the record's MFS
//! byte is zero and the coin can be issued. The bitmap answers "which
//! serials are free" without touching pages; any write that changes an
//! MFS byte must update the bit inside the same page critical section.

use raida_core::{Denomination, MAX_SERIAL, TOTAL_DENOMINATIONS};
use std::sync::{Mutex, MutexGuard};

const WORD_BITS: u32 = 64;
const WORDS_PER_DENOMINATION: usize = (MAX_SERIAL / WORD_BITS) as usize;

struct Bitset {
    words: Vec<u64>,
}

impl Bitset {
    fn all_free() -> Self {
        Bitset {
            words: vec![u64::MAX; WORDS_PER_DENOMINATION],
        }
    }

    fn set(&mut self, serial: u32, free: bool) {
        let word = (serial / WORD_BITS) as usize;
        let bit = serial % WORD_BITS;
        if free {
            self.words[word] |= 1u64 << bit;
        } else {
            self.words[word] &= !(1u64 << bit);
        }
    }

    fn get(&self, serial: u32) -> bool {
        let word = (serial / WORD_BITS) as usize;
        let bit = serial % WORD_BITS;
        self.words[word] & (1u64 << bit) != 0
    }
}

/// Per-denomination free bitmaps under per-denomination locks
pub struct FreeIndex {
    denoms: Vec<Mutex<Bitset>>,
}

impl Default for FreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FreeIndex {
    /// A fresh index where every serial is free
    pub fn new() -> Self {
        FreeIndex {
            denoms: (0..TOTAL_DENOMINATIONS)
                .map(|_| Mutex::new(Bitset::all_free()))
                .collect(),
        }
    }

    fn lock(&self, d: Denomination) -> MutexGuard<'_, Bitset> {
        self.denoms[d.index()]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Set or clear the free bit for one serial
    pub fn update_free(&self, d: Denomination, serial: u32, free: bool) {
        if serial < MAX_SERIAL {
            self.lock(d).set(serial, free);
        }
    }

    pub fn is_free(&self, d: Denomination, serial: u32) -> bool {
        serial < MAX_SERIAL && self.lock(d).get(serial)
    }

    /// Up to `want` free serials in ascending order
    pub fn available_sns(&self, d: Denomination, want: usize) -> Vec<u32> {
        let bits = self.lock(d);
        let mut out = Vec::with_capacity(want.min(64));
        'scan: for (wi, &word) in bits.words.iter().enumerate() {
            let mut w = word;
            while w != 0 {
                let bit = w.trailing_zeros();
                out.push(wi as u32 * WORD_BITS + bit);
                if out.len() >= want {
                    break 'scan;
                }
                w &= w - 1;
            }
        }
        out
    }

    /// Number of free serials in a denomination
    pub fn free_count(&self, d: Denomination) -> u64 {
        self.lock(d)
            .words
            .iter()
            .map(|w| w.count_ones() as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn denom() -> Denomination {
        Denomination::new(1).unwrap()
    }

    #[test]
    fn test_starts_all_free() {
        let index = FreeIndex::new();
        assert!(index.is_free(denom(), 0));
        assert!(index.is_free(denom(), MAX_SERIAL - 1));
        assert_eq!(index.free_count(denom()), MAX_SERIAL as u64);
    }

    #[test]
    fn test_update_and_query() {
        let index = FreeIndex::new();
        index.update_free(denom(), 100, false);
        assert!(!index.is_free(denom(), 100));
        assert!(index.is_free(denom(), 99));
        assert!(index.is_free(denom(), 101));

        index.update_free(denom(), 100, true);
        assert!(index.is_free(denom(), 100));
    }

    #[test]
    fn test_denominations_are_independent(){
        let index = FreeIndex::new();
        let other = Denomination::new(2).unwrap();
        index.update_free(denom(), 5, false);
        assert!(index.is_free(other, 5));
    }

    #[test]
    fn test_available_ascending_and_bounded() {
        let index = FreeIndex::new();
        for s in 0..200 {
            index.update_free(denom(), s, false);
        }
        index.update_free(denom(), 64, true);

        let sns = index.available_sns(denom(), 3);
        assert_eq!(sns, vec![64, 200, 201]);
    }

    #[test]
    fn test_out_of_range_serial_ignored() {
        let index = FreeIndex::new();
        index.update_free(denom(), MAX_SERIAL, false);
        assert!(!index.is_free(denom(), MAX_SERIAL));
        assert_eq!(index.free_count(denom()), MAX_SERIAL as u64);
    }
}
