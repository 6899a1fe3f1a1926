//! Locker and trade-locker indexes.
//!
//! A locker is a collection of coins that all carry the same 16-byte AN.
//! The AN tail discriminates the kind: bytes 12..16 all 0xFF for a plain
//! locker, bytes 14..16 = 0xEE 0xEE for a trade locker. Trade lockers
//! additionally carry the sale terms inside the AN: byte 9 is the
//! currency code and bytes 10..14 the asking price, big-endian.

use raida_core::record::An;
use raida_core::Coin;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Tail bytes marking a plain locker AN
pub const LOCKER_TAG: [u8; 4] = [0xFF; 4];

/// Tail bytes marking a trade-locker AN
pub const TRADE_TAG: [u8; 2] = [0xEE; 2];

/// Coin lists grow in chunks of this many entries
const COIN_LIST_INCREMENT: usize = 32;

pub fn is_locker_an(an: &An) -> bool {
    an[12..16] == LOCKER_TAG
}

pub fn is_trade_an(an: &An) -> bool {
    an[14..16] == TRADE_TAG
}

/// Currency code a trade locker is priced in
pub fn trade_currency(an: &An) -> u8 {
    an[9]
}

/// Asking price packed into a trade-locker AN
pub fn trade_price(an: &An) -> u32 {
    u32::from_be_bytes([an[10], an[11], an[12], an[13]])
}

/// One AN-keyed index of coin collections
pub struct LockerIndex {
    entries: Mutex<HashMap<An, Vec<Coin>>>,
}

impl Default for LockerIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl LockerIndex {
    pub fn new() -> Self {
        LockerIndex {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<An, Vec<Coin>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add coins to a locker, creating the entry on first use
    pub fn add(&self, an: An, coins: &[Coin]) {
        let mut entries = self.lock();
        let list = entries
            .entry(an)
            .or_insert_with(|| Vec::with_capacity(COIN_LIST_INCREMENT));
        if list.len() + coins.len() > list.capacity() {
            list.reserve(COIN_LIST_INCREMENT.max(coins.len()));
        }
        list.extend_from_slice(coins);
    }

    /// True iff the locker holds exactly this coin
    pub fn contains(&self, an: &An, coin: Coin) -> bool {
        self.lock()
            .get(an)
            .is_some_and(|list| list.contains(&coin))
    }

    /// Remove one coin; a locker left empty is freed
    pub fn remove_coin(&self, an: &An, coin: Coin) -> bool {
        let mut entries = self.lock();
        let Some(list) = entries.get_mut(an) else {
            return false;
        };
        let Some(pos) = list.iter().position(|c| *c == coin) else {
            return false;
        };
        list.swap_remove(pos);
        if list.is_empty() {
            entries.remove(an);
        }
        true
    }

    /// Drop a whole locker, returning its coins
    pub fn take(&self, an: &An) -> Option<Vec<Coin>> {
        self.lock().remove(an)
    }

    /// The coins of a locker, if it exists
    pub fn peek(&self, an: &An) -> Option<Vec<Coin>> {
        self.lock().get(an).cloned()
    }

    /// Trade lockers priced in `currency`, up to `max` entries
    pub fn list_by_currency(&self, currency: u8, max: usize) -> Vec<(An, Vec<Coin>)> {
        self.lock()
            .iter()
            .filter(|(an, _)| trade_currency(an) == currency)
            .take(max)
            .map(|(an, coins)| (*an, coins.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Both indexes: plain lockers and trade lockers
#[derive(Default)]
pub struct LockerStore {
    pub lockers: LockerIndex,
    pub trade: LockerIndex,
}

impl LockerStore {
    pub fn new() -> Self {
        Self::default()
    }
}
