//! The ticket pool.
//!
//! A ticket is proof that this server authenticated a set of coins a
//! moment ago. Peers redeem it during Fix to cast their votes. Tickets
//! live in a fixed pool of slots, each behind its own mutex; allocation
//! try-locks its way across the pool so one stuck slot never blocks the
//! rest. Expiry is lazy: stale tickets are reaped whenever a scan
//! crosses them.

use raida_core::crypto::random_u32;
use raida_core::{Coin, Status};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

/// Number of ticket slots per process
pub const TICKET_POOL_SIZE: usize = 512;

/// Seconds a ticket stays redeemable
pub const TICKET_TTL_SECONDS: u64 = 300;

/// Most coins a single ticket may carry
pub const MAX_TICKET_COINS: usize = 4096;

struct TicketEntry {
    in_use: bool,
    created_at: Instant,
    id: u32,
    coins: Vec<Coin>,
    /// One claim bit per server in the ring
    claims: u32,
}

impl TicketEntry {
    fn empty() -> Self {
        TicketEntry {
            in_use: false,
            created_at: Instant::now(),
            id: 0,
            coins: Vec::new(),
            claims: 0,
        }
    }

    fn expired(&self) -> bool {
        self.in_use && self.created_at.elapsed().as_secs() >= TICKET_TTL_SECONDS
    }

    fn reap_if_expired(&mut self) {
        if self.expired() {
            self.in_use = false;
            self.coins = Vec::new();
            self.claims = 0;
        }
    }
}

/// Fixed pool of ticket slots
pub struct TicketPool {
    slots: Vec<Mutex<TicketEntry>>,
}

impl Default for TicketPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketPool {
    pub fn new() -> Self {
        TicketPool {
            slots: (0..TICKET_POOL_SIZE)
                .map(|_| Mutex::new(TicketEntry::empty()))
                .collect(),
        }
    }

    /// Issue a ticket for the given coins. Scans for a free slot with
    /// try-locks; a fully busy pool reports `NoTicketSlot`.
    pub fn issue(&self, coins: Vec<Coin>) -> Result<u32, Status> {
        if coins.is_empty() || coins.len() > MAX_TICKET_COINS {
            return Err(Status::NoTicketSlot);
        }
        let id = random_u32().map_err(|_| Status::Internal)?.max(1);
        for slot in &self.slots {
            let Ok(mut entry) = slot.try_lock() else {
                continue;
            };
            entry.reap_if_expired();
            if entry.in_use {
                continue;
            }
            entry.in_use = true;
            entry.created_at = Instant::now();
            entry.id = id;
            entry.coins = coins;
            entry.claims = 0;
            return Ok(id);
        }
        Err(Status::NoTicketSlot)
    }

    fn find(&self, id: u32) -> Result<MutexGuard<'_, TicketEntry>, Status> {
        for slot in &self.slots {
            let mut entry = slot.lock().unwrap_or_else(|e| e.into_inner());
            entry.reap_if_expired();
            if entry.in_use && entry.id == id {
                return Ok(entry);
            }
        }
        Err(Status::NoTicketFound)
    }

    /// Redeem a ticket on behalf of peer `raida_id`: marks the claim bit
    /// and returns the coins. A second claim by the same peer fails.
    pub fn claim(&self, id: u32, raida_id: u8) -> Result<Vec<Coin>, Status> {
        if raida_id as usize >= raida_core::RAIDA_COUNT {
            return Err(Status::InvalidRaidaId);
        }
        let mut entry = self.find(id)?;
        let bit = 1u32 << raida_id;
        if entry.claims & bit != 0 {
            return Err(Status::TicketClaimedAlready);
        }
        entry.claims |= bit;
        Ok(entry.coins.clone())
    }

    /// Coins of a live ticket without claiming it
    pub fn peek(&self, id: u32) -> Result<Vec<Coin>, Status> {
        Ok(self.find(id)?.coins.clone())
    }

    /// Number of live tickets (reaping as it scans)
    pub fn active(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| {
                let mut entry = slot.lock().unwrap_or_else(|e| e.into_inner());
                entry.reap_if_expired();
                entry.in_use
            })
            .count()
    }

    #[cfg(test)]
    fn backdate(&self, id: u32, secs: u64) {
        for slot in &self.slots {
            let mut entry = slot.lock().unwrap_or_else(|e| e.into_inner());
            if entry.in_use && entry.id == id {
                entry.created_at = Instant::now() - std::time::Duration::from_secs(secs);
            }
        }
    }
}
