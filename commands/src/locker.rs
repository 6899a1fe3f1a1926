//! Locker and marketplace commands.
//!
//! Storing a batch in a locker sets every coin's AN to the locker AN,
//! so possession of the locker AN is possession of the coins. Trade
//! lockers carry their sale terms inside the AN and live in a second
//! index scanned by the marketplace commands.

use crate::exec::Executive;
use raida_core::clock::mfs_now;
use raida_core::denomination::coin_value;
use raida_core::record::{An, AN_SIZE};
use raida_core::{Coin, Status};
use raida_proto::frame::{
    pack_bitmap, parse_coin_list, Reply, COIN_RECORD_SIZE,
};
use raida_state::locker::{is_locker_an, is_trade_an, trade_currency, trade_price};
use raida_state::LockerIndex;
use tracing::debug;

/// Bytes of a List-for-Sale response record
const SALE_RECORD_SIZE: usize = AN_SIZE + 1 + 8 + 4;

fn an_at(buf: &[u8], offset: usize) -> An {
    let mut an = [0u8; AN_SIZE];
    an.copy_from_slice(&buf[offset..offset + AN_SIZE]);
    an
}

/// Shared store path: verify the batch XOR, rewrite the coins to the
/// locker AN, register the collection in the given index.
fn store_into(exec: &Executive, index: &LockerIndex, payload: &[u8]) -> Result<usize, Status> {
    let trailer = 2 * AN_SIZE;
    if payload.len() <= trailer || (payload.len() - trailer) % COIN_RECORD_SIZE != 0 {
        return Err(Status::InvalidPacketLength);
    }
    let split = payload.len() - trailer;
    let coins = parse_coin_list(&payload[..split])?;
    let expected = &payload[split..split + AN_SIZE];
    let locker_an = an_at(payload, split + AN_SIZE);

    if exec.xor_stored(&coins)? != expected {
        return Err(Status::AllFail);
    }

    let mfs = mfs_now();
    for coin in &coins {
        exec.write_coin(*coin, &locker_an, mfs)?;
    }
    index.add(locker_an, &coins);
    exec.stats.add_lockers(1);
    debug!(coins = coins.len(), "locker stored");
    Ok(coins.len())
}

/// Park a batch of coins in a locker
pub fn store_sum(exec: &Executive, payload: &[u8]) -> Reply {
    if payload.len() >= AN_SIZE && !is_locker_an(&an_at(payload, payload.len() - AN_SIZE)) {
        return Reply::status(Status::InvalidSnOrDenomination);
    }
    match store_into(exec, &exec.lockers.lockers, payload) {
        Ok(_) => Reply::status(Status::AllPass),
        Err(status) => Reply::status(status),
    }
}

/// Park a batch in a trade locker whose AN carries currency and price
pub fn put_for_sale(exec: &Executive, payload: &[u8]) -> Reply {
    if payload.len() >= AN_SIZE && !is_trade_an(&an_at(payload, payload.len() - AN_SIZE)) {
        return Reply::status(Status::InvalidSnOrDenomination);
    }
    match store_into(exec, &exec.lockers.trade, payload) {
        Ok(_) => Reply::status(Status::AllPass),
        Err(status) => Reply::status(status),
    }
}

/// Several independent store operations in one request. The response
/// body carries one pass/fail byte per locker.
pub fn multi_store_sum(exec: &Executive, payload: &[u8]) -> Reply {
    if payload.is_empty() {
        return Reply::status(Status::InvalidPacketLength);
    }
    let count = payload[0] as usize;
    if count == 0 {
        return Reply::status(Status::InvalidPacketLength);
    }

    let mut cursor = 1usize;
    let mut results = Vec::with_capacity(count);
    for _ in 0..count {
        if cursor >= payload.len() {
            return Reply::status(Status::InvalidPacketLength);
        }
        let coins = payload[cursor] as usize;
        let block_len = 1 + coins * COIN_RECORD_SIZE + 2 * AN_SIZE;
        if coins == 0 || cursor + block_len > payload.len() {
            return Reply::status(Status::InvalidPacketLength);
        }
        let block = &payload[cursor + 1..cursor + block_len];
        let locker_an = an_at(block, block.len() - AN_SIZE);
        let stored = is_locker_an(&locker_an)
            && store_into(exec, &exec.lockers.lockers, block).is_ok();
        results.push(stored);
        cursor += block_len;
    }
    if cursor != payload.len() {
        return Reply::status(Status::InvalidPacketLength);
    }

    let passed = results.iter().filter(|&&r| r).count();
    let body = results.iter().map(|&r| r as u8).collect();
    Reply::with_body(Status::from_batch(passed, results.len()), body)
}

/// Shared removal path over either index
fn remove_from(exec: &Executive, index: &LockerIndex, payload: &[u8]) -> Reply {
    let record_size = 2 * AN_SIZE + COIN_RECORD_SIZE;
    if payload.is_empty() || payload.len() % record_size != 0 {
        return Reply::status(Status::InvalidPacketLength);
    }

    let mfs = mfs_now();
    let mut results = Vec::new();
    let mut passed = 0usize;
    for chunk in payload.chunks_exact(record_size) {
        let locker_an = an_at(chunk, 0);
        let coin_bytes: &[u8; COIN_RECORD_SIZE] = match chunk
            [AN_SIZE..AN_SIZE + COIN_RECORD_SIZE]
            .try_into()
        {
            Ok(b) => b,
            Err(_) => return Reply::status(Status::InvalidPacketLength),
        };
        let Ok(coin) = Coin::from_wire(coin_bytes) else {
            return Reply::status(Status::InvalidSnOrDenomination);
        };
        let new_an = an_at(chunk, AN_SIZE + COIN_RECORD_SIZE);

        if !index.contains(&locker_an, coin) {
            results.push(false);
            continue;
        }
        if let Err(status) = exec.write_coin(coin, &new_an, mfs) {
            return Reply::status(status);
        }
        index.remove_coin(&locker_an, coin);
        results.push(true);
        passed += 1;
    }

    match Status::from_batch(passed, results.len()) {
        Status::Mixed => Reply::with_body(Status::Mixed, pack_bitmap(&results)),
        status => Reply::status(status),
    }
}

/// Take coins out of a locker, giving each a fresh owner AN
pub fn remove(exec: &Executive, payload: &[u8]) -> Reply {
    remove_from(exec, &exec.lockers.lockers, payload)
}

/// Take coins out of a trade locker
pub fn remove_trade(exec: &Executive, payload: &[u8]) -> Reply {
    remove_from(exec, &exec.lockers.trade, payload)
}

fn peek_index(index: &LockerIndex, payload: &[u8]) -> Reply {
    if payload.len() != AN_SIZE {
        return Reply::status(Status::InvalidPacketLength);
    }
    let an = an_at(payload, 0);
    match index.peek(&an) {
        Some(coins) => {
            let mut body = Vec::with_capacity(coins.len() * COIN_RECORD_SIZE);
            for coin in coins {
                body.extend_from_slice(&coin.to_wire());
            }
            Reply::with_body(Status::Success, body)
        }
        None => Reply::status(Status::AllFail),
    }
}

/// List a locker's contents as (denomination, serial) pairs
pub fn peek(exec: &Executive, payload: &[u8]) -> Reply {
    peek_index(&exec.lockers.lockers, payload)
}

/// List a trade locker's contents
pub fn peek_trade(exec: &Executive, payload: &[u8]) -> Reply {
    peek_index(&exec.lockers.trade, payload)
}

/// Everything for sale in one currency: 29-byte records of
/// locker AN, currency, total value and asking price.
pub fn list_for_sale(exec: &Executive, payload: &[u8]) -> Reply {
    if payload.len() != 2 {
        return Reply::status(Status::InvalidPacketLength);
    }
    let currency = payload[0];
    let max = payload[1] as usize;

    let entries = exec.lockers.trade.list_by_currency(currency, max.max(1));
    let mut body = Vec::with_capacity(entries.len() * SALE_RECORD_SIZE);
    for (an, coins) in entries {
        let value: u64 = coins
            .iter()
            .map(|c| coin_value(c.denomination, c.serial))
            .sum();
        body.extend_from_slice(&an);
        body.push(currency);
        body.extend_from_slice(&value.to_be_bytes());
        body.extend_from_slice(&trade_price(&an).to_be_bytes());
    }
    Reply::with_body(Status::Success, body)
}

/// Buy a trade locker whose currency, total value and price match
/// exactly, moving its coins into the buyer's locker.
pub fn buy(exec: &Executive, payload: &[u8]) -> Reply {
    if payload.len() != AN_SIZE + 1 + 8 + 4 {
        return Reply::status(Status::InvalidPacketLength);
    }
    let buyer_an = an_at(payload, 0);
    let currency = payload[AN_SIZE];
    let mut amount_bytes = [0u8; 8];
    amount_bytes.copy_from_slice(&payload[AN_SIZE + 1..AN_SIZE + 9]);
    let amount = u64::from_be_bytes(amount_bytes);
    let mut price_bytes = [0u8; 4];
    price_bytes.copy_from_slice(&payload[AN_SIZE + 9..AN_SIZE + 13]);
    let price = u32::from_be_bytes(price_bytes);
    if !is_locker_an(&buyer_an) {
        return Reply::status(Status::InvalidSnOrDenomination);
    }

    let candidates = exec.lockers.trade.list_by_currency(currency, usize::MAX);
    let matched = candidates.into_iter().find(|(an, coins)| {
        let value: u64 = coins
            .iter()
            .map(|c| coin_value(c.denomination, c.serial))
            .sum();
        trade_currency(an) == currency && trade_price(an) == price && value == amount
    });
    let Some((trade_an, _)) = matched else {
        return Reply::status(Status::AllFail);
    };

    let Some(coins) = exec.lockers.trade.take(&trade_an) else {
        return Reply::status(Status::AllFail);
    };
    let mfs = mfs_now();
    for coin in &coins {
        if let Err(status) = exec.write_coin(*coin, &buyer_an, mfs) {
            return Reply::status(status);
        }
    }
    exec.lockers.lockers.add(buyer_an, &coins);
    Reply::status(Status::Success)
}
