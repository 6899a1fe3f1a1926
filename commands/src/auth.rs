//! Authentication commands.
//!
//! Detect proves knowledge of ANs without changing anything. Pown proves
//! knowledge and transfers ownership by writing new ANs. The Sum
//! variants batch a whole request into one 16-byte XOR so the wire
//! carries 5 bytes per coin instead of 21.

use crate::exec::Executive;
use raida_core::clock::mfs_now;
use raida_core::record::AN_SIZE;
use raida_core::Status;
use raida_proto::frame::{pack_bitmap, parse_coin_an2_list, parse_coin_an_list, parse_coin_list, Reply};

/// Per-coin authenticity check. ALL_PASS and ALL_FAIL carry no body;
/// a mixed batch returns the per-coin bitmap.
pub fn detect(exec: &Executive, payload: &[u8]) -> Reply {
    let records = match parse_coin_an_list(payload) {
        Ok(r) => r,
        Err(status) => return Reply::status(status),
    };

    let mut results = Vec::with_capacity(records.len());
    let mut passed = 0usize;
    for (coin, an) in &records {
        let ok = match exec.stored_an(*coin) {
            Ok(stored) => stored == *an,
            Err(status) => return Reply::status(status),
        };
        results.push(ok);
        if ok {
            passed += 1;
        }
    }
    exec.stats.add_detects(records.len() as u64);

    match Status::from_batch(passed, results.len()) {
        Status::Mixed => Reply::with_body(Status::Mixed, pack_bitmap(&results)),
        status => Reply::status(status),
    }
}

/// Whole-batch authenticity via one XOR accumulator. No bitmap: the
/// batch passes or fails as a unit.
pub fn detect_sum(exec: &Executive, payload: &[u8]) -> Reply {
    if payload.len() <= AN_SIZE || (payload.len() - AN_SIZE) % 5 != 0 {
        return Reply::status(Status::InvalidPacketLength);
    }
    let split = payload.len() - AN_SIZE;
    let coins = match parse_coin_list(&payload[..split]) {
        Ok(c) => c,
        Err(status) => return Reply::status(status),
    };
    let expected = &payload[split..];

    let acc = match exec.xor_stored(&coins) {
        Ok(a) => a,
        Err(status) => return Reply::status(status),
    };
    exec.stats.add_detects(coins.len() as u64);

    if acc == expected {
        Reply::status(Status::AllPass)
    } else {
        Reply::status(Status::AllFail)
    }
}

/// Proof of ownership: verify the current AN, then write the new one
/// and stamp the issuance month. Returns the per-coin bitmap.
pub fn pown(exec: &Executive, payload: &[u8]) -> Reply {
    let records = match parse_coin_an2_list(payload) {
        Ok(r) => r,
        Err(status) => return Reply::status(status),
    };

    let mfs = mfs_now();
    let mut results = Vec::with_capacity(records.len());
    let mut passed = 0usize;
    for (coin, current, new_an) in &records {
        let stored = match exec.stored_an(*coin) {
            Ok(a) => a,
            Err(status) => return Reply::status(status),
        };
        if stored != *current {
            results.push(false);
            continue;
        }
        if let Err(status) = exec.write_coin(*coin, new_an, mfs) {
            return Reply::status(status);
        }
        results.push(true);
        passed += 1;
    }
    exec.stats.add_powns(passed as u64);

    if passed == 0 {
        Reply::status(Status::AllFail)
    } else {
        Reply::with_body(Status::Mixed, pack_bitmap(&results))
    }
}

/// Batch ownership transfer: verify the XOR of the stored ANs, then
/// XOR every AN with the supplied delta.
pub fn pown_sum(exec: &Executive, payload: &[u8]) -> Reply {
    let trailer = 2 * AN_SIZE;
    if payload.len() <= trailer || (payload.len() - trailer) % 5 != 0 {
        return Reply::status(Status::InvalidPacketLength);
    }
    let split = payload.len() - trailer;
    let coins = match parse_coin_list(&payload[..split]) {
        Ok(c) => c,
        Err(status) => return Reply::status(status),
    };
    let expected = &payload[split..split + AN_SIZE];
    let delta = &payload[split + AN_SIZE..];

    let acc = match exec.xor_stored(&coins) {
        Ok(a) => a,
        Err(status) => return Reply::status(status),
    };
    if acc != expected {
        return Reply::status(Status::AllFail);
    }

    let mfs = mfs_now();
    for coin in &coins {
        let stored = match exec.stored_an(*coin) {
            Ok(a) => a,
            Err(status) => return Reply::status(status),
        };
        let mut new_an = stored;
        for (a, b) in new_an.iter_mut().zip(delta.iter()) {
            *a ^= b;
        }
        if let Err(status) = exec.write_coin(*coin, &new_an, mfs) {
            return Reply::status(status);
        }
    }
    exec.stats.add_powns(coins.len() as u64);
    Reply::status(Status::AllPass)
}
