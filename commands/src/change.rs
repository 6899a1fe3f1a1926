//! Denomination change: Break and Join.
//!
//! Both are two-phase. Every check runs before the first write so a
//! failed request leaves no visible change; page reservations taken via
//! Available-SNs fence off the target serials while the client builds
//! the follow-up request.

use crate::exec::Executive;
use raida_core::clock::mfs_now;
use raida_core::crypto::{derive_an, random_bytes};
use raida_core::record::{An, MFS_FREE};
use raida_core::{Coin, Denomination, Status, RECORDS_PER_PAGE};
use raida_proto::frame::{parse_coin_an_list, Reply};
use tracing::debug;

/// Small coins consumed or produced by one change operation
pub const CHANGE_COIN_COUNT: usize = 10;

/// Most serials returned by one Available-SNs call
const AVAILABLE_SNS_LIMIT: usize = 64;

const OP_BREAK: u8 = 0x1;
const OP_JOIN: u8 = 0x2;

/// Find and reserve free serials in the target denomination.
/// Response: target denomination byte followed by 4-byte serials.
pub fn available_sns(exec: &Executive, payload: &[u8]) -> Reply {
    if payload.len() != 6 {
        return Reply::status(Status::InvalidPacketLength);
    }
    let session = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    let op = payload[4];
    let Ok(d) = Denomination::from_wire(payload[5]) else {
        return Reply::status(Status::InvalidSnOrDenomination);
    };
    if session == 0 {
        return Reply::status(Status::InvalidPacketLength);
    }

    let target = match op {
        OP_BREAK => d.smaller(),
        OP_JOIN => d.larger(),
        _ => return Reply::status(Status::InvalidCommand),
    };
    let Some(target) = target else {
        return Reply::status(Status::InvalidSnOrDenomination);
    };

    let mut serials: Vec<u32> = Vec::new();
    for page_no in 0..raida_core::PAGES_PER_DENOMINATION {
        let page = match exec.cache.get_page(target, page_no) {
            Ok(p) => p,
            Err(_) => return Reply::status(Status::Internal),
        };
        let mut data = page.lock();
        if data.is_reserved() && !data.is_reserved_by(session) {
            continue;
        }
        data.reserve(session);
        for index in 0..RECORDS_PER_PAGE as usize {
            if data.is_free(index) {
                serials.push(page_no * RECORDS_PER_PAGE + index as u32);
                if serials.len() >= AVAILABLE_SNS_LIMIT {
                    break;
                }
            }
        }
        if serials.len() >= AVAILABLE_SNS_LIMIT {
            break;
        }
    }

    debug!(session, target = %target, found = serials.len(), "serials reserved");
    let mut body = Vec::with_capacity(1 + serials.len() * 4);
    body.push(target.to_wire());
    for serial in serials {
        body.extend_from_slice(&serial.to_be_bytes());
    }
    Reply::with_body(Status::Success, body)
}

struct ChangeRequest {
    session: u32,
    large: (Coin, An),
    smalls: Vec<(Coin, An)>,
}

fn parse_change(payload: &[u8]) -> Result<ChangeRequest, Status> {
    let expected = 4 + 21 * (1 + CHANGE_COIN_COUNT);
    if payload.len() != expected {
        return Err(Status::InvalidPacketLength);
    }
    let session = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
    if session == 0 {
        return Err(Status::InvalidPacketLength);
    }
    let mut records = parse_coin_an_list(&payload[4..])?;
    let large = records.remove(0);

    let Some(small_denom) = large.0.denomination.smaller() else {
        return Err(Status::InvalidSnOrDenomination);
    };
    if records.iter().any(|(c, _)| c.denomination != small_denom) {
        return Err(Status::InvalidSnOrDenomination);
    }
    Ok(ChangeRequest {
        session,
        large,
        smalls: records,
    })
}

/// Break one coin into ten of the next denomination down. The small
/// targets must sit on pages reserved by this session and be free; the
/// large coin is destroyed by rehashing its AN and zeroing its MFS.
pub fn break_coin(exec: &Executive, encryption_type: u8, payload: &[u8]) -> Reply {
    let req = match parse_change(payload) {
        Ok(r) => r,
        Err(status) => return Reply::status(status),
    };
    let (large, large_an) = req.large;

    // Validation phase: no writes until everything checks out
    match exec.stored_an(large) {
        Ok(stored) if stored == large_an => {}
        Ok(_) => return Reply::status(Status::AllFail),
        Err(status) => return Reply::status(status),
    }
    for (coin, _) in &req.smalls {
        let page = match exec.cache.get_page_for_coin(*coin) {
            Ok(p) => p,
            Err(_) => return Reply::status(Status::Internal),
        };
        let mut data = page.lock();
        if !data.is_reserved_by(req.session) {
            return Reply::status(Status::PageIsNotReserved);
        }
        if !data.is_free(coin.record_index()) {
            return Reply::status(Status::InvalidSnOrDenomination);
        }
    }

    // Mutation phase
    let mfs = mfs_now();
    for (coin, an) in &req.smalls {
        if let Err(status) = exec.write_coin(*coin, an, mfs) {
            return Reply::status(status);
        }
    }
    let mut pg = [0u8; 16];
    if random_bytes(&mut pg).is_err() {
        return Reply::status(Status::Internal);
    }
    let retired = derive_an(
        encryption_type,
        &[
            &[exec.raida_id],
            &[large.denomination.to_wire()],
            &large.serial.to_be_bytes(),
            &pg,
        ],
    );
    if let Err(status) = exec.write_coin(large, &retired, MFS_FREE) {
        return Reply::status(status);
    }
    Reply::status(Status::AllPass)
}

/// Join ten coins into one of the next denomination up: the inverse of
/// Break. All ten smalls must authenticate; the large target's page
/// must be reserved by this session and the target serial free.
pub fn join_coins(exec: &Executive, encryption_type: u8, payload: &[u8]) -> Reply {
    let req = match parse_change(payload) {
        Ok(r) => r,
        Err(status) => return Reply::status(status),
    };
    let (large, large_an) = req.large;

    for (coin, an) in &req.smalls {
        match exec.stored_an(*coin) {
            Ok(stored) if stored == *an => {}
            Ok(_) => return Reply::status(Status::AllFail),
            Err(status) => return Reply::status(status),
        }
    }
    {
        let page = match exec.cache.get_page_for_coin(large) {
            Ok(p) => p,
            Err(_) => return Reply::status(Status::Internal),
        };
        let mut data = page.lock();
        if !data.is_reserved_by(req.session) {
            return Reply::status(Status::PageIsNotReserved);
        }
        if !data.is_free(large.record_index()) {
            return Reply::status(Status::InvalidSnOrDenomination);
        }
    }

    let mut pg = [0u8; 16];
    if random_bytes(&mut pg).is_err() {
        return Reply::status(Status::Internal);
    }
    for (coin, _) in &req.smalls {
        let retired = derive_an(
            encryption_type,
            &[
                &[exec.raida_id],
                &[coin.denomination.to_wire()],
                &coin.serial.to_be_bytes(),
                &pg,
            ],
        );
        if let Err(status) = exec.write_coin(*coin, &retired, MFS_FREE) {
            return Reply::status(status);
        }
    }
    if let Err(status) = exec.write_coin(large, &large_an, mfs_now()) {
        return Reply::status(status);
    }
    Reply::status(Status::AllPass)
}
