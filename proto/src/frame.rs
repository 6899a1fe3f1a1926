//! Body framing and the handler reply type.
//!
//! A decrypted body is a 16-byte challenge, the command payload, then
//! the 0x3E 0x3E trailer.
//! Handlers consume the payload and produce a `Reply`; the response
//! assembly in `header` turns that into wire bytes.

use raida_core::record::An;
use raida_core::{Coin, Status, AN_SIZE};

/// Bytes of the leading challenge
pub const CHALLENGE_SIZE: usize = 16;

/// Mandatory end-of-frame trailer
pub const EOF_MARKER: [u8; 2] = [0x3E, 0x3E];

/// Hard cap on request body size
pub const MAX_BODY_SIZE: usize = 65_536;

/// A validated request body
pub struct RequestBody<'a> {
    pub challenge: [u8; CHALLENGE_SIZE],
    pub payload: &'a [u8],
}

/// Split a decrypted body into challenge and payload, checking the trailer
pub fn split_body(body: &[u8]) -> Result<RequestBody<'_>, Status> {
    if body.len() < CHALLENGE_SIZE + EOF_MARKER.len() {
        return Err(Status::InvalidPacketLength);
    }
    if body[body.len() - 2..] != EOF_MARKER {
        return Err(Status::InvalidEof);
    }
    let mut challenge = [0u8; CHALLENGE_SIZE];
    challenge.copy_from_slice(&body[..CHALLENGE_SIZE]);
    Ok(RequestBody {
        challenge,
        payload: &body[CHALLENGE_SIZE..body.len() - 2],
    })
}

/// What a command handler produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: Status,
    pub body: Vec<u8>,
}

impl Reply {
    /// A bare status with no body
    pub fn status(status: Status) -> Reply {
        Reply {
            status,
            body: Vec::new(),
        }
    }

    pub fn with_body(status: Status, body: Vec<u8>) -> Reply {
        Reply { status, body }
    }
}

/// Size of a (denomination, serial) wire record
pub const COIN_RECORD_SIZE: usize = 5;

/// Size of a coin record followed by one AN
pub const COIN_AN_RECORD_SIZE: usize = COIN_RECORD_SIZE + AN_SIZE;

/// Size of a coin record followed by two ANs
pub const COIN_AN2_RECORD_SIZE: usize = COIN_RECORD_SIZE + 2 * AN_SIZE;

fn an_at(buf: &[u8], offset: usize) -> An {
    let mut an = [0u8; AN_SIZE];
    an.copy_from_slice(&buf[offset..offset + AN_SIZE]);
    an
}

/// Parse a run of 5-byte coin records
pub fn parse_coin_list(payload: &[u8]) -> Result<Vec<Coin>, Status> {
    if payload.is_empty() || payload.len() % COIN_RECORD_SIZE != 0 {
        return Err(Status::InvalidPacketLength);
    }
    payload
        .chunks_exact(COIN_RECORD_SIZE)
        .map(|chunk| {
            let bytes: &[u8; COIN_RECORD_SIZE] =
                chunk.try_into().map_err(|_| Status::InvalidPacketLength)?;
            Coin::from_wire(bytes).map_err(|_| Status::InvalidSnOrDenomination)
        })
        .collect()
}

/// Parse a run of 21-byte records: coin + AN
pub fn parse_coin_an_list(payload: &[u8]) -> Result<Vec<(Coin, An)>, Status> {
    if payload.is_empty() || payload.len() % COIN_AN_RECORD_SIZE != 0 {
        return Err(Status::InvalidPacketLength);
    }
    payload
        .chunks_exact(COIN_AN_RECORD_SIZE)
        .map(|chunk| {
            let bytes: &[u8; COIN_RECORD_SIZE] = chunk[..COIN_RECORD_SIZE]
                .try_into()
                .map_err(|_| Status::InvalidPacketLength)?;
            let coin = Coin::from_wire(bytes).map_err(|_| Status::InvalidSnOrDenomination)?;
            Ok((coin, an_at(chunk, COIN_RECORD_SIZE)))
        })
        .collect()
}

/// Parse a run of 37-byte records: coin + two ANs
pub fn parse_coin_an2_list(payload: &[u8]) -> Result<Vec<(Coin, An, An)>, Status> {
    if payload.is_empty() || payload.len() % COIN_AN2_RECORD_SIZE != 0 {
        return Err(Status::InvalidPacketLength);
    }
    payload
        .chunks_exact(COIN_AN2_RECORD_SIZE)
        .map(|chunk| {
            let bytes: &[u8; COIN_RECORD_SIZE] = chunk[..COIN_RECORD_SIZE]
                .try_into()
                .map_err(|_| Status::InvalidPacketLength)?;
            let coin = Coin::from_wire(bytes).map_err(|_| Status::InvalidSnOrDenomination)?;
            Ok((
                coin,
                an_at(chunk, COIN_RECORD_SIZE),
                an_at(chunk, COIN_RECORD_SIZE + AN_SIZE),
            ))
        })
        .collect()
}

/// Pack per-coin pass/fail bits, coin 0 in the high bit of byte 0
pub fn pack_bitmap(results: &[bool]) -> Vec<u8> {
    let mut bitmap = vec![0u8; results.len().div_ceil(8)];
    for (i, &passed) in results.iter().enumerate() {
        if passed {
            bitmap[i / 8] |= 0x80 >> (i % 8);
        }
    }
    bitmap
}
