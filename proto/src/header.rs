//! Request and response headers.
//!
//! Both directions use a fixed 32-byte header. The nominal 12-byte nonce
//! field starting at offset 24 is truncated by the header boundary, so
//! only 8 nonce bytes travel on the wire and the last two of them double
//! as the echo bytes; the in-memory nonce is zero-extended to 12 bytes
//! for the CTR IV.

use crate::crypt::{self, apply_ctr};
use raida_core::bytes::{read_u16_be_at, read_u32_be_at};
use raida_core::crypto::{crc32b, random_bytes};
use raida_core::record::An;
use raida_core::{CoreError, Denomination, Status};

/// Bytes in a request or response header
pub const REQUEST_HEADER_SIZE: usize = 32;
pub const RESPONSE_HEADER_SIZE: usize = 32;

/// Nonce length used for the CTR IV
pub const NONCE_SIZE: usize = 12;

/// Nonce bytes that actually fit in the header
pub const WIRE_NONCE_SIZE: usize = 8;

/// Only protocol revision this server speaks
pub const ROUTER_VERSION: u8 = 1;

/// Coin-family namespace served by current deployments
pub const SHARD_NEW: u8 = 3;

/// How the request body is keyed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionKind {
    None,
    /// Keyed by the AN of the referenced coin
    CoinAn { denomination: u8, serial: u32 },
    /// Keyed by a locker AN; the reference names any coin in the locker
    LockerAn { denomination: u8, serial: u32 },
}

/// Parsed 32-byte request header
#[derive(Debug, Clone, Copy)]
pub struct RequestHeader {
    pub version: u8,
    pub split_id: u8,
    pub raida_id: u8,
    pub shard_id: u8,
    pub command_group: u8,
    pub command_index: u8,
    pub coin_id: u16,
    pub encryption_type: u8,
    pub encryption_denomination: u8,
    pub encryption_serial: u32,
    pub body_size: u16,
    pub nonce: [u8; NONCE_SIZE],
    pub echo: [u8; 2],
}

impl RequestHeader {
    /// Extract every field; validation happens separately
    pub fn parse(buf: &[u8; REQUEST_HEADER_SIZE]) -> RequestHeader {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[..WIRE_NONCE_SIZE].copy_from_slice(&buf[24..32]);
        RequestHeader {
            version: buf[0],
            split_id: buf[1],
            raida_id: buf[2],
            shard_id: buf[3],
            command_group: buf[4],
            command_index: buf[5],
            coin_id: read_u16_be_at(buf, 6),
            encryption_type: buf[16],
            encryption_denomination: buf[17],
            encryption_serial: read_u32_be_at(buf, 18),
            body_size: read_u16_be_at(buf, 22),
            nonce,
            echo: [buf[30], buf[31]],
        }
    }

    /// Reject requests this node must not serve
    pub fn validate(&self, our_raida_id: u8, our_coin_id: u16) -> Result<(), Status> {
        if self.version != ROUTER_VERSION || self.split_id != 0 {
            return Err(Status::InvalidPacketLength);
        }
        if self.raida_id != our_raida_id {
            return Err(Status::InvalidRaidaId);
        }
        if self.coin_id != our_coin_id {
            return Err(Status::InvalidSnOrDenomination);
        }
        if self.encryption_type > crypt::ENCRYPTION_LOCKER_AES {
            return Err(Status::InvalidEncryption);
        }
        Ok(())
    }

    pub fn encryption(&self) -> EncryptionKind {
        match self.encryption_type {
            crypt::ENCRYPTION_AES => EncryptionKind::CoinAn {
                denomination: self.encryption_denomination,
                serial: self.encryption_serial,
            },
            crypt::ENCRYPTION_LOCKER_AES => EncryptionKind::LockerAn {
                denomination: self.encryption_denomination,
                serial: self.encryption_serial,
            },
            _ => EncryptionKind::None,
        }
    }
}

/// Assemble a full response: header, challenge CRC, optional encryption
/// of the body under a freshly generated nonce.
pub fn build_response(
    status: Status,
    command_group: u8,
    challenge: &[u8; 16],
    echo: [u8; 2],
    mut body: Vec<u8>,
    key: Option<&An>,
) -> Result<Vec<u8>, CoreError> {
    let mut nonce = [0u8; NONCE_SIZE];
    random_bytes(&mut nonce)?;
    if let Some(key) = key {
        if !body.is_empty() {
            apply_ctr(key, &nonce, &mut body);
        }
    }

    let mut out = vec![0u8; RESPONSE_HEADER_SIZE + body.len()];
    out[0] = status.as_u8();
    out[1] = command_group;
    out[2..14].copy_from_slice(&nonce);
    out[14..18].copy_from_slice(&(body.len() as u32).to_be_bytes());
    out[18..22].copy_from_slice(&crc32b(challenge).to_be_bytes());
    // 22..30 stay zero
    out[30..32].copy_from_slice(&echo);
    out[RESPONSE_HEADER_SIZE..].copy_from_slice(&body);
    Ok(out)
}

/// Assemble an outbound request for a peer server (unencrypted)
pub fn build_request(
    to_raida_id: u8,
    command_group: u8,
    command_index: u8,
    coin_id: u16,
    challenge: &[u8; 16],
    payload: &[u8],
) -> Result<Vec<u8>, CoreError> {
    let body_len = challenge.len() + payload.len() + crate::frame::EOF_MARKER.len();
    let mut out = Vec::with_capacity(REQUEST_HEADER_SIZE + body_len);
    out.resize(REQUEST_HEADER_SIZE, 0);
    out[0] = ROUTER_VERSION;
    out[2] = to_raida_id;
    out[3] = SHARD_NEW;
    out[4] = command_group;
    out[5] = command_index;
    out[6..8].copy_from_slice(&coin_id.to_be_bytes());
    out[22..24].copy_from_slice(&(body_len as u16).to_be_bytes());
    let mut nonce = [0u8; WIRE_NONCE_SIZE];
    random_bytes(&mut nonce)?;
    out[24..32].copy_from_slice(&nonce);

    out.extend_from_slice(challenge);
    out.extend_from_slice(payload);
    out.extend_from_slice(&crate::frame::EOF_MARKER);
    Ok(out)
}

/// Parse the reference to an encryption coin into typed form
pub fn encryption_coin(kind: EncryptionKind) -> Option<(Denomination, u32)> {
    match kind {
        EncryptionKind::None => None,
        EncryptionKind::CoinAn {
            denomination,
            serial,
        }
        | EncryptionKind::LockerAn {
            denomination,
            serial,
        } => Denomination::from_wire(denomination)
            .ok()
            .map(|d| (d, serial)),
    }
}
