//! Outbound calls to the other servers in the ring.
//!
//! The only inter-server exchange the healing path needs is
//! Validate-Ticket: present a ticket id to a peer and get back the coins
//! that peer vouches for. Every call carries its own receive timeout;
//! an unreachable peer is a peer with no votes, never a stalled Fix.

use crate::error::HealError;
use raida_core::crypto::random_bytes;
use raida_core::{Coin, Status};
use raida_proto::frame::COIN_RECORD_SIZE;
use raida_proto::header::{build_request, RESPONSE_HEADER_SIZE};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Per-peer receive timeout during Fix
pub const RAIDA_SERVER_RCV_TIMEOUT: Duration = Duration::from_secs(32);

/// Addresses of all 25 servers, indexed by raida id
pub struct PeerRing {
    raida_id: u8,
    coin_id: u16,
    addrs: Vec<String>,
}

impl PeerRing {
    pub fn new(raida_id: u8, coin_id: u16, addrs: Vec<String>) -> Self {
        PeerRing {
            raida_id,
            coin_id,
            addrs,
        }
    }

    pub fn raida_id(&self) -> u8 {
        self.raida_id
    }

    pub fn addr(&self, peer: u8) -> Option<&str> {
        self.addrs.get(peer as usize).map(String::as_str)
    }

    /// Redeem `ticket_id` at `peer` and return the coins it vouches for.
    /// Transport failures and timeouts surface as errors; the caller
    /// treats them as zero votes.
    pub async fn validate_ticket(&self, peer: u8, ticket_id: u32) -> Result<Vec<Coin>, HealError> {
        let addr = self
            .addr(peer)
            .ok_or(HealError::BadPeerResponse { raida_id: peer })?
            .to_string();
        match timeout(
            RAIDA_SERVER_RCV_TIMEOUT,
            self.exchange(&addr, peer, ticket_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                debug!(peer, "validate-ticket timed out");
                Err(HealError::PeerTimeout { raida_id: peer })
            }
        }
    }

    async fn exchange(
        &self,
        addr: &str,
        peer: u8,
        ticket_id: u32,
    ) -> Result<Vec<Coin>, HealError> {
        let mut challenge = [0u8; 16];
        random_bytes(&mut challenge)?;

        let mut payload = Vec::with_capacity(5);
        payload.push(self.raida_id);
        payload.extend_from_slice(&ticket_id.to_be_bytes());
        let request = build_request(peer, 2, 1, self.coin_id, &challenge, &payload)?;

        let mut stream = TcpStream::connect(addr).await?;
        stream.write_all(&request).await?;

        let mut header = [0u8; RESPONSE_HEADER_SIZE];
        stream.read_exact(&mut header).await?;
        let body_len =
            u32::from_be_bytes([header[14], header[15], header[16], header[17]]) as usize;
        if body_len > raida_proto::MAX_BODY_SIZE {
            return Err(HealError::BadPeerResponse { raida_id: peer });
        }
        let mut body = vec![0u8; body_len];
        stream.read_exact(&mut body).await?;

        if header[0] != Status::Success.as_u8() {
            // The peer answered but vouches for nothing
            return Ok(Vec::new());
        }
        if body.len() % COIN_RECORD_SIZE != 0 {
            return Err(HealError::BadPeerResponse { raida_id: peer });
        }
        body.chunks_exact(COIN_RECORD_SIZE)
            .map(|chunk| {
                let bytes: &[u8; COIN_RECORD_SIZE] = chunk
                    .try_into()
                    .map_err(|_| HealError::BadPeerResponse { raida_id: peer })?;
                Coin::from_wire(bytes).map_err(|_| HealError::BadPeerResponse { raida_id: peer })
            })
            .collect()
    }
}
