//! The healing commands.
//!
//! Get-Ticket authenticates coins and issues a ticket for the survivors.
//! Validate-Ticket is the peer-facing redemption with one claim per
//! server. Find answers "which AN does this server hold". Fix polls the
//! whole ring in parallel and rewrites any coin that reaches quorum.

use crate::peer::PeerRing;
use crate::ticket::TicketPool;
use crate::MerkleStore;
use futures::future::join_all;
use raida_core::clock::mfs_now;
use raida_core::crypto::derive_an;
use raida_core::record::An;
use raida_core::{Coin, Denomination, Status, QUORUM, RAIDA_COUNT};
use raida_proto::frame::{
    pack_bitmap, parse_coin_an2_list, parse_coin_an_list, parse_coin_list, Reply,
};
use raida_state::{records, FreeIndex, PageCache};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Everything the healing handlers touch, wired up at startup
pub struct HealContext {
    pub raida_id: u8,
    pub cache: Arc<PageCache>,
    pub free: Arc<FreeIndex>,
    pub tickets: Arc<TicketPool>,
    pub merkle: Arc<MerkleStore>,
    pub peers: Arc<PeerRing>,
}

impl HealContext {
    fn stored_an(&self, coin: Coin) -> Result<An, Status> {
        records::stored_an(&self.cache, coin).map_err(|_| Status::Internal)
    }

    fn write_coin(&self, coin: Coin, an: &An, mfs: u8) -> Result<(), Status> {
        records::write_coin(&self.cache, &self.free, coin, an, mfs).map_err(|_| Status::Internal)
    }
}

/// Authenticate a batch and issue a ticket covering the coins that pass.
/// Response: per-coin bitmap, then the 4-byte ticket id if one was issued.
pub fn get_ticket(ctx: &HealContext, payload: &[u8]) -> Reply {
    let records = match parse_coin_an_list(payload) {
        Ok(r) => r,
        Err(status) => return Reply::status(status),
    };

    let mut results = Vec::with_capacity(records.len());
    let mut authentic = Vec::new();
    for (coin, an) in &records {
        let stored = match ctx.stored_an(*coin) {
            Ok(a) => a,
            Err(status) => return Reply::status(status),
        };
        let passed = stored == *an;
        results.push(passed);
        if passed {
            authentic.push(*coin);
        }
    }

    let status = Status::from_batch(authentic.len(), results.len());
    let mut body = pack_bitmap(&results);
    if !authentic.is_empty() {
        match ctx.tickets.issue(authentic) {
            Ok(id) => body.extend_from_slice(&id.to_be_bytes()),
            Err(status) => return Reply::status(status),
        }
    }
    Reply::with_body(status, body)
}

/// Peer-facing redemption: mark the caller's claim bit and hand back
/// the ticket's coins as 5-byte records.
pub fn validate_ticket(ctx: &HealContext, payload: &[u8]) -> Reply {
    if payload.len() != 5 {
        return Reply::status(Status::InvalidPacketLength);
    }
    let claimer = payload[0];
    let ticket_id = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);

    match ctx.tickets.claim(ticket_id, claimer) {
        Ok(coins) => {
            let mut body = Vec::with_capacity(coins.len() * 5);
            for coin in coins {
                body.extend_from_slice(&coin.to_wire());
            }
            Reply::with_body(Status::Success, body)
        }
        Err(status) => Reply::status(status),
    }
}

/// For each (coin, an, pan): report whether the stored AN matches the
/// current one (0x1), the proposed one (0x2), or neither (0x0).
pub fn find(ctx: &HealContext, payload: &[u8]) -> Reply {
    let records = match parse_coin_an2_list(payload) {
        Ok(r) => r,
        Err(status) => return Reply::status(status),
    };

    let mut results = Vec::with_capacity(records.len());
    for (coin, an, pan) in &records {
        let stored = match ctx.stored_an(*coin) {
            Ok(a) => a,
            Err(status) => return Reply::status(status),
        };
        results.push(if stored == *an {
            0x1u8
        } else if stored == *pan {
            0x2
        } else {
            0x0
        });
    }

    let all_an = results.iter().all(|&r| r == 0x1);
    let all_pan = results.iter().all(|&r| r == 0x2);
    let neither = results.iter().all(|&r| r == 0x0);
    if all_an {
        Reply::status(Status::FindAllAn)
    } else if all_pan {
        Reply::status(Status::FindAllPan)
    } else if neither {
        Reply::status(Status::FindNeither)
    } else {
        Reply::with_body(Status::FindMixed, results)
    }
}

const FIX_TRAILER_SIZE: usize = 16 + 4 * RAIDA_COUNT;

/// Poll the ring with one ticket id per peer, tally which coins the
/// peers vouch for, and rewrite every coin that clears quorum with an
/// AN derived from the proof GUID.
pub async fn fix(ctx: &HealContext, encryption_type: u8, payload: &[u8]) -> Reply {
    if payload.len() <= FIX_TRAILER_SIZE || (payload.len() - FIX_TRAILER_SIZE) % 5 != 0 {
        return Reply::status(Status::InvalidPacketLength);
    }
    let coin_bytes = payload.len() - FIX_TRAILER_SIZE;
    let coins = match parse_coin_list(&payload[..coin_bytes]) {
        Ok(c) => c,
        Err(status) => return Reply::status(status),
    };

    let mut pg = [0u8; 16];
    pg.copy_from_slice(&payload[coin_bytes..coin_bytes + 16]);
    let ticket_ids: Vec<u32> = payload[coin_bytes + 16..]
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    let mut votes: HashMap<Coin, usize> = coins.iter().map(|c| (*c, 0)).collect();

    // Our own slot redeems locally; everyone else is a network call.
    let mut remote = Vec::new();
    for (peer, &ticket_id) in ticket_ids.iter().enumerate() {
        if ticket_id == 0 {
            continue;
        }
        let peer = peer as u8;
        if peer == ctx.raida_id {
            if let Ok(claimed) = ctx.tickets.claim(ticket_id, peer) {
                for coin in claimed {
                    if let Some(v) = votes.get_mut(&coin) {
                        *v += 1;
                    }
                }
            }
            continue;
        }
        let peers = Arc::clone(&ctx.peers);
        remote.push(async move { peers.validate_ticket(peer, ticket_id).await });
    }

    for result in join_all(remote).await {
        match result {
            Ok(claimed) => {
                for coin in claimed {
                    if let Some(v) = votes.get_mut(&coin) {
                        *v += 1;
                    }
                }
            }
            // Unreachable peers simply cast no votes
            Err(e) => debug!("peer gave no votes: {e}"),
        }
    }

    let mut results = Vec::with_capacity(coins.len());
    let mut fixed = 0usize;
    for coin in &coins {
        let confirmations = votes.get(coin).copied().unwrap_or(0);
        if confirmations <= QUORUM {
            results.push(false);
            continue;
        }
        let an = derive_an(
            encryption_type,
            &[
                &[ctx.raida_id],
                &[coin.denomination.to_wire()],
                &coin.serial.to_be_bytes(),
                &pg,
            ],
        );
        if let Err(status) = ctx.write_coin(*coin, &an, mfs_now()) {
            return Reply::status(status);
        }
        fixed += 1;
        results.push(true);
    }

    info!(total = coins.len(), fixed, "fix complete");
    let status = if fixed == 0 {
        Status::AllFail
    } else {
        Status::Mixed
    };
    Reply::with_body(status, pack_bitmap(&results))
}

/// Root hash of one denomination's integrity tree
pub fn merkle_root(ctx: &HealContext, payload: &[u8]) -> Reply {
    if payload.len() != 1 {
        return Reply::status(Status::InvalidPacketLength);
    }
    let Ok(d) = Denomination::from_wire(payload[0]) else {
        return Reply::status(Status::InvalidSnOrDenomination);
    };
    match ctx.merkle.root(d) {
        Some(root) => Reply::with_body(Status::Success, root.to_vec()),
        None => Reply::status(Status::AllFail),
    }
}

/// One node of an integrity tree, addressed by (level, index)
pub fn merkle_node(ctx: &HealContext, payload: &[u8]) -> Reply {
    if payload.len() != 6 {
        return Reply::status(Status::InvalidPacketLength);
    }
    let Ok(d) = Denomination::from_wire(payload[0]) else {
        return Reply::status(Status::InvalidSnOrDenomination);
    };
    let level = payload[1] as usize;
    let index = u32::from_be_bytes([payload[2], payload[3], payload[4], payload[5]]) as usize;
    match ctx.merkle.node(d, level, index) {
        Some(node) => Reply::with_body(Status::Success, node.to_vec()),
        None => Reply::status(Status::AllFail),
    }
}

/// Raw page-file contents, the last step of healing-sync
pub fn page_bytes(ctx: &HealContext, payload: &[u8]) -> Reply {
    if payload.len() != 5 {
        return Reply::status(Status::InvalidPacketLength);
    }
    let Ok(d) = Denomination::from_wire(payload[0]) else {
        return Reply::status(Status::InvalidSnOrDenomination);
    };
    let page_no = u32::from_be_bytes([payload[1], payload[2], payload[3], payload[4]]);
    match ctx.merkle.page_file_bytes(d, page_no) {
        Ok(bytes) => Reply::with_body(Status::Success, bytes),
        Err(_) => Reply::status(Status::AllFail),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raida_core::Denomination;
    use tempfile::TempDir;

    fn context(dir: &TempDir) -> HealContext {
        let cache = Arc::new(PageCache::new(dir.path()));
        HealContext {
            raida_id: 3,
            cache: Arc::clone(&cache),
            free: Arc::new(FreeIndex::new()),
            tickets: Arc::new(TicketPool::new()),
            merkle: Arc::new(MerkleStore::new(dir.path())),
            peers: Arc::new(PeerRing::new(3, 777, Vec::new())),
        }
    }

    fn seed_coin(ctx: &HealContext, serial: u32, an: &An) -> Coin {
        let coin = Coin::new(Denomination::new(0).unwrap(), serial).unwrap();
        ctx.write_coin(coin, an, 7).unwrap();
        coin
    }

    fn record(coin: Coin, an: &An) -> Vec<u8> {
        let mut out = coin.to_wire().to_vec();
        out.extend_from_slice(an);
        out
    }

    #[test]
    fn test_get_ticket_issues_for_authentic() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let an = [9u8; 16];
        let coin = seed_coin(&ctx, 5, &an);

        let reply = get_ticket(&ctx, &record(coin, &an));
        assert_eq!(reply.status, Status::AllPass);
        // Bitmap byte plus 4-byte ticket id
        assert_eq!(reply.body.len(), 5);
        assert_eq!(reply.body[0], 0x80);

        let ticket_id = u32::from_be_bytes([
            reply.body[1],
            reply.body[2],
            reply.body[3],
            reply.body[4],
        ]);
        assert_eq!(ctx.tickets.peek(ticket_id).unwrap(), vec![coin]);
    }

    #[test]
    fn test_get_ticket_all_fail_issues_nothing() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let coin = seed_coin(&ctx, 5, &[9u8; 16]);

        let reply = get_ticket(&ctx, &record(coin, &[1u8; 16]));
        assert_eq!(reply.status, Status::AllFail);
        assert_eq!(reply.body, vec![0x00]);
        assert_eq!(ctx.tickets.active(), 0);
    }

    #[test]
    fn test_validate_ticket_claims_once() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let an = [9u8; 16];
        let coin = seed_coin(&ctx, 8, &an);
        let ticket_id = ctx.tickets.issue(vec![coin]).unwrap();

        let mut payload = vec![4u8];
        payload.extend_from_slice(&ticket_id.to_be_bytes());

        let reply = validate_ticket(&ctx, &payload);
        assert_eq!(reply.status, Status::Success);
        assert_eq!(reply.body, coin.to_wire().to_vec());

        let reply = validate_ticket(&ctx, &payload);
        assert_eq!(reply.status, Status::TicketClaimedAlready);
    }

    #[test]
    fn test_find_distinguishes_an_and_pan() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let an = [1u8; 16];
        let pan = [2u8; 16];
        let coin = seed_coin(&ctx, 3, &an);

        let mut payload = coin.to_wire().to_vec();
        payload.extend_from_slice(&an);
        payload.extend_from_slice(&pan);
        assert_eq!(find(&ctx, &payload).status, Status::FindAllAn);

        // After the owner swapped to the proposed AN
        ctx.write_coin(coin, &pan, 7).unwrap();
        assert_eq!(find(&ctx, &payload).status, Status::FindAllPan);

        ctx.write_coin(coin, &[8u8; 16], 7).unwrap();
        assert_eq!(find(&ctx, &payload).status, Status::FindNeither);
    }

    #[test]
    fn test_find_mixed_carries_per_coin_bytes() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let an = [1u8; 16];
        let pan = [2u8; 16];
        let good = seed_coin(&ctx, 3, &an);
        let moved = seed_coin(&ctx, 4, &pan);

        let mut payload = good.to_wire().to_vec();
        payload.extend_from_slice(&an);
        payload.extend_from_slice(&pan);
        payload.extend_from_slice(&moved.to_wire());
        payload.extend_from_slice(&an);
        payload.extend_from_slice(&pan);

        let reply = find(&ctx, &payload);
        assert_eq!(reply.status, Status::FindMixed);
        assert_eq!(reply.body, vec![0x1, 0x2]);
    }

    #[tokio::test]
    async fn test_fix_without_votes_fails_all() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let coin = Coin::new(Denomination::new(0).unwrap(), 5).unwrap();

        let mut payload = coin.to_wire().to_vec();
        payload.extend_from_slice(&[0u8; 16]); // PG
        payload.extend_from_slice(&[0u8; 4 * RAIDA_COUNT]); // no tickets anywhere

        let reply = fix(&ctx, 4, &payload).await;
        assert_eq!(reply.status, Status::AllFail);
        assert_eq!(reply.body, vec![0x00]);
    }

    #[test]
    fn test_merkle_commands() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let d = Denomination::new(0).unwrap();

        // No tree yet
        assert_eq!(merkle_root(&ctx, &[d.to_wire()]).status, Status::AllFail);

        ctx.merkle.rebuild_denomination(d).unwrap();
        let reply = merkle_root(&ctx, &[d.to_wire()]);
        assert_eq!(reply.status, Status::Success);
        assert_eq!(reply.body.len(), 32);

        let mut payload = vec![d.to_wire(), 0];
        payload.extend_from_slice(&0u32.to_be_bytes());
        let reply = merkle_node(&ctx, &payload);
        assert_eq!(reply.status, Status::Success);
        // Leaf 0 of an empty denomination is the zero hash
        assert_eq!(reply.body, vec![0u8; 32]);

        let mut payload = vec![d.to_wire(), 40];
        payload.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(merkle_node(&ctx, &payload).status, Status::AllFail);
    }

    #[test]
    fn test_page_bytes_command() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let an = [6u8; 16];
        let coin = seed_coin(&ctx, 10, &an);
        ctx.cache.flush_all();

        let mut payload = vec![coin.denomination.to_wire()];
        payload.extend_from_slice(&coin.page_number().to_be_bytes());
        let reply = page_bytes(&ctx, &payload);
        assert_eq!(reply.status, Status::Success);
        assert_eq!(reply.body.len(), raida_core::PAGE_DATA_SIZE);

        let mut payload = vec![coin.denomination.to_wire()];
        payload.extend_from_slice(&999u32.to_be_bytes());
        assert_eq!(page_bytes(&ctx, &payload).status, Status::AllFail);
    }

    #[tokio::test]
    async fn test_fix_rejects_short_payload() {
        let dir = TempDir::new().unwrap();
        let ctx = context(&dir);
        let reply = fix(&ctx, 4, &[0u8; FIX_TRAILER_SIZE]).await;
        assert_eq!(reply.status, Status::InvalidPacketLength);
    }
}
