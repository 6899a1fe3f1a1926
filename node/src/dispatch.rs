//! Request dispatch: header validation, body decryption, routing.
//!
//! One entry point takes the raw datagram or stream frame and returns
//! the raw response. Everything that can go wrong before a handler runs
//! is mapped to a status byte here, with an empty body.

use crate::config::Config;
use raida_commands::{admin, auth, change, locker, Executive};
use raida_core::record::An;
use raida_core::Status;
use raida_healing::{heal, HealContext};
use raida_proto::crypt::apply_ctr;
use raida_proto::frame::{split_body, Reply, CHALLENGE_SIZE, MAX_BODY_SIZE};
use raida_proto::header::{build_response, encryption_coin, RequestHeader, REQUEST_HEADER_SIZE};
use raida_proto::{Command, EncryptionKind};
use raida_state::records;
use std::sync::Arc;
use tracing::debug;

pub struct Dispatcher {
    pub config: Arc<Config>,
    pub exec: Executive,
    pub heal: HealContext,
}

impl Dispatcher {
    /// Process one framed request and produce the full response bytes
    pub async fn handle(&self, raw: &[u8]) -> Vec<u8> {
        self.exec.stats.count_request();

        if raw.len() < REQUEST_HEADER_SIZE {
            return self.error_response(Status::InvalidPacketLength, 0, [0u8; 2]);
        }
        let mut header_bytes = [0u8; REQUEST_HEADER_SIZE];
        header_bytes.copy_from_slice(&raw[..REQUEST_HEADER_SIZE]);
        let header = RequestHeader::parse(&header_bytes);
        let group = header.command_group;
        let echo = header.echo;

        if let Err(status) = header.validate(self.config.raida_id, self.config.coin_id) {
            return self.error_response(status, group, echo);
        }
        let Some(command) = Command::from_wire(header.command_group, header.command_index) else {
            return self.error_response(Status::InvalidCommand, group, echo);
        };

        let body = &raw[REQUEST_HEADER_SIZE..];
        if body.len() != header.body_size as usize || body.len() > MAX_BODY_SIZE {
            return self.error_response(Status::InvalidPacketLength, group, echo);
        }

        // Resolve the body key before touching the payload
        let key = match self.lookup_key(header.encryption()) {
            Ok(k) => k,
            Err(status) => return self.error_response(status, group, echo),
        };
        let mut body = body.to_vec();
        if let Some(key) = &key {
            apply_ctr(key, &header.nonce, &mut body);
        }

        let request = match split_body(&body) {
            Ok(r) => r,
            Err(status) => return self.error_response(status, group, echo),
        };
        debug!(?command, payload = request.payload.len(), "dispatch");

        let reply = self.route(command, header.encryption_type, request.payload).await;
        let outcome = matches!(
            reply.status,
            Status::NoError
                | Status::AllPass
                | Status::AllFail
                | Status::Mixed
                | Status::Success
                | Status::FindAllAn
                | Status::FindAllPan
                | Status::FindNeither
                | Status::FindMixed
        );
        if !outcome {
            self.exec.stats.count_error();
        }

        build_response(
            reply.status,
            group,
            &request.challenge,
            echo,
            reply.body,
            key.as_ref(),
        )
        .unwrap_or_else(|_| self.error_response(Status::Internal, group, echo))
    }

    async fn route(&self, command: Command, encryption_type: u8, payload: &[u8]) -> Reply {
        match command {
            Command::Echo => admin::echo(&self.exec),
            Command::ShowStats => admin::show_stats(&self.exec, payload),

            Command::Detect => auth::detect(&self.exec, payload),
            Command::DetectSum => auth::detect_sum(&self.exec, payload),
            Command::Pown => auth::pown(&self.exec, payload),
            Command::PownSum => auth::pown_sum(&self.exec, payload),

            Command::GetTicket => heal::get_ticket(&self.heal, payload),
            Command::ValidateTicket => heal::validate_ticket(&self.heal, payload),
            Command::Find => heal::find(&self.heal, payload),
            Command::Fix => heal::fix(&self.heal, encryption_type, payload).await,
            Command::MerkleRoot => heal::merkle_root(&self.heal, payload),
            Command::MerkleNode => heal::merkle_node(&self.heal, payload),
            Command::PageBytes => heal::page_bytes(&self.heal, payload),

            Command::AvailableSns => change::available_sns(&self.exec, payload),
            Command::Break => change::break_coin(&self.exec, encryption_type, payload),
            Command::Join => change::join_coins(&self.exec, encryption_type, payload),

            Command::StoreSum => locker::store_sum(&self.exec, payload),
            Command::RemoveLocker => locker::remove(&self.exec, payload),
            Command::PeekLocker => locker::peek(&self.exec, payload),
            Command::MultiStoreSum => locker::multi_store_sum(&self.exec, payload),
            Command::PutForSale => locker::put_for_sale(&self.exec, payload),
            Command::ListForSale => locker::list_for_sale(&self.exec, payload),
            Command::Buy => locker::buy(&self.exec, payload),
            Command::RemoveTrade => locker::remove_trade(&self.exec, payload),
            Command::PeekTrade => locker::peek_trade(&self.exec, payload),
        }
    }

    fn lookup_key(&self, kind: EncryptionKind) -> Result<Option<An>, Status> {
        if kind == EncryptionKind::None {
            return Ok(None);
        }
        let Some((denomination, serial)) = encryption_coin(kind) else {
            return Err(Status::InvalidEncryption);
        };
        let coin = raida_core::Coin::new(denomination, serial)
            .map_err(|_| Status::InvalidEncryption)?;
        let an = records::stored_an(&self.exec.cache, coin).map_err(|_| Status::InvalidEncryption)?;
        Ok(Some(an))
    }

    fn error_response(&self, status: Status, group: u8, echo: [u8; 2]) -> Vec<u8> {
        self.exec.stats.count_error();
        let challenge = [0u8; CHALLENGE_SIZE];
        build_response(status, group, &challenge, echo, Vec::new(), None)
            .unwrap_or_else(|_| vec![Status::Internal.as_u8()])
    }
}
