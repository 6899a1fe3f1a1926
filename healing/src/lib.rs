// RAIDA Healing
// Tickets, Merkle integrity and the peer-quorum fix path

pub mod error;
pub mod heal;
pub mod merkle;
pub mod peer;
pub mod ticket;

pub use error::HealError;
pub use heal::HealContext;
pub use merkle::{IntegrityWorker, MerkleStore, MerkleTree};
pub use peer::{PeerRing, RAIDA_SERVER_RCV_TIMEOUT};
pub use ticket::{TicketPool, MAX_TICKET_COINS, TICKET_POOL_SIZE, TICKET_TTL_SECONDS};
