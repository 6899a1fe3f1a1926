// Healing-layer errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HealError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer {raida_id} sent a malformed response")]
    BadPeerResponse { raida_id: u8 },

    #[error("peer {raida_id} timed out")]
    PeerTimeout { raida_id: u8 },

    #[error(transparent)]
    Proto(#[from] raida_proto::ProtoError),

    #[error(transparent)]
    Core(#[from] raida_core::CoreError),
}
