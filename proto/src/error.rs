// Protocol-layer errors for things that happen off the wire path.
// On-wire validation failures travel as Status bytes, not errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("peer key file {path} is {len} bytes, expected {expected}")]
    KeyFileLength {
        path: String,
        len: usize,
        expected: usize,
    },

    #[error(transparent)]
    Core(#[from] raida_core::CoreError),
}
