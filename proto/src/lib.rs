// RAIDA Wire Protocol
// 32-byte headers, encrypted bodies, and the command table

pub mod command;
pub mod crypt;
pub mod error;
pub mod frame;
pub mod header;
pub mod keys;

pub use command::{Command, CommandGroup};
pub use error::ProtoError;
pub use frame::{split_body, Reply, RequestBody, CHALLENGE_SIZE, EOF_MARKER, MAX_BODY_SIZE};
pub use header::{
    build_response, EncryptionKind, RequestHeader, NONCE_SIZE, REQUEST_HEADER_SIZE,
    RESPONSE_HEADER_SIZE,
};
