//! RAIDA Core - shared primitives for the authentication node
//!
//! Everything the other workspace members agree on lives here:
//!
//! - **denomination**: the 15 coin tiers and their monetary values
//! - **record**: coin identity, page geometry, authentication numbers
//! - **bytes**: big-endian wire integers and hex decoding
//! - **crypto**: SHA-256/MD5 AN derivation, CRC32, secure randomness
//! - **clock**: the months-from-start issuance clock
//! - **status**: protocol status and error bytes
//! - **error**: typed error handling (no panics on the request path)

pub mod bytes;
pub mod clock;
pub mod crypto;
pub mod denomination;
pub mod error;
pub mod record;
pub mod status;

pub use denomination::{denom_value, Denomination, TOTAL_DENOMINATIONS};
pub use error::{CoreError, Result};
pub use record::{
    An, Coin, AN_SIZE, MAX_SERIAL, PAGES_PER_DENOMINATION, PAGE_DATA_SIZE, RECORDS_PER_PAGE,
    RECORD_SIZE,
};
pub use status::Status;

/// Library version (matches Cargo.toml)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Number of servers in the RAIDA ring
pub const RAIDA_COUNT: usize = 25;

/// Strict majority needed for a healing quorum
pub const QUORUM: usize = RAIDA_COUNT / 2 + 1;
