//! Peer encryption-coin key files.
//!
//! Each key file holds the material for one encryption coin: a 40-byte
//! header followed by 25 16-byte keys, one per server in the ring. File
//! path is `{data_dir}/coins/{denomination:02x}.{serial}.bin`.

use crate::error::ProtoError;
use raida_core::record::{An, AN_SIZE};
use raida_core::{Denomination, RAIDA_COUNT};
use std::fs;
use std::path::{Path, PathBuf};

/// Header bytes before the key material
pub const KEY_FILE_HEADER: usize = 40;

/// Exact size of a key file
pub const KEY_FILE_SIZE: usize = KEY_FILE_HEADER + RAIDA_COUNT * AN_SIZE;

/// Location of the key file for one encryption coin
pub fn key_file_path(data_dir: &Path, denomination: Denomination, serial: u32) -> PathBuf {
    data_dir
        .join("coins")
        .join(format!("{:02x}.{}.bin", denomination.index(), serial))
}

/// Load the key this node shares with peer `raida_id`
pub fn load_peer_key(
    data_dir: &Path,
    denomination: Denomination,
    serial: u32,
    raida_id: u8,
) -> Result<An, ProtoError> {
    let path = key_file_path(data_dir, denomination, serial);
    let bytes = fs::read(&path)?;
    if bytes.len() != KEY_FILE_SIZE || raida_id as usize >= RAIDA_COUNT {
        return Err(ProtoError::KeyFileLength {
            path: path.display().to_string(),
            len: bytes.len(),
            expected: KEY_FILE_SIZE,
        });
    }
    let off = KEY_FILE_HEADER + raida_id as usize * AN_SIZE;
    let mut key = [0u8; AN_SIZE];
    key.copy_from_slice(&bytes[off..off + AN_SIZE]);
    Ok(key)
}
