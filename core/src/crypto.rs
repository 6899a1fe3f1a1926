//! Hashing and randomness primitives.
//!
//! Authentication numbers are derived with SHA-256 truncated to 16 bytes
//! for current clients and MD5 for clients that negotiated an encryption
//! scheme older than 4. All nonces and ticket ids come from the operating
//! system RNG; there is no pseudo-random fallback.

use crate::error::{CoreError, Result};
use crate::record::{An, AN_SIZE};
use crc::{Crc, CRC_32_ISO_HDLC};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Encryption schemes below this derive ANs with MD5
pub const LEGACY_HASH_CUTOFF: u8 = 4;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// CRC32 with polynomial 0xEDB88320, init and final XOR 0xFFFFFFFF
pub fn crc32b(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// SHA-256 of arbitrary bytes
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 of multiple slices, hashed as one stream
pub fn sha256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Derive an AN as the first 16 bytes of SHA-256 over the parts
pub fn an_sha256(parts: &[&[u8]]) -> An {
    let digest = sha256_multi(parts);
    let mut an = [0u8; AN_SIZE];
    an.copy_from_slice(&digest[..AN_SIZE]);
    an
}

/// Derive an AN with MD5 over the parts (legacy clients only)
pub fn an_md5(parts: &[&[u8]]) -> An {
    let mut ctx = md5::Context::new();
    for part in parts {
        ctx.consume(part);
    }
    ctx.compute().0
}

/// Pick the AN derivation a client understands from its encryption scheme
pub fn derive_an(encryption_type: u8, parts: &[&[u8]]) -> An {
    if encryption_type < LEGACY_HASH_CUTOFF {
        an_md5(parts)
    } else {
        an_sha256(parts)
    }
}

/// Fill `out` from the operating system RNG
pub fn random_bytes(out: &mut [u8]) -> Result<()> {
    OsRng
        .try_fill_bytes(out)
        .map_err(|e| CoreError::Rng(e.to_string()))
}

/// A fresh random u32 from the operating system RNG
pub fn random_u32() -> Result<u32> {
    let mut buf = [0u8; 4];
    random_bytes(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// A fresh random AN from the operating system RNG
pub fn random_an() -> Result<An> {
    let mut an = [0u8; AN_SIZE];
    random_bytes(&mut an)?;
    Ok(an)
}
