//! AES-128-CTR body encryption.
//!
//! The key is always a 16-byte AN: the referenced coin's AN for scheme 1,
//! a locker AN for scheme 2. The IV is the 12-byte nonce followed by a
//! zero 4-byte block counter. CTR is symmetric, so the same call both
//! encrypts and decrypts.

use aes::cipher::{KeyIvInit, StreamCipher};
use aes::Aes128;
use ctr::Ctr128BE;
use raida_core::record::An;

type AnCipher = Ctr128BE<Aes128>;

/// Request body carries no encryption
pub const ENCRYPTION_NONE: u8 = 0;

/// Body encrypted under a coin AN
pub const ENCRYPTION_AES: u8 = 1;

/// Body encrypted under a locker AN
pub const ENCRYPTION_LOCKER_AES: u8 = 2;

/// Apply the AES-CTR keystream in place
pub fn apply_ctr(key: &An, nonce: &[u8; 12], data: &mut [u8]) {
    let mut iv = [0u8; 16];
    iv[..12].copy_from_slice(nonce);
    let mut cipher = AnCipher::new(key.into(), (&iv).into());
    cipher.apply_keystream(data);
}
