//! Admin commands.
//!
//! Show-Stats is gated on the configured admin key; the comparison is
//! constant-time and a mismatch is reported without logging the
//! attempted key.

use crate::exec::Executive;
use raida_core::record::AN_SIZE;
use raida_core::Status;
use raida_proto::frame::Reply;

/// Liveness probe: success, empty body
pub fn echo(_exec: &Executive) -> Reply {
    Reply::status(Status::Success)
}

fn keys_match(a: &[u8; AN_SIZE], b: &[u8]) -> bool {
    if b.len() != AN_SIZE {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Counter block for operators: requires the 16-byte admin key.
/// Body: requests, errors, detects, powns, lockers stored (u64 BE each),
/// then resident and dirty page counts (u32 BE each).
pub fn show_stats(exec: &Executive, payload: &[u8]) -> Reply {
    if !keys_match(&exec.admin_key, payload) {
        return Reply::status(Status::AdminAuth);
    }

    let mut body = Vec::with_capacity(48);
    for counter in exec.stats.snapshot() {
        body.extend_from_slice(&counter.to_be_bytes());
    }
    body.extend_from_slice(&(exec.cache.resident_count() as u32).to_be_bytes());
    body.extend_from_slice(&(exec.cache.dirty_count() as u32).to_be_bytes());
    Reply::with_body(Status::Success, body)
}
