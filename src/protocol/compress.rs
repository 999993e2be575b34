//! zlib inflate for compressed file transfers, via `miniz_oxide`.
//!
//! The band announces `compressed = 1` in the transfer request when the
//! payload is a zlib stream. The CRC32 in the request covers the inflated
//! file, so the stream is inflated first and the checksum checked after.

extern crate alloc;
use alloc::vec::Vec;

use log::warn;
use miniz_oxide::inflate::decompress_to_vec_zlib_with_limit;

/// Inflate a zlib stream, refusing output larger than `limit` bytes.
///
/// Returns `None` on a corrupt stream or when the limit is hit.
pub fn inflate(input: &[u8], limit: usize) -> Option<Vec<u8>> {
    match decompress_to_vec_zlib_with_limit(input, limit) {
        Ok(data) => Some(data),
        Err(e) => {
            warn!("inflate: zlib error: {:?}", e.status);
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
