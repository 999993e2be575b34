//! Compatibility shim for legacy records that lost their padding byte.
//!
//! Record layout:
//! ```text
//! ┌──────────────┬─────┬──────────────┬──────────────┐
//! │ id (7 B)     │ pad │ body (N B)   │ crc32 LE (4) │
//! └──────────────┴─────┴──────────────┴──────────────┘
//! ```
//!
//! Some firmware versions serialize the record without the pad byte but
//! still compute the checksum over the padded form. The version number does
//! not reliably identify those firmwares, so a checksum mismatch is the
//! trigger: re-insert the pad and check again.

extern crate alloc;
use alloc::borrow::Cow;
use alloc::vec::Vec;

use log::{info, warn};

pub const ID_LEN: usize = 7;
pub const PAD_OFFSET: usize = ID_LEN;
pub const PAD_BYTE: u8 = 0x00;
const CRC_LEN: usize = 4;

fn checksum_matches(record: &[u8]) -> bool {
    if record.len() < CRC_LEN {
        return false;
    }
    let (data, crc) = record.split_at(record.len() - CRC_LEN);
    crc32fast::hash(data) == u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]])
}

/// Validate a legacy record, re-inserting the missing pad byte if needed.
///
/// Returns the record in padded form, borrowed when it was already valid.
pub fn repair(record: &[u8]) -> Option<Cow<'_, [u8]>> {
    if record.len() < ID_LEN + CRC_LEN {
        warn!("padding: record of {} bytes too short, dropping", record.len());
        return None;
    }
    if record.len() > ID_LEN + CRC_LEN && checksum_matches(record) {
        return Some(Cow::Borrowed(record));
    }

    let mut padded = Vec::with_capacity(record.len() + 1);
    padded.extend_from_slice(&record[..PAD_OFFSET]);
    padded.push(PAD_BYTE);
    padded.extend_from_slice(&record[PAD_OFFSET..]);

    if checksum_matches(&padded) {
        info!("padding: re-inserted missing pad byte after record id");
        Some(Cow::Owned(padded))
    } else {
        warn!("padding: checksum mismatch with and without pad byte, dropping");
        None
    }
}

/// Split a repaired record into its id and body.
pub fn split(record: &[u8]) -> Option<(&[u8], &[u8])> {
    if record.len() < ID_LEN + 1 + CRC_LEN {
        return None;
    }
    Some((
        &record[..ID_LEN],
        &record[PAD_OFFSET + 1..record.len() - CRC_LEN],
    ))
}

/// Build a well-formed padded record (used by tests and tooling).
pub fn build(id: &[u8; ID_LEN], body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ID_LEN + 1 + body.len() + CRC_LEN);
    out.extend_from_slice(id);
    out.push(PAD_BYTE);
    out.extend_from_slice(body);
    let crc = crc32fast::hash(&out);
    out.extend_from_slice(&crc.to_le_bytes());
    out
}
