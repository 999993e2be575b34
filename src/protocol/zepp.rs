//! ZeppOS chunked codec (multiplexed, encryption-capable dialect).
//!
//! Wire format of one chunk:
//! ```text
//! ┌────────┬───────┬──────┬────────┬───────┬──────────────────────────┐
//! │ Marker │ Flags │ 0x00 │ Window │ Count │ FIRST only: len:u32 LE,  │
//! │ (0x03) │ (1B)  │      │ (1B)   │ (1B)  │ endpoint:u16 LE; data    │
//! └────────┴───────┴──────┴────────┴───────┴──────────────────────────┘
//! ```
//!
//! Flags: bit 0 = first chunk, bit 1 = last chunk, bit 3 = encrypted.
//! The endpoint and total length only appear on the first chunk, so a
//! frame is meaningful only once every chunk of its window has arrived.

extern crate alloc;
use alloc::vec::Vec;

use log::{debug, warn};

use super::frame::{Chunk, Frame, FrameCodec};
use crate::error::CodecError;

// ── Constants ────────────────────────────────────────────────

const CHUNK_MARKER: u8 = 0x03;

pub const FLAG_FIRST: u8 = 0x01;
pub const FLAG_LAST: u8 = 0x02;
pub const FLAG_ENCRYPTED: u8 = 0x08;

/// Marker, flags, reserved, window, count.
pub const CHUNK_HEADER: usize = 5;
/// Total length (u32) and endpoint (u16) carried by the first chunk.
pub const FIRST_EXTRA: usize = 6;
/// First chunk must carry at least one data byte.
pub const MIN_MTU: usize = CHUNK_HEADER + FIRST_EXTRA + 1;

// ── Codec ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct ZeppCodec;

/// Reassembly window for one inbound frame.
#[derive(Debug, Default)]
pub struct ZeppCursor {
    active: bool,
    window: u8,
    next_count: u8,
    endpoint: u16,
    encrypted: bool,
    declared: usize,
    data: Vec<u8>,
}

impl ZeppCursor {
    fn reset(&mut self) {
        self.active = false;
        self.data.clear();
        self.declared = 0;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl FrameCodec for ZeppCodec {
    type Cursor = ZeppCursor;
    const NAME: &'static str = "ZEPP";

    fn min_mtu(&self) -> usize {
        MIN_MTU
    }

    fn encode(
        &self,
        window: u8,
        endpoint: u16,
        payload: &[u8],
        mtu: usize,
        encrypted: bool,
    ) -> Result<Vec<Chunk>, CodecError> {
        if mtu < MIN_MTU {
            return Err(CodecError::MtuTooSmall { mtu, min: MIN_MTU });
        }
        let Ok(total) = u32::try_from(payload.len()) else {
            return Err(CodecError::PayloadTooLarge {
                len: payload.len(),
                max: u32::MAX as usize,
            });
        };

        let mut chunks = Vec::new();
        let mut remaining = payload;
        let mut count: u8 = 0;

        loop {
            let first = chunks.is_empty();
            let header = CHUNK_HEADER + if first { FIRST_EXTRA } else { 0 };
            let take = remaining.len().min(mtu - header);
            let last = take == remaining.len();

            let mut flags = 0u8;
            if first {
                flags |= FLAG_FIRST;
            }
            if last {
                flags |= FLAG_LAST;
            }
            if encrypted {
                flags |= FLAG_ENCRYPTED;
            }

            let mut chunk = Vec::with_capacity(header + take);
            chunk.extend_from_slice(&[CHUNK_MARKER, flags, 0x00, window, count]);
            if first {
                chunk.extend_from_slice(&total.to_le_bytes());
                chunk.extend_from_slice(&endpoint.to_le_bytes());
            }
            chunk.extend_from_slice(&remaining[..take]);
            chunks.push(chunk);

            remaining = &remaining[take..];
            count = count.wrapping_add(1);
            if last {
                break;
            }
        }

        debug!(
            "ZEPP[tx]: endpoint 0x{:04x} {} bytes -> {} chunks (mtu {})",
            endpoint,
            payload.len(),
            chunks.len(),
            mtu
        );
        Ok(chunks)
    }

    fn feed(&self, cursor: &mut ZeppCursor, raw: &[u8], max_frame: usize) -> Option<Frame> {
        if raw.len() < CHUNK_HEADER || raw[0] != CHUNK_MARKER {
            warn!("ZEPP[rx]: malformed chunk header ({} bytes), dropping", raw.len());
            cursor.reset();
            return None;
        }

        let flags = raw[1];
        let window = raw[3];
        let count = raw[4];

        if flags & FLAG_FIRST != 0 {
            if cursor.active {
                warn!(
                    "ZEPP[rx]: new first chunk while window {} open, restarting",
                    cursor.window
                );
            }
            cursor.reset();

            if raw.len() < CHUNK_HEADER + FIRST_EXTRA {
                warn!("ZEPP[rx]: truncated first chunk, dropping");
                return None;
            }
            let declared = u32::from_le_bytes([raw[5], raw[6], raw[7], raw[8]]) as usize;
            if declared > max_frame {
                warn!(
                    "ZEPP[rx]: declared length {} exceeds limit {}, dropping",
                    declared, max_frame
                );
                return None;
            }

            cursor.active = true;
            cursor.window = window;
            cursor.next_count = count.wrapping_add(1);
            cursor.endpoint = u16::from_le_bytes([raw[9], raw[10]]);
            cursor.encrypted = flags & FLAG_ENCRYPTED != 0;
            cursor.declared = declared;
            cursor
                .data
                .extend_from_slice(&raw[CHUNK_HEADER + FIRST_EXTRA..]);
        } else {
            if !cursor.active {
                warn!("ZEPP[rx]: continuation chunk without first, dropping");
                return None;
            }
            if window != cursor.window || count != cursor.next_count {
                warn!(
                    "ZEPP[rx]: chunk {}/{} does not follow {}/{}, dropping partial frame",
                    window, count, cursor.window, cursor.next_count
                );
                cursor.reset();
                return None;
            }
            cursor.next_count = count.wrapping_add(1);
            cursor.data.extend_from_slice(&raw[CHUNK_HEADER..]);
        }

        if cursor.data.len() > cursor.declared {
            warn!(
                "ZEPP[rx]: {} bytes exceed declared {}, dropping",
                cursor.data.len(),
                cursor.declared
            );
            cursor.reset();
            return None;
        }

        if flags & FLAG_LAST == 0 {
            return None;
        }

        if cursor.data.len() != cursor.declared {
            warn!(
                "ZEPP[rx]: last chunk leaves {} of {} bytes, dropping",
                cursor.data.len(),
                cursor.declared
            );
            cursor.reset();
            return None;
        }

        let frame = Frame {
            endpoint: cursor.endpoint,
            encrypted: cursor.encrypted,
            payload: core::mem::take(&mut cursor.data),
        };
        cursor.reset();
        debug!(
            "ZEPP[rx]: endpoint 0x{:04x} frame of {} bytes",
            frame.endpoint,
            frame.payload.len()
        );
        Some(frame)
    }
}

// ── Tests ────────────────────────────────────────────────────
