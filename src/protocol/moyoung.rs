//! Moyoung packet codec (single-characteristic, length-prefixed dialect).
//!
//! Wire format:
//! ```text
//! ┌──────┬──────┬────────┬────────┬──────┬─────────────────┐
//! │ 0xFE │ 0xEA │ LenHi  │ LenLo  │ Type │ payload (N B)   │
//! └──────┴──────┴────────┴────────┴──────┴─────────────────┘
//! ```
//!
//! `len` counts the whole packet including the 5-byte header. Devices on a
//! 20-byte MTU only understand the short form (`LenHi == 16`, length in
//! `LenLo`); all others use `LenHi = 32 + (len >> 8)`.
//!
//! Outbound packets are cut into raw `mtu`-sized slices with no position
//! tags; the receiver accumulates until the declared length is reached.

extern crate alloc;
use alloc::vec::Vec;

use log::{debug, warn};

use super::frame::{Chunk, Frame, FrameCodec};
use crate::error::CodecError;

const MAGIC: [u8; 2] = [0xFE, 0xEA];
pub const HEADER_LEN: usize = 5;
pub const MIN_MTU: usize = HEADER_LEN + 1;

/// MTU at which only the short length form is accepted.
const SHORT_FORM_MTU: usize = 20;
const SHORT_FORM_TAG: u8 = 16;
const LONG_FORM_BASE: u8 = 32;

/// Largest packet the short length form can describe.
const SHORT_FORM_MAX: usize = 0xFF;
/// Largest packet the long form can describe (`LenHi` saturates at 0xFF).
const LONG_FORM_MAX: usize = (((0xFF - LONG_FORM_BASE) as usize) << 8) | 0xFF;

#[derive(Debug, Clone, Copy, Default)]
pub struct MoyoungCodec;

/// Accumulator for one inbound packet.
#[derive(Debug, Default)]
pub struct MoyoungCursor {
    data: Vec<u8>,
    expected: Option<usize>,
}

impl MoyoungCursor {
    fn reset(&mut self) {
        self.data.clear();
        self.expected = None;
    }

    pub fn is_active(&self) -> bool {
        !self.data.is_empty()
    }
}

/// Decode the declared packet length from the two length bytes.
fn declared_len(hi: u8, lo: u8) -> Option<usize> {
    if hi == SHORT_FORM_TAG {
        Some(lo as usize)
    } else if hi >= LONG_FORM_BASE {
        Some((((hi - LONG_FORM_BASE) as usize) << 8) | lo as usize)
    } else {
        None
    }
}

impl FrameCodec for MoyoungCodec {
    type Cursor = MoyoungCursor;
    const NAME: &'static str = "MOYOUNG";

    fn min_mtu(&self) -> usize {
        MIN_MTU
    }

    fn encode(
        &self,
        _window: u8,
        endpoint: u16,
        payload: &[u8],
        mtu: usize,
        _encrypted: bool,
    ) -> Result<Vec<Chunk>, CodecError> {
        if mtu < MIN_MTU {
            return Err(CodecError::MtuTooSmall { mtu, min: MIN_MTU });
        }
        let Ok(packet_type) = u8::try_from(endpoint) else {
            return Err(CodecError::EndpointOutOfRange(endpoint));
        };

        let len = HEADER_LEN + payload.len();
        let (hi, max) = if mtu == SHORT_FORM_MTU {
            (SHORT_FORM_TAG, SHORT_FORM_MAX)
        } else {
            (LONG_FORM_BASE.wrapping_add((len >> 8) as u8), LONG_FORM_MAX)
        };
        if len > max {
            return Err(CodecError::PayloadTooLarge { len, max });
        }

        let mut packet = Vec::with_capacity(len);
        packet.extend_from_slice(&MAGIC);
        packet.push(hi);
        packet.push((len & 0xFF) as u8);
        packet.push(packet_type);
        packet.extend_from_slice(payload);

        let chunks: Vec<Chunk> = packet.chunks(mtu).map(<[u8]>::to_vec).collect();
        debug!(
            "MOYOUNG[tx]: type {} {} bytes -> {} chunks (mtu {})",
            packet_type,
            payload.len(),
            chunks.len(),
            mtu
        );
        Ok(chunks)
    }

    fn feed(&self, cursor: &mut MoyoungCursor, raw: &[u8], max_frame: usize) -> Option<Frame> {
        if raw.is_empty() {
            return None;
        }
        if cursor.data.is_empty() && !raw.starts_with(&MAGIC[..raw.len().min(2)]) {
            warn!("MOYOUNG[rx]: fragment without packet magic, dropping");
            return None;
        }

        cursor.data.extend_from_slice(raw);

        if cursor.expected.is_none() && cursor.data.len() >= 4 {
            if cursor.data[..2] != MAGIC {
                warn!("MOYOUNG[rx]: bad magic, dropping");
                cursor.reset();
                return None;
            }
            match declared_len(cursor.data[2], cursor.data[3]) {
                Some(len) if len >= HEADER_LEN && len - HEADER_LEN <= max_frame => {
                    cursor.expected = Some(len);
                }
                other => {
                    warn!("MOYOUNG[rx]: invalid declared length {:?}, dropping", other);
                    cursor.reset();
                    return None;
                }
            }
        }

        let expected = cursor.expected?;
        if cursor.data.len() > expected {
            warn!(
                "MOYOUNG[rx]: {} bytes exceed declared {}, dropping",
                cursor.data.len(),
                expected
            );
            cursor.reset();
            return None;
        }
        if cursor.data.len() < expected {
            return None;
        }

        let frame = Frame::new(cursor.data[4] as u16, cursor.data[HEADER_LEN..].to_vec());
        cursor.reset();
        debug!(
            "MOYOUNG[rx]: type {} frame of {} bytes",
            frame.endpoint,
            frame.payload.len()
        );
        Some(frame)
    }
}

// ── Tests ────────────────────────────────────────────────────
