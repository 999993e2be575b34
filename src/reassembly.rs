//! Per-connection reassembly buffer.
//!
//! Owns the dialect codec and its cursor. [`ReassemblyBuffer::feed`] is the
//! only mutator: each call consumes one notification and yields at most one
//! complete [`Frame`]. Partial frames never escape; a chunk in the wrong role
//! drops the partial frame and the next valid first chunk starts cleanly.

use crate::protocol::{Frame, FrameCodec};

pub struct ReassemblyBuffer<C: FrameCodec> {
    codec: C,
    cursor: C::Cursor,
    max_frame: usize,
    frames: u64,
}

impl<C: FrameCodec> ReassemblyBuffer<C> {
    pub fn new(codec: C, max_frame: usize) -> Self {
        Self {
            codec,
            cursor: C::Cursor::default(),
            max_frame,
            frames: 0,
        }
    }

    /// Feed one notification.
    pub fn feed(&mut self, raw: &[u8]) -> Option<Frame> {
        let frame = self.codec.feed(&mut self.cursor, raw, self.max_frame)?;
        self.frames += 1;
        Some(frame)
    }

    /// Drop any partial frame (e.g. after a disconnect).
    pub fn reset(&mut self) {
        self.cursor = C::Cursor::default();
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Frames completed since construction.
    pub fn frames_completed(&self) -> u64 {
        self.frames
    }
}

// ── Tests ────────────────────────────────────────────────────
