//! Frame and chunk types shared by every dialect, plus the codec contract.

extern crate alloc;
use alloc::vec::Vec;

use crate::error::CodecError;

/// One physical BLE write/notify unit.
pub type Chunk = Vec<u8>;

/// One complete logical message after reassembly.
///
/// For the ZeppOS dialect `endpoint` is the 16-bit endpoint id; for the
/// Moyoung dialect it carries the packet type byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub endpoint: u16,
    pub encrypted: bool,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(endpoint: u16, payload: Vec<u8>) -> Self {
        Self {
            endpoint,
            encrypted: false,
            payload,
        }
    }

    /// First payload byte, the command code on most endpoints.
    pub fn command(&self) -> Option<u8> {
        self.payload.first().copied()
    }
}

/// Splits outbound frames into chunks and folds inbound chunks into frames.
///
/// Implementations hold no per-connection state: the inbound position lives
/// in the [`FrameCodec::Cursor`] owned by the
/// [`ReassemblyBuffer`](crate::reassembly::ReassemblyBuffer).
pub trait FrameCodec {
    /// Dialect-specific reassembly cursor.
    type Cursor: Default;

    /// Tag used in log lines.
    const NAME: &'static str;

    /// Smallest MTU that can carry a header plus one data byte.
    fn min_mtu(&self) -> usize;

    /// Split `payload` for `endpoint` into chunks no longer than `mtu`.
    ///
    /// `window` identifies the outbound frame for dialects that tag chunks
    /// with one; others ignore it.
    fn encode(
        &self,
        window: u8,
        endpoint: u16,
        payload: &[u8],
        mtu: usize,
        encrypted: bool,
    ) -> Result<Vec<Chunk>, CodecError>;

    /// Feed one notification. Returns a frame when `raw` completes one.
    ///
    /// Malformed input resets `cursor`, logs a warning and yields `None`.
    fn feed(&self, cursor: &mut Self::Cursor, raw: &[u8], max_frame: usize) -> Option<Frame>;
}
