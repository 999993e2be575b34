//! Wire protocol layer.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     Protocol Stack                         │
//! │                                                            │
//! │  notify ──▶ ReassemblyBuffer ──▶ FrameCodec::feed ──▶ Frame│
//! │                                                            │
//! │  (endpoint, payload) ──▶ FrameCodec::encode ──▶ chunks     │
//! │                                   │                        │
//! │                                   ▼                        │
//! │                           OutboundQueue ──▶ TransportPort  │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod compress;
pub mod frame;
pub mod moyoung;
pub mod padding;
pub mod queue;
pub mod zepp;

pub use frame::{Chunk, Frame, FrameCodec};
pub use moyoung::MoyoungCodec;
pub use zepp::ZeppCodec;
