//! Serialized outbound queue.
//!
//! Every write the engine produces (request/response traffic, scheduler
//! keep-alives, operation follow-ups) goes through one bounded
//! `embassy-sync` channel, so their relative order on the wire is the
//! order they were enqueued in.
//!
//! ```text
//! handlers ─┐
//! scheduler ─┼──▶ OutboundQueue ──▶ flush ──▶ TransportPort
//! operations ┘
//! ```

extern crate alloc;
use alloc::vec::Vec;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;

use crate::app::ports::Characteristic;
use crate::error::TransportError;

/// Queue depth in frames plus read requests. A frame holds however many
/// chunks its payload needs.
pub const OUTBOUND_DEPTH: usize = 32;

/// One transport action, in wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Write every chunk of one encoded frame to the control characteristic.
    Frame(Vec<Vec<u8>>),
    /// Ask the transport to read a characteristic.
    Read(Characteristic),
}

impl Outbound {
    /// Transport operations this item turns into.
    pub fn ops(&self) -> usize {
        match self {
            Outbound::Frame(chunks) => chunks.len(),
            Outbound::Read(_) => 1,
        }
    }
}

/// Bounded FIFO owned by one connection.
pub struct OutboundQueue {
    channel: Channel<NoopRawMutex, Outbound, OUTBOUND_DEPTH>,
    len: usize,
}

impl OutboundQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            len: 0,
        }
    }

    /// Enqueue one item. A frame goes in whole or not at all.
    pub fn push(&mut self, item: Outbound) -> Result<(), TransportError> {
        self.channel
            .try_send(item)
            .map_err(|_| TransportError::QueueFull)?;
        self.len += 1;
        Ok(())
    }

    pub fn is_full(&self) -> bool {
        self.len == OUTBOUND_DEPTH
    }

    pub fn pop(&mut self) -> Option<Outbound> {
        let item = self.channel.try_receive().ok()?;
        self.len -= 1;
        Some(item)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop everything still queued. Returns how many items were discarded.
    pub fn clear(&mut self) -> usize {
        let mut dropped = 0;
        while self.pop().is_some() {
            dropped += 1;
        }
        dropped
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}
