//! Upload with percent progress (firmware, AGPS, GPX).
//!
//! Flow: begin(kind, total) → N × write_chunk(offset, len) → complete
//!
//! Offsets must be strictly sequential; the transfer completes when the
//! declared total has been written.

use core::fmt;

use crate::error::OperationError;

const MAX_TRANSFER_SIZE: u32 = 16 * 1024 * 1024; // 16 MB

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Firmware,
    Agps,
    Gpx,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Firmware => write!(f, "firmware"),
            Self::Agps => write!(f, "AGPS"),
            Self::Gpx => write!(f, "GPX"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Transfer {
    kind: TransferKind,
    endpoint: u16,
    total: u32,
    written: u32,
    reported: Option<u8>,
}

impl Transfer {
    pub fn new(kind: TransferKind, endpoint: u16, total: u32) -> Result<Self, OperationError> {
        if total == 0 || total > MAX_TRANSFER_SIZE {
            return Err(OperationError::InvalidSize);
        }
        Ok(Self {
            kind,
            endpoint,
            total,
            written: 0,
            reported: None,
        })
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    /// Endpoint the chunks are written to.
    pub fn endpoint(&self) -> u16 {
        self.endpoint
    }

    pub fn written(&self) -> u32 {
        self.written
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Whether `len` bytes at `offset` would be accepted.
    pub fn check_chunk(&self, offset: u32, len: u32) -> Result<(), OperationError> {
        if offset != self.written {
            return Err(OperationError::NonSequential);
        }
        if self.written.saturating_add(len) > self.total {
            return Err(OperationError::Overflow);
        }
        Ok(())
    }

    /// Account for `len` bytes at `offset`. Returns total bytes written.
    pub fn write_chunk(&mut self, offset: u32, len: u32) -> Result<u32, OperationError> {
        self.check_chunk(offset, len)?;
        self.written += len;
        Ok(self.written)
    }

    pub fn percent(&self) -> u8 {
        (u64::from(self.written) * 100 / u64::from(self.total)) as u8
    }

    /// Percent complete if it changed since the last call.
    pub fn take_progress(&mut self) -> Option<u8> {
        let p = self.percent();
        if self.reported == Some(p) {
            return None;
        }
        self.reported = Some(p);
        Some(p)
    }

    pub fn is_complete(&self) -> bool {
        self.written == self.total
    }
}
