//! File download pushed by the band (ZeppOS file transfer).
//!
//! The band announces a file with its wire length and CRC32, then streams
//! indexed chunks. Compressed files are inflated once the last chunk is in;
//! the CRC32 covers the final (inflated) bytes.

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::OperationError;
use crate::protocol::compress;

/// Largest inflated file accepted.
const MAX_INFLATED_SIZE: usize = 4 * 1024 * 1024;

/// Transfer request as announced by the band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOffer {
    pub session: u8,
    pub url: String,
    pub filename: String,
    pub length: u32,
    pub crc32: u32,
    pub compressed: bool,
}

/// A verified, inflated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub url: String,
    pub filename: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct FileDownload {
    offer: FileOffer,
    data: Vec<u8>,
    next_index: u8,
}

impl FileDownload {
    pub fn new(offer: FileOffer) -> Self {
        Self {
            data: Vec::with_capacity(offer.length.min(64 * 1024) as usize),
            offer,
            next_index: 0,
        }
    }

    pub fn session(&self) -> u8 {
        self.offer.session
    }

    pub fn percent(&self) -> u8 {
        if self.offer.length == 0 {
            return 100;
        }
        (self.data.len() as u64 * 100 / u64::from(self.offer.length)) as u8
    }

    /// Append one chunk. Returns the finished file on the last chunk.
    pub fn accept_chunk(
        &mut self,
        index: u8,
        last: bool,
        chunk: &[u8],
    ) -> Result<Option<ReceivedFile>, OperationError> {
        if index != self.next_index {
            return Err(OperationError::NonSequential);
        }
        if self.data.len() + chunk.len() > self.offer.length as usize {
            return Err(OperationError::Overflow);
        }
        self.next_index = index.wrapping_add(1);
        self.data.extend_from_slice(chunk);

        if !last {
            return Ok(None);
        }

        let raw = core::mem::take(&mut self.data);
        let data = if self.offer.compressed {
            compress::inflate(&raw, MAX_INFLATED_SIZE).ok_or(OperationError::Decompress)?
        } else {
            raw
        };

        if crc32fast::hash(&data) != self.offer.crc32 {
            return Err(OperationError::ChecksumMismatch);
        }

        Ok(Some(ReceivedFile {
            url: self.offer.url.clone(),
            filename: self.offer.filename.clone(),
            data,
        }))
    }
}
