//! File transfer endpoint: files pushed from the band to the phone.
//!
//! Flow: capabilities → request (0x03) → accept (0x04) → N × data (0x10),
//! each acked (0x11). The download itself runs as an exclusive
//! [`FileDownload`] operation.

extern crate alloc;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, info, warn};

use crate::app::events::DeviceEvent;
use crate::error::OperationError;
use crate::operation::{FileDownload, FileOffer, Shape};
use crate::registry::{EndpointHandler, HandlerContext};

pub const ENDPOINT: u16 = 0x000d;

const FLAG_FIRST: u8 = 0x01;
const FLAG_LAST: u8 = 0x02;

const STATUS_OK: u8 = 0x00;
const STATUS_REJECTED: u8 = 0x01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FileTransferCommand {
    CapabilitiesRequest = 0x01,
    CapabilitiesResponse = 0x02,
    TransferRequest = 0x03,
    TransferResponse = 0x04,
    DataSend = 0x10,
    DataAck = 0x11,
}

impl FileTransferCommand {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::CapabilitiesRequest),
            0x02 => Some(Self::CapabilitiesResponse),
            0x03 => Some(Self::TransferRequest),
            0x04 => Some(Self::TransferResponse),
            0x10 => Some(Self::DataSend),
            0x11 => Some(Self::DataAck),
            _ => None,
        }
    }
}

// ── Wire parsing ─────────────────────────────────────────────

fn read_cstr(buf: &[u8], pos: &mut usize) -> Option<String> {
    let rest = buf.get(*pos..)?;
    let end = rest.iter().position(|&b| b == 0)?;
    let s = core::str::from_utf8(&rest[..end]).ok()?.to_string();
    *pos += end + 1;
    Some(s)
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Option<u32> {
    let b = buf.get(*pos..*pos + 4)?;
    *pos += 4;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Parse a `0x03` transfer request.
pub fn decode_offer(payload: &[u8]) -> Option<FileOffer> {
    let session = *payload.get(1)?;
    let mut pos = 2;
    let url = read_cstr(payload, &mut pos)?;
    let filename = read_cstr(payload, &mut pos)?;
    let length = read_u32(payload, &mut pos)?;
    let crc32 = read_u32(payload, &mut pos)?;
    let compressed = match payload.get(pos) {
        None | Some(0) => false,
        Some(1) => true,
        Some(other) => {
            warn!("FileTransfer: unknown compression type {}", other);
            return None;
        }
    };
    Some(FileOffer {
        session,
        url,
        filename,
        length,
        crc32,
        compressed,
    })
}

/// One `0x10` data chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataChunk<'a> {
    pub first: bool,
    pub last: bool,
    pub session: u8,
    pub index: u8,
    pub data: &'a [u8],
}

pub fn decode_chunk(payload: &[u8]) -> Option<DataChunk<'_>> {
    let (&flags, &session, &index) = (payload.get(1)?, payload.get(2)?, payload.get(3)?);
    let mut pos = 4;
    if flags & FLAG_FIRST != 0 {
        pos += 4;
    }
    let size = payload.get(pos..pos + 2)?;
    let size = usize::from(u16::from_le_bytes([size[0], size[1]]));
    pos += 2;
    let data = payload.get(pos..pos + size)?;
    Some(DataChunk {
        first: flags & FLAG_FIRST != 0,
        last: flags & FLAG_LAST != 0,
        session,
        index,
        data,
    })
}

/// Encode a data chunk (band side, used by tests and trace tooling).
pub fn encode_chunk(chunk: &DataChunk<'_>) -> Vec<u8> {
    let mut flags = 0;
    if chunk.first {
        flags |= FLAG_FIRST;
    }
    if chunk.last {
        flags |= FLAG_LAST;
    }
    let mut out = vec![FileTransferCommand::DataSend as u8, flags, chunk.session, chunk.index];
    if chunk.first {
        out.extend_from_slice(&0u32.to_le_bytes());
    }
    out.extend_from_slice(&(chunk.data.len() as u16).to_le_bytes());
    out.extend_from_slice(chunk.data);
    out
}

/// Encode a transfer request (band side, used by tests and trace tooling).
pub fn encode_offer(offer: &FileOffer) -> Vec<u8> {
    let mut out = vec![FileTransferCommand::TransferRequest as u8, offer.session];
    out.extend_from_slice(offer.url.as_bytes());
    out.push(0);
    out.extend_from_slice(offer.filename.as_bytes());
    out.push(0);
    out.extend_from_slice(&offer.length.to_le_bytes());
    out.extend_from_slice(&offer.crc32.to_le_bytes());
    out.push(u8::from(offer.compressed));
    out
}

// ── Handler ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct FileTransferService {
    encrypted: bool,
    chunk_size: Option<u16>,
}

impl FileTransferService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Chunk size the band reported in its capabilities.
    pub fn chunk_size(&self) -> Option<u16> {
        self.chunk_size
    }

    fn respond(ctx: &mut HandlerContext<'_>, session: u8, status: u8) {
        let mut reply = vec![FileTransferCommand::TransferResponse as u8, session, status];
        reply.extend_from_slice(&0u32.to_le_bytes());
        ctx.send(ENDPOINT, reply);
    }

    fn on_offer(ctx: &mut HandlerContext<'_>, payload: &[u8]) {
        let Some(offer) = decode_offer(payload) else {
            warn!("FileTransfer: malformed transfer request");
            return;
        };
        let session = offer.session;
        info!(
            "FileTransfer: request session={} url={} file={} len={} compressed={}",
            session, offer.url, offer.filename, offer.length, offer.compressed
        );

        let mut label = String::from("Receiving ");
        label.push_str(&offer.filename);
        let started = ctx.with_operations(|ops, out| {
            ops.start(&label, Shape::Download(FileDownload::new(offer)), out)
        });
        let status = match started {
            Ok(()) => STATUS_OK,
            Err(e) => {
                warn!("FileTransfer: rejecting session {}: {}", session, e);
                STATUS_REJECTED
            }
        };
        Self::respond(ctx, session, status);
    }

    fn on_data(ctx: &mut HandlerContext<'_>, payload: &[u8]) {
        let Some(chunk) = decode_chunk(payload) else {
            warn!("FileTransfer: malformed data chunk of {} bytes", payload.len());
            return;
        };
        debug!(
            "FileTransfer: session={} index={} {} bytes",
            chunk.session,
            chunk.index,
            chunk.data.len()
        );

        let result = ctx.with_operations(|ops, out| {
            ops.download_chunk(chunk.session, chunk.index, chunk.last, chunk.data, out)
        });
        let status = match result {
            Ok(Some(file)) => {
                info!("FileTransfer: received {} ({} bytes)", file.filename, file.data.len());
                ctx.emit(DeviceEvent::FileReceived {
                    url: file.url,
                    filename: file.filename,
                    data: file.data,
                });
                STATUS_OK
            }
            Ok(None) => STATUS_OK,
            Err(OperationError::NotRunning) => {
                warn!("FileTransfer: no download for session {}", chunk.session);
                return;
            }
            Err(_) => STATUS_REJECTED,
        };
        ctx.send(
            ENDPOINT,
            vec![FileTransferCommand::DataAck as u8, chunk.session, status],
        );
    }
}

impl EndpointHandler for FileTransferService {
    fn endpoint_id(&self) -> u16 {
        ENDPOINT
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    fn set_encrypted(&mut self, encrypted: bool) {
        self.encrypted = encrypted;
    }

    fn handle_payload(&mut self, ctx: &mut HandlerContext<'_>, payload: &[u8]) {
        let Some(&cmd) = payload.first() else {
            return;
        };
        match FileTransferCommand::from_byte(cmd) {
            Some(FileTransferCommand::CapabilitiesResponse) => {
                let (Some(&version), Some(size)) = (payload.get(1), payload.get(2..4)) else {
                    warn!("FileTransfer: short capabilities response");
                    return;
                };
                if version != 1 && version != 2 {
                    warn!("FileTransfer: unsupported service version {}", version);
                    return;
                }
                let size = u16::from_le_bytes([size[0], size[1]]);
                info!("FileTransfer: version {}, chunk size {}", version, size);
                self.chunk_size = Some(size);
            }
            Some(FileTransferCommand::TransferRequest) => Self::on_offer(ctx, payload),
            Some(FileTransferCommand::DataSend) => Self::on_data(ctx, payload),
            Some(
                FileTransferCommand::CapabilitiesRequest
                | FileTransferCommand::TransferResponse
                | FileTransferCommand::DataAck,
            )
            | None => warn!("FileTransfer: unexpected command 0x{:02x}", cmd),
        }
    }

    fn initialize(&mut self, ctx: &mut HandlerContext<'_>) {
        ctx.send(ENDPOINT, vec![FileTransferCommand::CapabilitiesRequest as u8]);
    }
}
