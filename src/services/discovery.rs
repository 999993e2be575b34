//! Service discovery endpoint.
//!
//! Response layout:
//! ```text
//! ┌──────┬──────────────┬─────────────────────────────────────┐
//! │ 0x04 │ count u16 LE │ count × { endpoint u16 LE, enc u8 } │
//! └──────┴──────────────┴─────────────────────────────────────┘
//! ```

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use log::{info, warn};

use crate::outbox::{Effect, ServiceEntry};
use crate::registry::{EndpointHandler, HandlerContext};

pub const ENDPOINT: u16 = 0x0000;

const ENTRY_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiscoveryCommand {
    Request = 0x03,
    Response = 0x04,
}

impl DiscoveryCommand {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x03 => Some(Self::Request),
            0x04 => Some(Self::Response),
            _ => None,
        }
    }
}

pub fn request() -> Vec<u8> {
    vec![DiscoveryCommand::Request as u8]
}

/// Parse a discovery response. A count that disagrees with the length
/// rejects the whole list.
pub fn decode_response(payload: &[u8]) -> Option<Vec<ServiceEntry>> {
    let count = payload.get(1..3).map(|c| usize::from(u16::from_le_bytes([c[0], c[1]])))?;
    let entries = &payload[3..];
    if entries.len() != count * ENTRY_LEN {
        warn!(
            "Discovery: {} services announced but {} bytes of entries",
            count,
            entries.len()
        );
        return None;
    }
    Some(
        entries
            .chunks_exact(ENTRY_LEN)
            .map(|e| ServiceEntry {
                endpoint: u16::from_le_bytes([e[0], e[1]]),
                encrypted: e[2] != 0,
            })
            .collect(),
    )
}

/// Encode a response (device side, used by tests and trace tooling).
pub fn encode_response(services: &[ServiceEntry]) -> Vec<u8> {
    let mut out = Vec::with_capacity(3 + services.len() * ENTRY_LEN);
    out.push(DiscoveryCommand::Response as u8);
    out.extend_from_slice(&(services.len() as u16).to_le_bytes());
    for s in services {
        out.extend_from_slice(&s.endpoint.to_le_bytes());
        out.push(u8::from(s.encrypted));
    }
    out
}

#[derive(Debug, Default)]
pub struct DiscoveryService;

impl DiscoveryService {
    pub fn new() -> Self {
        Self
    }
}

impl EndpointHandler for DiscoveryService {
    fn endpoint_id(&self) -> u16 {
        ENDPOINT
    }

    fn is_encrypted(&self) -> bool {
        false
    }

    fn set_encrypted(&mut self, encrypted: bool) {
        if encrypted {
            warn!("Discovery: ignoring request to encrypt the discovery endpoint");
        }
    }

    fn handle_payload(&mut self, ctx: &mut HandlerContext<'_>, payload: &[u8]) {
        let Some(&cmd) = payload.first() else {
            return;
        };
        match DiscoveryCommand::from_byte(cmd) {
            Some(DiscoveryCommand::Response) => {
                if let Some(services) = decode_response(payload) {
                    info!("Discovery: device supports {} services", services.len());
                    ctx.effect(Effect::ServicesDiscovered(services));
                }
            }
            Some(DiscoveryCommand::Request) | None => {
                warn!("Discovery: unexpected command 0x{:02x}", cmd);
            }
        }
    }
}
