//! Connection endpoint: MTU announcement and keep-alive ping.

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use log::{info, warn};

use crate::outbox::Effect;
use crate::registry::{EndpointHandler, HandlerContext};

pub const ENDPOINT: u16 = 0x0015;

/// ATT header bytes the band leaves out of its MTU announcement.
const ATT_OVERHEAD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionCommand {
    MtuRequest = 0x01,
    MtuResponse = 0x02,
    Ping = 0x03,
    Pong = 0x04,
}

impl ConnectionCommand {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::MtuRequest),
            0x02 => Some(Self::MtuResponse),
            0x03 => Some(Self::Ping),
            0x04 => Some(Self::Pong),
            _ => None,
        }
    }
}

/// `[0x01]`: ask the band to announce its MTU.
pub fn mtu_request() -> Vec<u8> {
    vec![ConnectionCommand::MtuRequest as u8]
}

#[derive(Debug, Default)]
pub struct ConnectionService {
    encrypted: bool,
}

impl ConnectionService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EndpointHandler for ConnectionService {
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
        match ConnectionCommand::from_byte(cmd) {
            Some(ConnectionCommand::MtuResponse) => {
                let Some(raw) = payload.get(1..3) else {
                    warn!("Connection: short MTU response of {} bytes", payload.len());
                    return;
                };
                let mtu = usize::from(u16::from_le_bytes([raw[0], raw[1]])) + ATT_OVERHEAD;
                info!("Connection: device announced MTU {}", mtu);
                ctx.effect(Effect::MtuAnnounced(mtu));
            }
            Some(ConnectionCommand::Ping) => {
                ctx.send(ENDPOINT, vec![ConnectionCommand::Pong as u8]);
            }
            Some(ConnectionCommand::MtuRequest | ConnectionCommand::Pong) | None => {
                warn!("Connection: unexpected command 0x{:02x}", cmd);
            }
        }
    }
}
