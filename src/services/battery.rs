//! Battery endpoint: status request and reply.

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use log::{info, warn};

use crate::app::events::{BatteryInfo, DeviceEvent};
use crate::registry::{EndpointHandler, HandlerContext};

pub const ENDPOINT: u16 = 0x0029;

/// Length of a well-formed battery reply.
const REPLY_LEN: usize = 21;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BatteryCommand {
    Request = 0x03,
    Reply = 0x04,
}

impl BatteryCommand {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x03 => Some(Self::Request),
            0x04 => Some(Self::Reply),
            _ => None,
        }
    }
}

/// Status snapshot request sent during initialization.
pub fn request() -> Vec<u8> {
    vec![BatteryCommand::Request as u8]
}

/// Decode a battery reply. Lengths other than 21 are tolerated if the level
/// and charging bytes are present.
pub fn decode_reply(payload: &[u8]) -> Option<BatteryInfo> {
    if payload.len() != REPLY_LEN {
        warn!("Battery: unexpected reply length {}", payload.len());
    }
    let (&level, &charging) = (payload.get(1)?, payload.get(2)?);
    Some(BatteryInfo {
        level,
        charging: charging == 0x01,
    })
}

#[derive(Debug, Default)]
pub struct BatteryService {
    encrypted: bool,
}

impl BatteryService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EndpointHandler for BatteryService {
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
        match BatteryCommand::from_byte(cmd) {
            Some(BatteryCommand::Reply) => {
                if let Some(info) = decode_reply(payload) {
                    info!("Battery: {}%, charging = {}", info.level, info.charging);
                    ctx.emit(DeviceEvent::Battery(info));
                }
            }
            Some(BatteryCommand::Request) | None => {
                warn!("Battery: unexpected command 0x{:02x}", cmd);
            }
        }
    }

    fn on_configure(&mut self, ctx: &mut HandlerContext<'_>, key: &str) -> bool {
        if key != "battery" {
            return false;
        }
        ctx.send(ENDPOINT, request());
        true
    }
}
