//! Find-device endpoint: find-band from the phone, find-phone from the band.
//!
//! Find-phone signals are not turned into events here. The band follows a
//! start with a mode byte shortly after, so the engine debounces them in the
//! scheduler before anything reaches the application.

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use log::{info, warn};

use crate::app::events::{DeviceEvent, FindBandEvent};
use crate::outbox::{Effect, FindPhoneSignal};
use crate::registry::{EndpointHandler, HandlerContext};

pub const ENDPOINT: u16 = 0x001a;

/// Status byte following an acknowledgement.
pub const STATUS_SUCCESS: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FindDeviceCommand {
    BandStart = 0x03,
    BandAck = 0x04,
    BandStopFromPhone = 0x06,
    BandStopFromBand = 0x07,
    PhoneStart = 0x11,
    PhoneAck = 0x12,
    PhoneStopFromBand = 0x13,
    PhoneStopFromPhone = 0x14,
    PhoneMode = 0x15,
}

impl FindDeviceCommand {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x03 => Some(Self::BandStart),
            0x04 => Some(Self::BandAck),
            0x06 => Some(Self::BandStopFromPhone),
            0x07 => Some(Self::BandStopFromBand),
            0x11 => Some(Self::PhoneStart),
            0x12 => Some(Self::PhoneAck),
            0x13 => Some(Self::PhoneStopFromBand),
            0x14 => Some(Self::PhoneStopFromPhone),
            0x15 => Some(Self::PhoneMode),
            _ => None,
        }
    }
}

/// Start or stop making the band ring.
pub fn find_band(start: bool) -> Vec<u8> {
    let cmd = if start {
        FindDeviceCommand::BandStart
    } else {
        FindDeviceCommand::BandStopFromPhone
    };
    vec![cmd as u8]
}

/// Tell the band the user found the phone.
pub fn stop_find_phone() -> Vec<u8> {
    vec![FindDeviceCommand::PhoneStopFromPhone as u8]
}

#[derive(Debug, Default)]
pub struct FindDeviceService {
    encrypted: bool,
}

impl FindDeviceService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EndpointHandler for FindDeviceService {
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
        match FindDeviceCommand::from_byte(cmd) {
            Some(FindDeviceCommand::BandAck) => {
                info!("FindDevice: band acknowledged find band");
                ctx.emit(DeviceEvent::FindBand(FindBandEvent::Acknowledged));
            }
            Some(FindDeviceCommand::BandStopFromBand) => {
                info!("FindDevice: find band stopped on band");
                ctx.emit(DeviceEvent::FindBand(FindBandEvent::Stopped));
            }
            Some(FindDeviceCommand::PhoneStart) => {
                info!("FindDevice: find phone start");
                ctx.send(ENDPOINT, vec![FindDeviceCommand::PhoneAck as u8, STATUS_SUCCESS]);
                ctx.effect(Effect::FindPhone(FindPhoneSignal::Started));
            }
            Some(FindDeviceCommand::PhoneStopFromBand) => {
                info!("FindDevice: find phone stop");
                ctx.effect(Effect::FindPhone(FindPhoneSignal::Stopped));
            }
            Some(FindDeviceCommand::PhoneMode) => {
                let Some(&mode) = payload.get(1) else {
                    warn!("FindDevice: mode command without mode byte");
                    return;
                };
                let ring = mode == 0x01;
                info!("FindDevice: find phone mode, ring = {}", ring);
                ctx.effect(Effect::FindPhone(FindPhoneSignal::Mode { ring }));
            }
            Some(
                FindDeviceCommand::BandStart
                | FindDeviceCommand::BandStopFromPhone
                | FindDeviceCommand::PhoneAck
                | FindDeviceCommand::PhoneStopFromPhone,
            )
            | None => warn!("FindDevice: unexpected command 0x{:02x}", cmd),
        }
    }
}
