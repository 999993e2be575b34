//! Heart-rate endpoint: realtime mode acknowledgements and sleep state.
//!
//! The realtime start/continue/stop commands themselves come from the
//! [`PeriodicCommandScheduler`](crate::scheduler::PeriodicCommandScheduler).

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use log::{info, warn};

use crate::app::events::DeviceEvent;
use crate::registry::{EndpointHandler, HandlerContext};

pub const ENDPOINT: u16 = 0x001d;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HeartRateCommand {
    RealtimeSet = 0x04,
    RealtimeAck = 0x05,
    Sleep = 0x06,
}

impl HeartRateCommand {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x04 => Some(Self::RealtimeSet),
            0x05 => Some(Self::RealtimeAck),
            0x06 => Some(Self::Sleep),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RealtimeMode {
    Stop = 0x00,
    Start = 0x01,
    Continue = 0x02,
}

/// `[0x04, mode]` realtime mode command.
pub fn realtime(mode: RealtimeMode) -> Vec<u8> {
    vec![HeartRateCommand::RealtimeSet as u8, mode as u8]
}

const FELL_ASLEEP: u8 = 0x01;
const WOKE_UP: u8 = 0x00;

#[derive(Debug, Default)]
pub struct HeartRateService {
    encrypted: bool,
}

impl HeartRateService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EndpointHandler for HeartRateService {
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
        match HeartRateCommand::from_byte(cmd) {
            Some(HeartRateCommand::RealtimeAck) => {
                info!("HeartRate: band acknowledged realtime command, status = {:?}", payload.get(1));
            }
            Some(HeartRateCommand::Sleep) => match payload.get(1).copied() {
                Some(FELL_ASLEEP) => {
                    info!("HeartRate: fell asleep");
                    ctx.emit(DeviceEvent::SleepState(true));
                }
                Some(WOKE_UP) => {
                    info!("HeartRate: woke up");
                    ctx.emit(DeviceEvent::SleepState(false));
                }
                other => warn!("HeartRate: unexpected sleep byte {:?}", other),
            },
            Some(HeartRateCommand::RealtimeSet) | None => {
                warn!("HeartRate: unexpected command 0x{:02x}", cmd);
            }
        }
    }
}
