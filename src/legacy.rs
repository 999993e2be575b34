//! Fixed dispatch for ZeppOS endpoints without a first-class handler.
//!
//! Each endpoint has its own command enum; matches are exhaustive, so a new
//! command code shows up as a compile error here rather than a silent drop.

extern crate alloc;
use alloc::vec;

use log::{debug, info, warn};

use crate::app::events::{DeviceEvent, WorkoutStatus};
use crate::protocol::padding;
use crate::registry::HandlerContext;

pub const WEATHER: u16 = 0x000e;
pub const STEPS: u16 = 0x0016;
pub const USER_INFO: u16 = 0x0017;
pub const VIBRATION: u16 = 0x0018;
pub const WORKOUT: u16 = 0x0019;
pub const SILENT_MODE: u16 = 0x003b;
pub const COMPAT: u16 = 0x0090;

/// Length of the step counter block carried by steps replies.
const STEPS_BLOCK_LEN: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegacyEndpoint {
    Weather,
    Steps,
    UserInfo,
    Vibration,
    Workout,
    SilentMode,
    Compat,
}

impl LegacyEndpoint {
    fn from_id(id: u16) -> Option<Self> {
        match id {
            WEATHER => Some(Self::Weather),
            STEPS => Some(Self::Steps),
            USER_INFO => Some(Self::UserInfo),
            VIBRATION => Some(Self::Vibration),
            WORKOUT => Some(Self::Workout),
            SILENT_MODE => Some(Self::SilentMode),
            COMPAT => Some(Self::Compat),
            _ => None,
        }
    }
}

// ── Command sets ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StepsCommand {
    Get = 0x03,
    Reply = 0x04,
    EnableRealtime = 0x05,
    RealtimeAck = 0x06,
    RealtimeNotification = 0x07,
}

impl StepsCommand {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x03 => Some(Self::Get),
            0x04 => Some(Self::Reply),
            0x05 => Some(Self::EnableRealtime),
            0x06 => Some(Self::RealtimeAck),
            0x07 => Some(Self::RealtimeNotification),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum UserInfoCommand {
    Set = 0x01,
    Ack = 0x02,
}

impl UserInfoCommand {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Set),
            0x02 => Some(Self::Ack),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum VibrationCommand {
    Set = 0x03,
    Ack = 0x04,
}

impl VibrationCommand {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x03 => Some(Self::Set),
            0x04 => Some(Self::Ack),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum WorkoutCommand {
    Summary = 0x03,
    GpsLocation = 0x04,
    Status = 0x11,
    AppOpen = 0x20,
}

impl WorkoutCommand {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x03 => Some(Self::Summary),
            0x04 => Some(Self::GpsLocation),
            0x11 => Some(Self::Status),
            0x20 => Some(Self::AppOpen),
            _ => None,
        }
    }
}

const WORKOUT_STATUS_START: u8 = 0x01;
const WORKOUT_STATUS_END: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum WeatherCommand {
    SetDefaultLocation = 0x09,
    DefaultLocationAck = 0x0a,
}

impl WeatherCommand {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x09 => Some(Self::SetDefaultLocation),
            0x0a => Some(Self::DefaultLocationAck),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SilentModeCommand {
    CapabilitiesRequest = 0x01,
    CapabilitiesResponse = 0x02,
    NotifyBand = 0x03,
    NotifyBandAck = 0x04,
    Query = 0x05,
    Reply = 0x06,
    Set = 0x07,
    Ack = 0x08,
}

impl SilentModeCommand {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::CapabilitiesRequest),
            0x02 => Some(Self::CapabilitiesResponse),
            0x03 => Some(Self::NotifyBand),
            0x04 => Some(Self::NotifyBandAck),
            0x05 => Some(Self::Query),
            0x06 => Some(Self::Reply),
            0x07 => Some(Self::Set),
            0x08 => Some(Self::Ack),
            _ => None,
        }
    }
}

// ── Routing ──────────────────────────────────────────────────

fn unexpected(name: &str, cmd: u8) {
    warn!("Legacy: unexpected {} command 0x{:02x}", name, cmd);
}

/// Handle `payload` if `endpoint` belongs to the legacy table.
///
/// Returns `false` for endpoints the table does not know. `payload` must be
/// non-empty.
pub fn route(endpoint: u16, payload: &[u8], ctx: &mut HandlerContext<'_>) -> bool {
    let Some(ep) = LegacyEndpoint::from_id(endpoint) else {
        return false;
    };
    let Some(&cmd) = payload.first() else {
        return true;
    };

    match ep {
        LegacyEndpoint::Weather => weather(cmd, payload),
        LegacyEndpoint::Steps => steps(cmd, payload, ctx),
        LegacyEndpoint::UserInfo => user_info(cmd, payload),
        LegacyEndpoint::Vibration => vibration(cmd, payload),
        LegacyEndpoint::Workout => workout(cmd, payload, ctx),
        LegacyEndpoint::SilentMode => silent_mode(cmd, payload, ctx),
        LegacyEndpoint::Compat => {
            debug!("Legacy: compat command 0x{:02x} ({} bytes)", cmd, payload.len());
        }
    }
    true
}

fn weather(cmd: u8, payload: &[u8]) {
    match WeatherCommand::from_byte(cmd) {
        Some(WeatherCommand::DefaultLocationAck) => {
            info!("Legacy: weather default location ACK, status = {:?}", payload.get(1));
        }
        Some(WeatherCommand::SetDefaultLocation) | None => unexpected("weather", cmd),
    }
}

fn steps_at(block: &[u8]) -> Option<u32> {
    if block.len() != STEPS_BLOCK_LEN {
        warn!("Legacy: unrecognized steps block of {} bytes", block.len());
        return None;
    }
    Some(u32::from(u16::from_le_bytes([block[1], block[2]])))
}

fn steps(cmd: u8, payload: &[u8], ctx: &mut HandlerContext<'_>) {
    match StepsCommand::from_byte(cmd) {
        Some(StepsCommand::Reply) => {
            info!("Legacy: steps reply, status = {:?}", payload.get(1));
            if let Some(steps) = payload.get(2..).and_then(steps_at) {
                ctx.emit(DeviceEvent::Steps(steps));
            }
        }
        Some(StepsCommand::RealtimeAck) => {
            info!(
                "Legacy: realtime steps ACK, status = {:?}, enabled = {:?}",
                payload.get(1),
                payload.get(2)
            );
        }
        Some(StepsCommand::RealtimeNotification) => {
            if let Some(steps) = steps_at(&payload[1..]) {
                debug!("Legacy: realtime steps {}", steps);
                ctx.emit(DeviceEvent::RealtimeSteps(steps));
            }
        }
        Some(StepsCommand::Get | StepsCommand::EnableRealtime) | None => unexpected("steps", cmd),
    }
}

fn user_info(cmd: u8, payload: &[u8]) {
    match UserInfoCommand::from_byte(cmd) {
        Some(UserInfoCommand::Ack) => info!("Legacy: user info ACK, status = {:?}", payload.get(1)),
        Some(UserInfoCommand::Set) | None => unexpected("user info", cmd),
    }
}

fn vibration(cmd: u8, payload: &[u8]) {
    match VibrationCommand::from_byte(cmd) {
        Some(VibrationCommand::Ack) => {
            info!("Legacy: vibration patterns ACK, status = {:?}", payload.get(1));
        }
        Some(VibrationCommand::Set) | None => unexpected("vibration", cmd),
    }
}

fn workout(cmd: u8, payload: &[u8], ctx: &mut HandlerContext<'_>) {
    match WorkoutCommand::from_byte(cmd) {
        Some(WorkoutCommand::Summary) => {
            let Some(record) = padding::repair(&payload[1..]) else {
                return;
            };
            let Some((id, body)) = padding::split(&record) else {
                warn!("Legacy: workout summary without body");
                return;
            };
            let mut record_id = [0u8; padding::ID_LEN];
            record_id.copy_from_slice(id);
            info!("Legacy: workout summary, {} bytes", body.len());
            ctx.emit(DeviceEvent::WorkoutSummary {
                id: record_id,
                body: body.to_vec(),
            });
        }
        Some(WorkoutCommand::Status) => match payload.get(1).copied() {
            Some(WORKOUT_STATUS_START) => {
                info!("Legacy: workout start");
                ctx.emit(DeviceEvent::Workout(WorkoutStatus::Started));
            }
            Some(WORKOUT_STATUS_END) => {
                info!("Legacy: workout end");
                ctx.emit(DeviceEvent::Workout(WorkoutStatus::Ended));
            }
            other => warn!("Legacy: unexpected workout status {:?}", other),
        },
        Some(WorkoutCommand::AppOpen) => {
            let (Some(&gps), Some(&activity)) = (payload.get(2), payload.get(3)) else {
                warn!("Legacy: short workout app-open of {} bytes", payload.len());
                return;
            };
            let needs_gps = gps == 1;
            info!("Legacy: workout app open, activity 0x{:02x}, gps = {}", activity, needs_gps);
            ctx.emit(DeviceEvent::Workout(WorkoutStatus::AppOpened { needs_gps, activity }));
        }
        Some(WorkoutCommand::GpsLocation) | None => unexpected("workout", cmd),
    }
}

fn silent_mode(cmd: u8, payload: &[u8], ctx: &mut HandlerContext<'_>) {
    match SilentModeCommand::from_byte(cmd) {
        Some(SilentModeCommand::CapabilitiesResponse) => {
            info!("Legacy: silent mode capabilities {:02x?}", &payload[1..]);
        }
        Some(SilentModeCommand::NotifyBandAck) => {
            info!("Legacy: band acknowledged silent mode, status = {:?}", payload.get(1));
        }
        Some(SilentModeCommand::Query) => {
            info!("Legacy: silent mode query from band");
        }
        Some(SilentModeCommand::Set) => {
            let enabled = payload.get(1) == Some(&0x01);
            info!("Legacy: band set silent mode = {}", enabled);
            ctx.send(SILENT_MODE, vec![SilentModeCommand::Ack as u8]);
            ctx.emit(DeviceEvent::SilentMode(enabled));
        }
        Some(
            SilentModeCommand::CapabilitiesRequest
            | SilentModeCommand::NotifyBand
            | SilentModeCommand::Reply
            | SilentModeCommand::Ack,
        )
        | None => unexpected("silent mode", cmd),
    }
}

/// Default handler for configuration keys no registered handler took.
pub fn on_configure(key: &str, ctx: &mut HandlerContext<'_>) -> bool {
    match key {
        "steps" => ctx.send(STEPS, vec![StepsCommand::Get as u8]),
        "silent_mode" => ctx.send(SILENT_MODE, vec![SilentModeCommand::CapabilitiesRequest as u8]),
        _ => return false,
    }
    info!("Legacy: sent configuration '{}'", key);
    true
}

// ── Tests ────────────────────────────────────────────────────
