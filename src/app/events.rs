//! Outbound device events.
//!
//! The [`DeviceEngine`](super::engine::DeviceEngine) emits these through the
//! [`EventSink`](super::ports::EventSink) port. Payload *content* (sample
//! blobs, summaries) is passed through undecoded for the persistence layer.

extern crate alloc;
use alloc::string::String;
use alloc::vec::Vec;

use crate::connection::InitPhase;
use crate::error::Error;
use crate::operation::Label;

/// Structured events emitted by the protocol core.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The initialization sequencer moved forward.
    PhaseChanged { from: InitPhase, to: InitPhase },

    /// The device announced a new MTU.
    MtuChanged(usize),

    Battery(BatteryInfo),

    /// Band asks the phone to ring or vibrate (after debounce).
    FindPhone(FindPhoneEvent),

    /// Band acknowledged or stopped a find-band request.
    FindBand(FindBandEvent),

    /// Band reported fall-asleep (`true`) or wake-up (`false`).
    SleepState(bool),

    Steps(u32),
    RealtimeSteps(u32),
    SilentMode(bool),
    Workout(WorkoutStatus),

    /// Legacy workout summary record after padding repair.
    WorkoutSummary { id: [u8; 7], body: Vec<u8> },

    /// Raw history blob from a fan-out fetch.
    ActivityData {
        kind: ActivityKind,
        days_ago: u8,
        data: Vec<u8>,
    },

    /// Summary of the last trainings recorded on the watch.
    TrainingSummary(Vec<u8>),

    /// One heart-rate sample per minute from `start_time` (watch time).
    TrainingSamples { start_time: u32, samples: Vec<u8> },

    /// File pushed by the band and verified against its CRC32.
    FileReceived {
        url: String,
        filename: String,
        data: Vec<u8>,
    },

    OperationStarted(Label),
    OperationProgress { label: Label, percent: u8 },
    OperationFinished(Label),
    OperationFailed { label: Label, error: Error },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryInfo {
    pub level: u8,
    pub charging: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindPhoneEvent {
    Start,
    StartVibrate,
    Ring,
    Vibrate,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindBandEvent {
    Acknowledged,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkoutStatus {
    /// Workout app opened on the band.
    AppOpened { needs_gps: bool, activity: u8 },
    Started,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Steps,
    Sleep,
}
