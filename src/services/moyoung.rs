//! Moyoung packet handlers.
//!
//! Moyoung devices have a single packet channel; the packet type byte plays
//! the role of the endpoint id. Activity history is a fixed fan-out fetch,
//! training heart-rate a paged fetch started by the watch.
//!
//! ```text
//!   start_activity_fetch
//!     ├─ 51 [3], 51 [4], 50, 51 [1], 51 [2]   (sleep + past steps)
//!     ├─ read Steps characteristic            (today's steps)
//!     └─ 55                                    (training summary)
//!
//!   watch ── 52 [0, time, hr…] ──▶ phone ── 52 ──▶ watch ── 52 [1, hr…] ── … ── 52 [2]
//!                                                         └─▶ phone ── 55 ──▶ summary
//! ```

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use log::{info, warn};

use crate::app::events::{ActivityKind, DeviceEvent, FindPhoneEvent};
use crate::app::ports::Characteristic;
use crate::error::OperationError;
use crate::operation::{OperationTracker, PageOutcome, PagedFetch, Shape, SubResponse};
use crate::outbox::Outbox;
use crate::registry::{EndpointHandler, HandlerContext};

pub const CMD_SYNC_SLEEP: u16 = 50;
pub const CMD_SYNC_PAST_SLEEP_AND_STEP: u16 = 51;
pub const CMD_QUERY_LAST_DYNAMIC_RATE: u16 = 52;
pub const CMD_QUERY_MOVEMENT_HEART_RATE: u16 = 55;
pub const CMD_FIND_MY_PHONE: u16 = 98;

/// Arguments of [`CMD_SYNC_PAST_SLEEP_AND_STEP`].
///
/// The names follow the vendor app, which has them swapped: the data that
/// comes back for `YesterdaySteps` is from two days ago, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PastArg {
    YesterdaySteps = 1,
    DayBeforeYesterdaySteps = 2,
    YesterdaySleep = 3,
    DayBeforeYesterdaySleep = 4,
}

impl PastArg {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::YesterdaySteps),
            2 => Some(Self::DayBeforeYesterdaySteps),
            3 => Some(Self::YesterdaySleep),
            4 => Some(Self::DayBeforeYesterdaySleep),
            _ => None,
        }
    }

    /// What the reply actually contains.
    fn actual(self) -> (ActivityKind, u8) {
        match self {
            Self::YesterdaySteps => (ActivityKind::Steps, 2),
            Self::DayBeforeYesterdaySteps => (ActivityKind::Steps, 1),
            Self::YesterdaySleep => (ActivityKind::Sleep, 2),
            Self::DayBeforeYesterdaySleep => (ActivityKind::Sleep, 1),
        }
    }
}

/// First byte of a [`CMD_QUERY_LAST_DYNAMIC_RATE`] page.
const TRANSMISSION_FIRST: u8 = 0;

pub const FETCH_ACTIVITY_LABEL: &str = "Fetching activity data";
pub const FETCH_TRAINING_LABEL: &str = "Fetching training data";

fn sub_response(kind: ActivityKind, days_ago: u8) -> SubResponse {
    match kind {
        ActivityKind::Steps => SubResponse::Steps(days_ago),
        ActivityKind::Sleep => SubResponse::Sleep(days_ago),
    }
}

fn deliver(kind: ActivityKind, days_ago: u8, data: &[u8], ops: &mut OperationTracker, out: &mut Outbox) {
    info!("Moyoung: {:?} history, {} days ago, {} bytes", kind, days_ago, data.len());
    out.emit(DeviceEvent::ActivityData {
        kind,
        days_ago,
        data: data.to_vec(),
    });
    ops.mark_received(sub_response(kind, days_ago), out);
}

/// Queue the requests of an activity-history fetch, in the vendor app's order.
pub fn queue_activity_fetch(out: &mut Outbox) {
    for arg in [PastArg::YesterdaySleep, PastArg::DayBeforeYesterdaySleep] {
        out.send(CMD_SYNC_PAST_SLEEP_AND_STEP, vec![arg as u8]);
    }
    out.send(CMD_SYNC_SLEEP, Vec::new());
    for arg in [PastArg::YesterdaySteps, PastArg::DayBeforeYesterdaySteps] {
        out.send(CMD_SYNC_PAST_SLEEP_AND_STEP, vec![arg as u8]);
    }
    out.read(Characteristic::Steps);
    out.send(CMD_QUERY_MOVEMENT_HEART_RATE, Vec::new());
}

/// Today's steps, read from the steps characteristic.
pub fn on_steps_read(data: &[u8], ops: &mut OperationTracker, out: &mut Outbox) {
    deliver(ActivityKind::Steps, 0, data, ops, out);
}

// ── Handlers ─────────────────────────────────────────────────

/// `50`: today's sleep.
#[derive(Debug, Default)]
pub struct SleepTodayHandler;

impl EndpointHandler for SleepTodayHandler {
    fn endpoint_id(&self) -> u16 {
        CMD_SYNC_SLEEP
    }

    fn is_encrypted(&self) -> bool {
        false
    }

    fn set_encrypted(&mut self, _encrypted: bool) {}

    fn handle_payload(&mut self, ctx: &mut HandlerContext<'_>, payload: &[u8]) {
        ctx.with_operations(|ops, out| deliver(ActivityKind::Sleep, 0, payload, ops, out));
    }
}

/// `51`: steps and sleep of the two previous days.
#[derive(Debug, Default)]
pub struct PastActivityHandler;

impl EndpointHandler for PastActivityHandler {
    fn endpoint_id(&self) -> u16 {
        CMD_SYNC_PAST_SLEEP_AND_STEP
    }

    fn is_encrypted(&self) -> bool {
        false
    }

    fn set_encrypted(&mut self, _encrypted: bool) {}

    fn handle_payload(&mut self, ctx: &mut HandlerContext<'_>, payload: &[u8]) {
        let Some(arg) = payload.first().copied().and_then(PastArg::from_byte) else {
            warn!("Moyoung: unexpected past-activity argument {:?}", payload.first());
            return;
        };
        let (kind, days_ago) = arg.actual();
        ctx.with_operations(|ops, out| deliver(kind, days_ago, &payload[1..], ops, out));
    }
}

/// `52`: training heart-rate pages pushed by the watch after a workout.
#[derive(Debug)]
pub struct TrainingRateHandler {
    max_pages: u16,
}

impl TrainingRateHandler {
    pub fn new(max_pages: u16) -> Self {
        Self { max_pages }
    }
}

impl EndpointHandler for TrainingRateHandler {
    fn endpoint_id(&self) -> u16 {
        CMD_QUERY_LAST_DYNAMIC_RATE
    }

    fn is_encrypted(&self) -> bool {
        false
    }

    fn set_encrypted(&mut self, _encrypted: bool) {}

    fn handle_payload(&mut self, ctx: &mut HandlerContext<'_>, payload: &[u8]) {
        let max_pages = self.max_pages;
        let outcome = ctx.with_operations(|ops, out| {
            if payload.first() == Some(&TRANSMISSION_FIRST) && !ops.is_paging() {
                ops.start(FETCH_TRAINING_LABEL, Shape::Paged(PagedFetch::new(max_pages)), out)?;
            }
            ops.page(payload, out)
        });

        match outcome {
            Ok(PageOutcome::More) => ctx.send(CMD_QUERY_LAST_DYNAMIC_RATE, Vec::new()),
            Ok(PageOutcome::Complete(data)) => {
                if data.len() < 4 {
                    warn!("Moyoung: training data of {} bytes has no start time", data.len());
                } else {
                    let start_time = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                    info!("Moyoung: training from {} with {} samples", start_time, data.len() - 4);
                    ctx.emit(DeviceEvent::TrainingSamples {
                        start_time,
                        samples: data[4..].to_vec(),
                    });
                }
                ctx.send(CMD_QUERY_MOVEMENT_HEART_RATE, Vec::new());
            }
            Err(OperationError::Busy) => warn!("Moyoung: training data arrived while busy, dropping"),
            Err(OperationError::NotRunning) => warn!("Moyoung: training page without a transfer"),
            Err(e) => warn!("Moyoung: training transfer aborted: {}", e),
        }
    }
}

/// `55`: summary of the last trainings.
#[derive(Debug, Default)]
pub struct TrainingSummaryHandler;

impl EndpointHandler for TrainingSummaryHandler {
    fn endpoint_id(&self) -> u16 {
        CMD_QUERY_MOVEMENT_HEART_RATE
    }

    fn is_encrypted(&self) -> bool {
        false
    }

    fn set_encrypted(&mut self, _encrypted: bool) {}

    fn handle_payload(&mut self, ctx: &mut HandlerContext<'_>, payload: &[u8]) {
        info!("Moyoung: training summary, {} bytes", payload.len());
        ctx.emit(DeviceEvent::TrainingSummary(payload.to_vec()));
        ctx.with_operations(|ops, out| ops.mark_received(SubResponse::Training, out));
    }
}

/// `98`: find my phone. `0` starts, anything else stops.
#[derive(Debug, Default)]
pub struct FindMyPhoneHandler;

impl EndpointHandler for FindMyPhoneHandler {
    fn endpoint_id(&self) -> u16 {
        CMD_FIND_MY_PHONE
    }

    fn is_encrypted(&self) -> bool {
        false
    }

    fn set_encrypted(&mut self, _encrypted: bool) {}

    fn handle_payload(&mut self, ctx: &mut HandlerContext<'_>, payload: &[u8]) {
        let event = if payload.first() == Some(&0) {
            FindPhoneEvent::Start
        } else {
            FindPhoneEvent::Stop
        };
        info!("Moyoung: find my phone {:?}", event);
        ctx.emit(DeviceEvent::FindPhone(event));
    }
}

/// Stop command for find-my-phone sent from the phone.
pub fn stop_find_phone() -> Vec<u8> {
    vec![0xff]
}

/// The standard Moyoung handler set.
pub fn handlers(training_max_pages: u16) -> Vec<Box<dyn EndpointHandler>> {
    vec![
        Box::new(SleepTodayHandler),
        Box::new(PastActivityHandler),
        Box::new(TrainingRateHandler::new(training_max_pages)),
        Box::new(TrainingSummaryHandler),
        Box::new(FindMyPhoneHandler),
    ]
}
