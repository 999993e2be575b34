//! Periodic command scheduler.
//!
//! Tick-driven: the engine passes the current [`Instant`] into every call,
//! and the scheduler never reads a clock itself. Whatever a timer produces
//! goes to a [`SchedulerDelegate`], which the engine backs with its outbox
//! so keep-alives are serialized with all other traffic.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Timer classes                           │
//! │                                                              │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────────┐  │
//! │  │ Realtime HR  │   │ Raw sensor   │   │ Find-phone       │  │
//! │  │ START, 1s    │   │ START, 10s   │   │ debounce 1.5s    │  │
//! │  │ CONTINUE     │   │ CONTINUE     │   │ (one-shot)       │  │
//! │  └──────┬───────┘   └──────┬───────┘   └────────┬─────────┘  │
//! │         │                  │                    │            │
//! │         ▼                  ▼                    ▼            │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                  SchedulerDelegate                     │  │
//! │  │        on_command(endpoint, payload) / on_event        │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```

extern crate alloc;
use alloc::vec;
use alloc::vec::Vec;

use embassy_time::{Duration, Instant};
use log::{debug, info};

use crate::app::events::{DeviceEvent, FindPhoneEvent};
use crate::app::ports::SchedulerDelegate;
use crate::config::EngineConfig;
use crate::legacy::{self, StepsCommand};
use crate::outbox::{FindPhoneSignal, Outbox};
use crate::services::heart_rate::{self, RealtimeMode};

// ═══════════════════════════════════════════════════════════════
//  Keep-alive timers
// ═══════════════════════════════════════════════════════════════

/// Streaming modes kept alive by a periodic CONTINUE command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepAlive {
    RealtimeHeartRate,
    RawSensor,
}

impl KeepAlive {
    const ALL: [Self; 2] = [Self::RealtimeHeartRate, Self::RawSensor];

    const fn slot(self) -> usize {
        match self {
            Self::RealtimeHeartRate => 0,
            Self::RawSensor => 1,
        }
    }

    /// Endpoint and payload for one mode command.
    pub fn command(self, mode: RealtimeMode) -> (u16, Vec<u8>) {
        match self {
            Self::RealtimeHeartRate => (heart_rate::ENDPOINT, heart_rate::realtime(mode)),
            Self::RawSensor => (
                legacy::STEPS,
                vec![StepsCommand::EnableRealtime as u8, mode as u8],
            ),
        }
    }
}

/// One running keep-alive. Its presence is the "started" latch.
#[derive(Debug, Clone, Copy)]
struct Running {
    next_due: Instant,
}

// ═══════════════════════════════════════════════════════════════
//  Find-phone debounce
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, Default)]
struct FindPhone {
    /// Start received, not yet reported.
    pending_until: Option<Instant>,
    /// A start has been reported and no stop since.
    active: bool,
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler
// ═══════════════════════════════════════════════════════════════

pub struct PeriodicCommandScheduler {
    running: [Option<Running>; 2],
    intervals: [Duration; 2],
    debounce: Duration,
    find_phone: FindPhone,
}

impl PeriodicCommandScheduler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            running: [None, None],
            intervals: [
                Duration::from_millis(config.realtime_hr_interval_ms),
                Duration::from_millis(config.raw_sensor_interval_ms),
            ],
            debounce: Duration::from_millis(config.find_phone_debounce_ms),
            find_phone: FindPhone::default(),
        }
    }

    pub fn is_running(&self, kind: KeepAlive) -> bool {
        self.running[kind.slot()].is_some()
    }

    pub fn find_phone_pending(&self) -> bool {
        self.find_phone.pending_until.is_some()
    }

    /// A find-phone start has been reported and not yet stopped.
    pub fn find_phone_active(&self) -> bool {
        self.find_phone.active
    }

    /// Whether any timer could still fire.
    pub fn is_idle(&self) -> bool {
        self.running.iter().all(Option::is_none) && !self.find_phone_pending()
    }

    // ── Keep-alives ───────────────────────────────────────────

    /// Enable or disable a streaming mode.
    ///
    /// The first enable sends START and arms the timer; enabling again while
    /// running changes nothing. Disabling sends STOP and cancels the timer
    /// before returning. Returns `true` if a command was sent.
    pub fn set_keep_alive(
        &mut self,
        kind: KeepAlive,
        enable: bool,
        now: Instant,
        delegate: &mut dyn SchedulerDelegate,
    ) -> bool {
        let slot = &mut self.running[kind.slot()];
        match (enable, slot.is_some()) {
            (true, false) => {
                info!("Scheduler: {:?} started", kind);
                *slot = Some(Running {
                    next_due: now + self.intervals[kind.slot()],
                });
                let (endpoint, payload) = kind.command(RealtimeMode::Start);
                delegate.on_command(endpoint, payload);
                true
            }
            (false, true) => {
                info!("Scheduler: {:?} stopped", kind);
                *slot = None;
                let (endpoint, payload) = kind.command(RealtimeMode::Stop);
                delegate.on_command(endpoint, payload);
                true
            }
            (true, true) => {
                debug!("Scheduler: {:?} already running", kind);
                false
            }
            (false, false) => false,
        }
    }

    // ── Find phone ────────────────────────────────────────────

    /// Feed a band-side find-phone signal through the debounce window.
    pub fn find_phone(&mut self, signal: FindPhoneSignal, now: Instant, delegate: &mut dyn SchedulerDelegate) {
        match signal {
            FindPhoneSignal::Started => {
                if self.find_phone.pending_until.is_some() {
                    debug!("Scheduler: find-phone start repeated, rescheduling");
                }
                self.find_phone.pending_until = Some(now + self.debounce);
            }
            FindPhoneSignal::Mode { ring } => {
                self.fire_find_phone_if_due(now, delegate);
                let merged = self.find_phone.pending_until.take().is_some();
                let event = if !self.find_phone.active {
                    if merged {
                        info!("Scheduler: find-phone start merged with mode, ring = {}", ring);
                    } else {
                        info!("Scheduler: find-phone mode before any start, starting, ring = {}", ring);
                    }
                    self.find_phone.active = true;
                    if ring {
                        FindPhoneEvent::Start
                    } else {
                        FindPhoneEvent::StartVibrate
                    }
                } else if ring {
                    FindPhoneEvent::Ring
                } else {
                    FindPhoneEvent::Vibrate
                };
                delegate.on_event(DeviceEvent::FindPhone(event));
            }
            FindPhoneSignal::Stopped => {
                self.find_phone = FindPhone::default();
                delegate.on_event(DeviceEvent::FindPhone(FindPhoneEvent::Stop));
            }
        }
    }

    fn fire_find_phone_if_due(&mut self, now: Instant, delegate: &mut dyn SchedulerDelegate) {
        let due = self.find_phone.pending_until.is_some_and(|deadline| now >= deadline);
        if due {
            info!("Scheduler: find-phone debounce elapsed");
            self.find_phone.pending_until = None;
            self.find_phone.active = true;
            delegate.on_event(DeviceEvent::FindPhone(FindPhoneEvent::Start));
        }
    }

    // ── Tick ──────────────────────────────────────────────────

    /// Fire every timer that is due at `now`.
    ///
    /// A keep-alive sends at most one CONTINUE per tick even if several
    /// periods were missed; the next one is due a full interval later.
    pub fn tick(&mut self, now: Instant, delegate: &mut dyn SchedulerDelegate) {
        for kind in KeepAlive::ALL {
            let interval = self.intervals[kind.slot()];
            let Some(running) = &mut self.running[kind.slot()] else {
                continue;
            };
            if now >= running.next_due {
                debug!("Scheduler: {:?} continue", kind);
                running.next_due = now + interval;
                let (endpoint, payload) = kind.command(RealtimeMode::Continue);
                delegate.on_command(endpoint, payload);
            }
        }
        self.fire_find_phone_if_due(now, delegate);
    }

    /// Cancel every timer without sending anything. Used on disconnect.
    pub fn cancel_all(&mut self) {
        if !self.is_idle() {
            info!("Scheduler: cancelling all timers");
        }
        self.running = [None, None];
        self.find_phone = FindPhone::default();
    }
}

impl SchedulerDelegate for Outbox {
    fn on_command(&mut self, endpoint: u16, payload: Vec<u8>) {
        self.send(endpoint, payload);
    }

    fn on_event(&mut self, event: DeviceEvent) {
        self.emit(event);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
