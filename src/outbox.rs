//! Side-effect buffer shared by handlers, operations and the scheduler.
//!
//! None of those components touch the transport or the application sinks
//! directly. They record what they want done here, and the
//! [`DeviceEngine`](crate::app::engine::DeviceEngine) drains it after every
//! inbound frame, timer tick or application call: requests go through the
//! codec into the outbound queue, events to the [`EventSink`], errors to the
//! [`ErrorSink`], and effects back into the engine's own state machines.
//!
//! [`EventSink`]: crate::app::ports::EventSink
//! [`ErrorSink`]: crate::app::ports::ErrorSink

extern crate alloc;
use alloc::vec::Vec;

use crate::app::events::DeviceEvent;
use crate::app::ports::Characteristic;
use crate::error::Error;

/// A logical frame the engine should encode and enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub endpoint: u16,
    pub payload: Vec<u8>,
    /// Caller's encryption wish; `None` defers to the handler or discovery.
    pub encrypted: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Frame(OutboundRequest),
    Read(Characteristic),
}

/// One entry of the device's supported-services announcement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceEntry {
    pub endpoint: u16,
    pub encrypted: bool,
}

/// Band-side find-phone signals, before debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindPhoneSignal {
    Started,
    Mode { ring: bool },
    Stopped,
}

/// State changes only the engine may apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    MtuAnnounced(usize),
    ServicesDiscovered(Vec<ServiceEntry>),
    FindPhone(FindPhoneSignal),
}

#[derive(Debug, Default)]
pub struct Outbox {
    requests: Vec<Request>,
    events: Vec<DeviceEvent>,
    errors: Vec<Error>,
    effects: Vec<Effect>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame; encryption follows the endpoint's discovered flag.
    pub fn send(&mut self, endpoint: u16, payload: Vec<u8>) {
        self.requests.push(Request::Frame(OutboundRequest {
            endpoint,
            payload,
            encrypted: None,
        }));
    }

    /// Queue a frame with an explicit encryption wish.
    pub fn send_with(&mut self, endpoint: u16, payload: Vec<u8>, encrypted: bool) {
        self.requests.push(Request::Frame(OutboundRequest {
            endpoint,
            payload,
            encrypted: Some(encrypted),
        }));
    }

    pub fn read(&mut self, characteristic: Characteristic) {
        self.requests.push(Request::Read(characteristic));
    }

    pub fn emit(&mut self, event: DeviceEvent) {
        self.events.push(event);
    }

    pub fn report(&mut self, error: Error) {
        self.errors.push(error);
    }

    pub fn effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn requests(&self) -> &[Request] {
        &self.requests
    }

    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn effects(&self) -> &[Effect] {
        &self.effects
    }

    pub fn take_requests(&mut self) -> Vec<Request> {
        core::mem::take(&mut self.requests)
    }

    pub fn take_events(&mut self) -> Vec<DeviceEvent> {
        core::mem::take(&mut self.events)
    }

    pub fn take_errors(&mut self) -> Vec<Error> {
        core::mem::take(&mut self.errors)
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        core::mem::take(&mut self.effects)
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
            && self.events.is_empty()
            && self.errors.is_empty()
            && self.effects.is_empty()
    }

    /// Payloads sent to `endpoint`, in order.
    pub fn sent_to(&self, endpoint: u16) -> Vec<&[u8]> {
        self.requests
            .iter()
            .filter_map(|r| match r {
                Request::Frame(f) if f.endpoint == endpoint => Some(f.payload.as_slice()),
                _ => None,
            })
            .collect()
    }
}
