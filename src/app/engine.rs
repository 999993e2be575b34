//! Device engine: the composition root for one device connection.
//!
//! [`DeviceEngine`] owns every piece of per-connection state (reassembly,
//! connection state, registry, sequencer, scheduler, operations and the
//! outbound queue). The transport is owned as a long-lived driven adapter;
//! event and error sinks are injected at each call site.
//!
//! ```text
//!  TransportPort ──notify──▶ ┌──────────────────────────────┐ ──▶ EventSink
//!                            │         DeviceEngine          │
//!  TransportPort ◀──write─── │ Reassembly · Dispatch · Init  │ ──▶ ErrorSink
//!                            │ Scheduler · Operations · Queue│
//!                            └──────────────────────────────┘
//! ```
//!
//! Every entry point follows the same shape: run the component, collect
//! what it wants done in an [`Outbox`], then `pump` applies effects,
//! encodes requests into the outbound queue, hands events and errors to
//! the sinks, and flushes the queue to the transport.

extern crate alloc;
use alloc::boxed::Box;
use alloc::collections::BTreeSet;
use alloc::format;
use alloc::vec::Vec;

use embassy_time::Instant;
use log::{debug, error, info, warn};

use crate::config::{Dialect, EngineConfig};
use crate::connection::{ConnectionState, InitPhase};
use crate::error::{CodecError, Error, OperationError, Result, SequenceError, TransportError};
use crate::init::{InitPlan, InitializationSequencer};
use crate::operation::{FanOut, OperationTracker, Shape, Transfer, TransferKind};
use crate::outbox::{Effect, OutboundRequest, Outbox, Request};
use crate::protocol::queue::{Outbound, OutboundQueue};
use crate::protocol::{Frame, FrameCodec, MoyoungCodec, ZeppCodec};
use crate::reassembly::ReassemblyBuffer;
use crate::registry::{EndpointHandler, HandlerContext, Route, ServiceDispatcher};
use crate::scheduler::{KeepAlive, PeriodicCommandScheduler};
use crate::services::{self, find_device, moyoung};

use super::events::DeviceEvent;
use super::ports::{Authenticator, Characteristic, ErrorSink, EventSink, NoAuth, SessionCipher, TransportPort};

// ───────────────────────────────────────────────────────────────
// DeviceEngine
// ───────────────────────────────────────────────────────────────

pub struct DeviceEngine<C: FrameCodec, T: TransportPort> {
    config: EngineConfig,
    transport: T,
    rx: ReassemblyBuffer<C>,
    state: ConnectionState,
    dispatcher: ServiceDispatcher,
    sequencer: InitializationSequencer,
    scheduler: PeriodicCommandScheduler,
    ops: OperationTracker,
    queue: OutboundQueue,
    cipher: Option<Box<dyn SessionCipher>>,
    /// Outbound reassembly window, bumped per encoded frame.
    window: u8,
    /// Endpoints whose caller-requested encryption has already been
    /// overridden once.
    corrected: BTreeSet<u16>,
    connected: bool,
    last_now: Instant,
}

impl<T: TransportPort> DeviceEngine<ZeppCodec, T> {
    /// ZeppOS engine with the standard handler set.
    pub fn zepp(config: EngineConfig, transport: T, auth: Box<dyn Authenticator>) -> Result<Self> {
        if config.dialect != Dialect::ZeppOs {
            return Err(Error::Config("ZeppOS engine needs the ZeppOs dialect"));
        }
        let mut engine = Self::new(config, ZeppCodec, transport, InitPlan::zepp(), auth)?;
        engine.register_standard()?;
        Ok(engine)
    }
}

impl<T: TransportPort> DeviceEngine<MoyoungCodec, T> {
    /// Moyoung engine with the standard handler set and no handshake.
    pub fn moyoung(config: EngineConfig, transport: T) -> Result<Self> {
        if config.dialect != Dialect::Moyoung {
            return Err(Error::Config("Moyoung engine needs the Moyoung dialect"));
        }
        let mut engine = Self::new(config, MoyoungCodec, transport, InitPlan::moyoung(), Box::new(NoAuth))?;
        engine.register_standard()?;
        Ok(engine)
    }
}

impl<C: FrameCodec, T: TransportPort> DeviceEngine<C, T> {
    /// Engine with no handlers registered.
    pub fn new(
        config: EngineConfig,
        codec: C,
        transport: T,
        plan: InitPlan,
        auth: Box<dyn Authenticator>,
    ) -> Result<Self> {
        config.validate()?;
        if codec.min_mtu() != config.dialect.min_mtu() {
            return Err(Error::Config("codec does not match the configured dialect"));
        }
        info!("{}: engine created (dialect {:?})", C::NAME, config.dialect);
        Ok(Self {
            rx: ReassemblyBuffer::new(codec, config.max_frame_size),
            state: ConnectionState::new(config.default_mtu),
            dispatcher: ServiceDispatcher::new(config.dialect),
            sequencer: InitializationSequencer::new(plan, auth),
            scheduler: PeriodicCommandScheduler::new(&config),
            ops: OperationTracker::new(),
            queue: OutboundQueue::new(),
            cipher: None,
            window: 0,
            corrected: BTreeSet::new(),
            connected: false,
            last_now: Instant::from_ticks(0),
            transport,
            config,
        })
    }

    fn register_standard(&mut self) -> Result<()> {
        for handler in services::standard_handlers(&self.config) {
            self.register(handler)?;
        }
        Ok(())
    }

    /// Add a handler. Duplicates are refused.
    pub fn register(&mut self, handler: Box<dyn EndpointHandler>) -> Result<()> {
        self.dispatcher.register(handler)?;
        Ok(())
    }

    pub fn set_cipher(&mut self, cipher: Box<dyn SessionCipher>) {
        self.cipher = Some(cipher);
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn phase(&self) -> InitPhase {
        self.state.phase()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn operations(&self) -> &OperationTracker {
        &self.ops
    }

    pub fn is_busy(&self) -> bool {
        self.ops.is_busy()
    }

    pub fn busy_label(&self) -> Option<&str> {
        self.ops.busy_label()
    }

    pub fn scheduler(&self) -> &PeriodicCommandScheduler {
        &self.scheduler
    }

    pub fn dispatcher(&self) -> &ServiceDispatcher {
        &self.dispatcher
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Items still waiting in the outbound queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Start initialization on a fresh link.
    pub fn connect<S: EventSink + ErrorSink>(&mut self, now: Instant, sink: &mut S) -> Result<()> {
        if self.connected {
            error!("{}: connect while already connected", C::NAME);
            return Err(SequenceError::AlreadyStarted.into());
        }
        let negotiated = self.transport.negotiated_mtu();
        let mtu = if negotiated >= self.rx.codec().min_mtu() {
            negotiated
        } else {
            warn!(
                "{}: negotiated MTU {} unusable, assuming {}",
                C::NAME,
                negotiated,
                self.config.default_mtu
            );
            self.config.default_mtu
        };

        self.state.reset(mtu);
        self.rx.reset();
        self.corrected.clear();
        self.connected = true;
        self.last_now = now;
        info!("{}: connected, MTU {}", C::NAME, mtu);

        let mut out = Outbox::new();
        self.sequencer.start(&mut self.state, &mut out)?;
        self.pump(out, sink);
        Ok(())
    }

    /// Tear down everything that belongs to this connection.
    pub fn disconnect<S: EventSink + ErrorSink>(&mut self, sink: &mut S) {
        if !self.connected {
            return;
        }
        info!("{}: disconnected", C::NAME);
        self.connected = false;
        self.scheduler.cancel_all();
        let dropped = self.queue.clear();
        if dropped > 0 {
            warn!("{}: dropped {} queued writes on disconnect", C::NAME, dropped);
        }
        self.rx.reset();
        self.sequencer.reset();

        let mut out = Outbox::new();
        self.ops.fail(OperationError::Disconnected.into(), &mut out);
        self.state.reset(self.config.default_mtu);
        self.corrected.clear();
        Self::deliver(&mut out, sink);
    }

    // ── Inbound ───────────────────────────────────────────────

    /// One BLE notification from the device.
    pub fn on_notify<S: EventSink + ErrorSink>(&mut self, now: Instant, raw: &[u8], sink: &mut S) -> Option<Route> {
        self.last_now = now;
        if !self.connected {
            warn!("{}: notification while disconnected, dropping", C::NAME);
            return None;
        }
        let frame = self.rx.feed(raw)?;
        let frame = self.decrypt(frame)?;
        debug!(
            "{}[rx]: frame for 0x{:04x}, {} bytes",
            C::NAME,
            frame.endpoint,
            frame.payload.len()
        );

        let mut out = Outbox::new();
        let route = if Some(frame.endpoint) == self.sequencer.auth_endpoint()
            && self.sequencer.on_auth_payload(&frame.payload, &mut self.state, &mut out)
        {
            Route::Handler
        } else {
            let mut ctx = HandlerContext::new(&self.state, &mut out, &mut self.ops);
            self.dispatcher.route(&frame, &mut ctx)
        };
        self.pump(out, sink);
        Some(route)
    }

    fn decrypt(&mut self, mut frame: Frame) -> Option<Frame> {
        if !frame.encrypted {
            return Some(frame);
        }
        let (Some(key), Some(cipher)) = (self.state.session_key(), self.cipher.as_mut()) else {
            warn!(
                "{}: encrypted frame for 0x{:04x} without a session key, dropping",
                C::NAME,
                frame.endpoint
            );
            return None;
        };
        let Some(plain) = cipher.decrypt(key, &frame.payload) else {
            warn!("{}: frame for 0x{:04x} did not decrypt, dropping", C::NAME, frame.endpoint);
            return None;
        };
        frame.payload = plain;
        frame.encrypted = false;
        Some(frame)
    }

    /// Result of a characteristic read the engine requested.
    pub fn on_read<S: EventSink + ErrorSink>(&mut self, characteristic: Characteristic, data: &[u8], sink: &mut S) {
        let mut out = Outbox::new();
        match characteristic {
            Characteristic::Steps => moyoung::on_steps_read(data, &mut self.ops, &mut out),
        }
        self.pump(out, sink);
    }

    /// Fire due timers.
    pub fn tick<S: EventSink + ErrorSink>(&mut self, now: Instant, sink: &mut S) {
        self.last_now = now;
        if !self.connected {
            return;
        }
        let mut out = Outbox::new();
        self.scheduler.tick(now, &mut out);
        self.pump(out, sink);
    }

    // ── Application requests ──────────────────────────────────

    fn ensure_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(SequenceError::NotConnected.into())
        }
    }

    /// Push a changed setting. Returns whether any handler took the key;
    /// always `false` without a connection.
    pub fn configure<S: EventSink + ErrorSink>(&mut self, key: &str, sink: &mut S) -> bool {
        if !self.connected {
            warn!("{}: configure '{}' while disconnected, ignoring", C::NAME, key);
            return false;
        }
        let mut out = Outbox::new();
        let handled = {
            let mut ctx = HandlerContext::new(&self.state, &mut out, &mut self.ops);
            self.dispatcher.on_configure(key, &mut ctx)
        };
        self.pump(out, sink);
        handled
    }

    /// Send a raw frame. `encrypted = None` follows the endpoint's flag.
    pub fn send<S: EventSink + ErrorSink>(
        &mut self,
        endpoint: u16,
        payload: Vec<u8>,
        encrypted: Option<bool>,
        sink: &mut S,
    ) -> Result<()> {
        self.ensure_connected()?;
        self.enqueue(OutboundRequest {
            endpoint,
            payload,
            encrypted,
        })?;
        self.flush(sink)?;
        Ok(())
    }

    pub fn set_realtime_heart_rate<S: EventSink + ErrorSink>(
        &mut self,
        now: Instant,
        enable: bool,
        sink: &mut S,
    ) -> Result<bool> {
        self.set_keep_alive(KeepAlive::RealtimeHeartRate, now, enable, sink)
    }

    pub fn set_raw_sensor<S: EventSink + ErrorSink>(&mut self, now: Instant, enable: bool, sink: &mut S) -> Result<bool> {
        self.set_keep_alive(KeepAlive::RawSensor, now, enable, sink)
    }

    fn set_keep_alive<S: EventSink + ErrorSink>(
        &mut self,
        kind: KeepAlive,
        now: Instant,
        enable: bool,
        sink: &mut S,
    ) -> Result<bool> {
        self.ensure_connected()?;
        self.last_now = now;
        let mut out = Outbox::new();
        let sent = self.scheduler.set_keep_alive(kind, enable, now, &mut out);
        self.pump(out, sink);
        Ok(sent)
    }

    /// Fetch steps, sleep and training history (Moyoung).
    pub fn start_activity_fetch<S: EventSink + ErrorSink>(&mut self, sink: &mut S) -> Result<()> {
        self.ensure_connected()?;
        if self.config.dialect != Dialect::Moyoung {
            return Err(Error::Config("activity history fetch needs the Moyoung dialect"));
        }
        let mut out = Outbox::new();
        let started = self.ops.start(
            moyoung::FETCH_ACTIVITY_LABEL,
            Shape::FanOut(FanOut::activity_history()),
            &mut out,
        );
        if started.is_ok() {
            moyoung::queue_activity_fetch(&mut out);
        }
        self.pump(out, sink);
        Ok(started?)
    }

    /// Claim the device for an upload of `total` bytes to `endpoint`.
    pub fn begin_transfer<S: EventSink + ErrorSink>(
        &mut self,
        kind: TransferKind,
        endpoint: u16,
        total: u32,
        sink: &mut S,
    ) -> Result<()> {
        self.ensure_connected()?;
        let transfer = Transfer::new(kind, endpoint, total)?;
        let label = format!("Uploading {}", kind);
        let mut out = Outbox::new();
        let started = self.ops.start(&label, Shape::Transfer(transfer), &mut out);
        self.pump(out, sink);
        Ok(started?)
    }

    /// Write the next upload chunk. Returns percent complete.
    pub fn send_transfer_chunk<S: EventSink + ErrorSink>(
        &mut self,
        offset: u32,
        data: &[u8],
        sink: &mut S,
    ) -> Result<u8> {
        self.ensure_connected()?;
        let endpoint = self.ops.transfer_endpoint()?;
        let len = data.len() as u32;
        let mut out = Outbox::new();

        // The chunk only counts once the transport has taken it.
        let sent = self
            .ops
            .check_transfer_chunk(offset, len, &mut out)
            .map_err(Error::from)
            .and_then(|()| {
                self.enqueue(OutboundRequest {
                    endpoint,
                    payload: data.to_vec(),
                    encrypted: None,
                })
            });
        if let Err(e) = sent {
            let cause = if matches!(e, Error::Transport(_)) {
                OperationError::TransportFailed.into()
            } else {
                e
            };
            self.ops.fail(cause, &mut out);
            self.pump(out, sink);
            return Err(e);
        }
        if let Err(e) = self.flush(sink) {
            self.pump(out, sink);
            return Err(e);
        }

        let percent = self.ops.transfer_chunk(offset, len, &mut out);
        self.pump(out, sink);
        Ok(percent?)
    }

    /// Make the band ring or stop ringing (ZeppOS).
    pub fn find_band<S: EventSink + ErrorSink>(&mut self, start: bool, sink: &mut S) -> Result<()> {
        if self.config.dialect != Dialect::ZeppOs {
            return Err(Error::Config("find band needs the ZeppOs dialect"));
        }
        self.send(find_device::ENDPOINT, find_device::find_band(start), None, sink)
    }

    /// Stop a find-phone session from the phone side.
    pub fn stop_find_phone<S: EventSink + ErrorSink>(&mut self, sink: &mut S) -> Result<()> {
        match self.config.dialect {
            Dialect::ZeppOs => self.send(find_device::ENDPOINT, find_device::stop_find_phone(), None, sink),
            Dialect::Moyoung => self.send(moyoung::CMD_FIND_MY_PHONE, moyoung::stop_find_phone(), None, sink),
        }
    }

    // ── Plumbing ──────────────────────────────────────────────

    /// Apply effects, encode requests and deliver everything the components
    /// produced, then flush the queue.
    fn pump<S: EventSink + ErrorSink>(&mut self, mut out: Outbox, sink: &mut S) {
        loop {
            for effect in out.take_effects() {
                self.apply(effect, &mut out);
            }
            for request in out.take_requests() {
                if self.queue.is_full() {
                    // Flush errors are delivered by the failure path itself.
                    let _ = self.flush(sink);
                }
                let result = match request {
                    Request::Frame(frame) => self.enqueue(frame),
                    Request::Read(characteristic) => self
                        .queue
                        .push(Outbound::Read(characteristic))
                        .map_err(Error::from),
                };
                if let Err(e) = result {
                    if matches!(e, Error::Transport(_)) {
                        self.ops.fail(OperationError::TransportFailed.into(), &mut out);
                    }
                    out.report(e);
                }
            }
            let advanced =
                self.sequencer
                    .continue_to_discovery(&mut self.state, &mut self.dispatcher, &mut self.ops, &mut out);
            if !advanced && out.effects().is_empty() && out.requests().is_empty() {
                break;
            }
        }
        Self::deliver(&mut out, sink);
        if let Err(e) = self.flush(sink) {
            debug!("{}: flush stopped: {}", C::NAME, e);
        }
    }

    fn apply(&mut self, effect: Effect, out: &mut Outbox) {
        match effect {
            Effect::MtuAnnounced(mtu) => {
                if mtu < self.rx.codec().min_mtu() {
                    warn!("{}: ignoring unusable MTU {}", C::NAME, mtu);
                    return;
                }
                self.state.set_mtu(mtu);
                out.emit(DeviceEvent::MtuChanged(mtu));
            }
            Effect::ServicesDiscovered(services) => {
                self.sequencer
                    .on_services_discovered(&services, &mut self.state, &mut self.dispatcher, &mut self.ops, out);
            }
            Effect::FindPhone(signal) => self.scheduler.find_phone(signal, self.last_now, out),
        }
    }

    fn deliver<S: EventSink + ErrorSink>(out: &mut Outbox, sink: &mut S) {
        for event in out.take_events() {
            sink.emit(&event);
        }
        for error in out.take_errors() {
            sink.report(&error);
        }
    }

    /// Resolve encryption, encode and queue one frame.
    fn enqueue(&mut self, request: OutboundRequest) -> Result<()> {
        let OutboundRequest {
            endpoint,
            payload,
            encrypted,
        } = request;

        if !self.sequencer.permits(&self.state, endpoint) {
            error!(
                "Init: refusing request to 0x{:04x} while service discovery is in flight",
                endpoint
            );
            return Err(SequenceError::RequestDuringDiscovery { endpoint }.into());
        }

        let encrypt = self.resolve_encryption(endpoint, encrypted);
        let payload = if encrypt {
            let (Some(key), Some(cipher)) = (self.state.session_key(), self.cipher.as_mut()) else {
                return Err(CodecError::NoSessionKey.into());
            };
            cipher.encrypt(key, &payload)
        } else {
            payload
        };

        let chunks = self
            .rx
            .codec()
            .encode(self.window, endpoint, &payload, self.state.mtu(), encrypt)?;
        self.window = self.window.wrapping_add(1);
        self.queue.push(Outbound::Frame(chunks))?;
        Ok(())
    }

    /// The device's discovered flag wins over the caller's wish.
    fn resolve_encryption(&mut self, endpoint: u16, requested: Option<bool>) -> bool {
        let handler = self.dispatcher.registry().get(endpoint).map(|h| h.is_encrypted());
        let wanted = requested.or(handler).unwrap_or(false);
        let Some(discovered) = self.state.discovered_encryption(endpoint) else {
            return wanted;
        };
        if wanted != discovered && self.corrected.insert(endpoint) {
            warn!(
                "{}: 0x{:04x} requested encrypted = {}, device requires {}; using the device's flag",
                C::NAME,
                endpoint,
                wanted,
                discovered
            );
        }
        discovered
    }

    /// Drain the outbound queue into the transport, in order. Returns the
    /// number of transport operations performed.
    ///
    /// A failed write discards the rest of the queue, fails the running
    /// operation and reports the transport error.
    pub fn flush<S: EventSink + ErrorSink>(&mut self, sink: &mut S) -> Result<usize> {
        let mut written = 0;
        while let Some(item) = self.queue.pop() {
            if let Err(e) = self.write_item(&item, &mut written) {
                return Err(self.on_transport_failure(e, sink));
            }
        }
        Ok(written)
    }

    fn write_item(&mut self, item: &Outbound, written: &mut usize) -> core::result::Result<(), TransportError> {
        match item {
            Outbound::Frame(chunks) => {
                for chunk in chunks {
                    self.transport.write(chunk)?;
                    *written += 1;
                }
            }
            Outbound::Read(characteristic) => {
                self.transport.request_read(*characteristic)?;
                *written += 1;
            }
        }
        Ok(())
    }

    fn on_transport_failure<S: EventSink + ErrorSink>(&mut self, e: TransportError, sink: &mut S) -> Error {
        let dropped = self.queue.clear();
        error!("{}: transport failure ({}), discarded {} queued items", C::NAME, e, dropped);
        let mut out = Outbox::new();
        self.ops.fail(OperationError::TransportFailed.into(), &mut out);
        out.report(e.into());
        Self::deliver(&mut out, sink);
        e.into()
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
