//! Mock device side for integration tests.
//!
//! Records every chunk the engine writes so tests can reassemble and assert
//! on the full outbound history, and encodes device notifications with the
//! same codecs the engine uses.

use bandlink::DeviceEngine;
use bandlink::app::events::DeviceEvent;
use bandlink::app::ports::{
    AuthProgress, Authenticator, Characteristic, ErrorSink, EventSink, NoAuth, SessionCipher, SessionKey,
    TransportPort,
};
use bandlink::config::{Dialect, EngineConfig};
use bandlink::error::{Error, TransportError};
use bandlink::outbox::ServiceEntry;
use bandlink::protocol::{Frame, FrameCodec, MoyoungCodec, ZeppCodec};
use bandlink::reassembly::ReassemblyBuffer;
use bandlink::services::discovery;
use embassy_time::Instant;

pub type ZeppEngine = DeviceEngine<ZeppCodec, MockTransport>;
pub type MoyoungEngine = DeviceEngine<MoyoungCodec, MockTransport>;

// ── Transport ─────────────────────────────────────────────────

pub struct MockTransport {
    pub mtu: usize,
    pub written: Vec<Vec<u8>>,
    pub reads: Vec<Characteristic>,
    /// Fail every write from this many successful writes on.
    pub fail_after: Option<usize>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn new(mtu: usize) -> Self {
        Self {
            mtu,
            written: Vec::new(),
            reads: Vec::new(),
            fail_after: None,
        }
    }
}

impl TransportPort for MockTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError> {
        if self.fail_after.is_some_and(|n| self.written.len() >= n) {
            return Err(TransportError::Io);
        }
        self.written.push(data.to_vec());
        Ok(())
    }

    fn request_read(&mut self, characteristic: Characteristic) -> Result<(), TransportError> {
        self.reads.push(characteristic);
        Ok(())
    }

    fn negotiated_mtu(&self) -> usize {
        self.mtu
    }

    fn is_connected(&self) -> bool {
        true
    }
}

// ── Sink ──────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<DeviceEvent>,
    pub errors: Vec<Error>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&DeviceEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &DeviceEvent) {
        self.events.push(event.clone());
    }
}

impl ErrorSink for RecordingSink {
    fn report(&mut self, error: &Error) {
        self.errors.push(*error);
    }
}

// ── Auth and crypto stand-ins ─────────────────────────────────

/// Two-message handshake: sends `[0x01]`, expects `[0x10, 0x01]`.
pub struct ScriptedAuth {
    pub key: SessionKey,
}

impl Authenticator for ScriptedAuth {
    fn begin(&mut self) -> AuthProgress {
        AuthProgress::Pending(vec![vec![0x01]])
    }

    fn on_payload(&mut self, payload: &[u8]) -> AuthProgress {
        match payload {
            [0x10, 0x01] => AuthProgress::Authenticated(Some(self.key)),
            _ => AuthProgress::Failed,
        }
    }
}

/// XOR with the first key byte. Only decrypts payloads starting with the
/// marker byte `0xee` after XOR.
pub struct XorCipher;

impl SessionCipher for XorCipher {
    fn encrypt(&mut self, key: &SessionKey, plain: &[u8]) -> Vec<u8> {
        std::iter::once(0xee).chain(plain.iter().copied()).map(|b| b ^ key[0]).collect()
    }

    fn decrypt(&mut self, key: &SessionKey, data: &[u8]) -> Option<Vec<u8>> {
        let plain: Vec<u8> = data.iter().map(|b| b ^ key[0]).collect();
        match plain.split_first() {
            Some((0xee, rest)) => Some(rest.to_vec()),
            _ => None,
        }
    }
}

// ── Engine builders ───────────────────────────────────────────

pub fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

/// ZeppOS engine connected with no handshake, waiting in Phase3.
pub fn zepp_connected(sink: &mut RecordingSink) -> ZeppEngine {
    let mut engine = DeviceEngine::zepp(EngineConfig::default(), MockTransport::new(23), Box::new(NoAuth))
        .expect("zepp engine");
    engine.connect(at(0), sink).expect("connect");
    engine
}

/// ZeppOS engine that has finished initialization with `services`.
#[allow(dead_code)]
pub fn zepp_ready(sink: &mut RecordingSink, services: &[ServiceEntry]) -> ZeppEngine {
    let mut engine = zepp_connected(sink);
    zepp_notify(&mut engine, at(0), discovery::ENDPOINT, &discovery::encode_response(services), sink);
    engine
}

#[allow(dead_code)]
pub fn moyoung_connected(sink: &mut RecordingSink) -> MoyoungEngine {
    let mut engine = DeviceEngine::moyoung(EngineConfig::for_dialect(Dialect::Moyoung), MockTransport::new(20))
        .expect("moyoung engine");
    engine.connect(at(0), sink).expect("connect");
    engine
}

#[allow(dead_code)]
pub fn service(endpoint: u16, encrypted: bool) -> ServiceEntry {
    ServiceEntry { endpoint, encrypted }
}

// ── Device → phone ────────────────────────────────────────────

pub fn zepp_notify(engine: &mut ZeppEngine, now: Instant, endpoint: u16, payload: &[u8], sink: &mut RecordingSink) {
    let mtu = engine.state().mtu();
    for chunk in ZeppCodec.encode(0x40, endpoint, payload, mtu, false).expect("encode") {
        engine.on_notify(now, &chunk, sink);
    }
}

#[allow(dead_code)]
pub fn moyoung_notify(
    engine: &mut MoyoungEngine,
    now: Instant,
    packet_type: u16,
    payload: &[u8],
    sink: &mut RecordingSink,
) {
    for chunk in MoyoungCodec.encode(0, packet_type, payload, 20, false).expect("encode") {
        engine.on_notify(now, &chunk, sink);
    }
}

// ── Phone → device ────────────────────────────────────────────

fn reassemble<C: FrameCodec>(codec: C, written: &[Vec<u8>]) -> Vec<Frame> {
    let mut rx = ReassemblyBuffer::new(codec, 64 * 1024);
    written.iter().filter_map(|c| rx.feed(c)).collect()
}

pub fn zepp_written(engine: &ZeppEngine) -> Vec<Frame> {
    reassemble(ZeppCodec, &engine.transport().written)
}

#[allow(dead_code)]
pub fn moyoung_written(engine: &MoyoungEngine) -> Vec<Frame> {
    reassemble(MoyoungCodec, &engine.transport().written)
}

/// Payloads written to `endpoint`, in order.
pub fn payloads_to(frames: &[Frame], endpoint: u16) -> Vec<Vec<u8>> {
    frames
        .iter()
        .filter(|f| f.endpoint == endpoint)
        .map(|f| f.payload.clone())
        .collect()
}
