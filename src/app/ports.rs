//! Port traits — the boundary between the protocol engine and its collaborators.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ DeviceEngine (protocol core)
//! ```
//!
//! The BLE stack, the pairing/auth handshake, session crypto and the
//! application that consumes decoded events all live outside this crate.
//! The [`DeviceEngine`](super::engine::DeviceEngine) is generic over these
//! traits, so the whole engine runs against recording mocks in tests.

extern crate alloc;
use alloc::vec::Vec;

use crate::error::{Error, TransportError};

use super::events::DeviceEvent;

// ───────────────────────────────────────────────────────────────
// Transport port (driven adapter: engine ↔ BLE characteristic)
// ───────────────────────────────────────────────────────────────

/// Characteristics the engine may ask the transport to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Characteristic {
    /// Today's step counters (Moyoung devices expose these outside the
    /// packet channel).
    Steps,
}

/// Write side of the BLE channel.
///
/// Notifications flow the other way: the adapter pushes them into
/// [`DeviceEngine::on_notify`](super::engine::DeviceEngine::on_notify),
/// and read results into
/// [`DeviceEngine::on_read`](super::engine::DeviceEngine::on_read).
pub trait TransportPort {
    /// Write one chunk. Chunks are written in call order.
    fn write(&mut self, data: &[u8]) -> Result<(), TransportError>;

    /// Request an asynchronous characteristic read.
    fn request_read(&mut self, characteristic: Characteristic) -> Result<(), TransportError>;

    /// MTU negotiated at the link layer.
    fn negotiated_mtu(&self) -> usize;

    fn is_connected(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Event and error sinks (driven adapters: engine → application)
// ───────────────────────────────────────────────────────────────

/// Receives decoded device events.
pub trait EventSink {
    fn emit(&mut self, event: &DeviceEvent);
}

/// Receives failures that should reach the user (aborted operations,
/// transport faults, sequencing violations).
pub trait ErrorSink {
    fn report(&mut self, error: &Error);
}

// ───────────────────────────────────────────────────────────────
// Authentication and session crypto
// ───────────────────────────────────────────────────────────────

/// Symmetric key produced by the auth handshake.
pub type SessionKey = [u8; 16];

/// Outcome of one authentication step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthProgress {
    /// Send these payloads on the auth endpoint and wait for a reply.
    Pending(Vec<Vec<u8>>),
    /// Handshake complete; encrypted endpoints use this key.
    Authenticated(Option<SessionKey>),
    Failed,
}

/// Vendor-specific authentication handshake.
pub trait Authenticator {
    fn begin(&mut self) -> AuthProgress;

    /// Handle a reply that arrived on the auth endpoint.
    fn on_payload(&mut self, payload: &[u8]) -> AuthProgress;
}

/// Authenticator for dialects without a handshake.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuth;

impl Authenticator for NoAuth {
    fn begin(&mut self) -> AuthProgress {
        AuthProgress::Authenticated(None)
    }

    fn on_payload(&mut self, _payload: &[u8]) -> AuthProgress {
        AuthProgress::Authenticated(None)
    }
}

/// Payload encryption for endpoints the device marks as encrypted.
pub trait SessionCipher {
    fn encrypt(&mut self, key: &SessionKey, plain: &[u8]) -> Vec<u8>;

    /// Returns `None` when the payload does not decrypt.
    fn decrypt(&mut self, key: &SessionKey, data: &[u8]) -> Option<Vec<u8>>;
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate (driven by PeriodicCommandScheduler::tick)
// ───────────────────────────────────────────────────────────────

/// Receives whatever a scheduler timer produces when it fires.
///
/// The engine passes its [`Outbox`](crate::outbox::Outbox), so timer
/// commands reach the wire through the same serialized queue as
/// request/response traffic.
pub trait SchedulerDelegate {
    /// A timer wants `payload` sent on `endpoint`.
    fn on_command(&mut self, endpoint: u16, payload: Vec<u8>);

    /// A timer produced an application event.
    fn on_event(&mut self, event: DeviceEvent);
}
