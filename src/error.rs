//! Unified error types for the protocol engine.
//!
//! A single `Error` enum that every subsystem converts into, so the engine
//! can hand one type to the [`ErrorSink`](crate::app::ports::ErrorSink).
//! All variants are `Copy`; they travel through the outbox and the
//! operation tracker without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level engine error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Frame could not be encoded for the wire.
    Codec(CodecError),
    /// The transport refused a write or read request.
    Transport(TransportError),
    /// Handler registration was rejected.
    Registry(RegistryError),
    /// An operation could not start or was aborted.
    Operation(OperationError),
    /// A request was issued in the wrong initialization phase.
    Sequence(SequenceError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec(e) => write!(f, "codec: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Registry(e) => write!(f, "registry: {e}"),
            Self::Operation(e) => write!(f, "operation: {e}"),
            Self::Sequence(e) => write!(f, "sequence: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

pub type Result<T> = core::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Codec errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// MTU too small to carry a header plus one data byte.
    MtuTooSmall { mtu: usize, min: usize },
    /// Payload cannot be represented in the dialect's length field.
    PayloadTooLarge { len: usize, max: usize },
    /// An encrypted frame was requested but no cipher or key is available.
    NoSessionKey,
    /// Endpoint id does not fit the dialect's type field.
    EndpointOutOfRange(u16),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MtuTooSmall { mtu, min } => write!(f, "MTU {mtu} below minimum {min}"),
            Self::PayloadTooLarge { len, max } => {
                write!(f, "payload of {len} bytes exceeds {max}")
            }
            Self::NoSessionKey => write!(f, "no session key for encrypted endpoint"),
            Self::EndpointOutOfRange(id) => write!(f, "endpoint 0x{id:04x} out of range"),
        }
    }
}

impl From<CodecError> for Error {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    NotConnected,
    /// The underlying GATT write or read failed.
    Io,
    /// The serialized outbound queue is full.
    QueueFull,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected => write!(f, "device not connected"),
            Self::Io => write!(f, "GATT I/O error"),
            Self::QueueFull => write!(f, "outbound queue full"),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Registry errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// A handler for this endpoint is already registered.
    Duplicate(u16),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate(id) => write!(f, "endpoint 0x{id:04x} already registered"),
        }
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

// ---------------------------------------------------------------------------
// Operation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Another operation already owns the device.
    Busy,
    /// No operation is running, or the running one has a different shape.
    NotRunning,
    /// Transfer chunk offset does not match the bytes already written.
    NonSequential,
    /// Transfer chunk would exceed the declared total.
    Overflow,
    /// Declared transfer size is zero.
    InvalidSize,
    /// Paged fetch received a page in the wrong role.
    UnexpectedPage,
    /// Paged fetch exceeded its page cap.
    TooManyPages,
    /// Downloaded file failed its CRC32 check.
    ChecksumMismatch,
    /// Downloaded file could not be inflated.
    Decompress,
    /// The connection dropped while the operation was running.
    Disconnected,
    /// A transport write failed mid-operation.
    TransportFailed,
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "device busy with another operation"),
            Self::NotRunning => write!(f, "no matching operation running"),
            Self::NonSequential => write!(f, "chunk offset does not match expected offset"),
            Self::Overflow => write!(f, "chunk would exceed declared size"),
            Self::InvalidSize => write!(f, "transfer size must be non-zero"),
            Self::UnexpectedPage => write!(f, "page arrived in unexpected role"),
            Self::TooManyPages => write!(f, "page limit exceeded"),
            Self::ChecksumMismatch => write!(f, "CRC32 mismatch"),
            Self::Decompress => write!(f, "zlib inflate failed"),
            Self::Disconnected => write!(f, "device disconnected"),
            Self::TransportFailed => write!(f, "transport write failed"),
        }
    }
}

impl From<OperationError> for Error {
    fn from(e: OperationError) -> Self {
        Self::Operation(e)
    }
}

// ---------------------------------------------------------------------------
// Sequencing violations
// ---------------------------------------------------------------------------

/// Programming errors: a request was issued when the init phase forbids it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceError {
    /// `connect` was called twice without a disconnect in between.
    AlreadyStarted,
    /// Only the service discovery request may be in flight during Phase3.
    RequestDuringDiscovery { endpoint: u16 },
    /// The engine is not connected.
    NotConnected,
    /// The authentication collaborator rejected the handshake.
    AuthFailed,
}

impl fmt::Display for SequenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "initialization already started"),
            Self::RequestDuringDiscovery { endpoint } => {
                write!(f, "request to 0x{endpoint:04x} during service discovery")
            }
            Self::NotConnected => write!(f, "not connected"),
            Self::AuthFailed => write!(f, "authentication failed"),
        }
    }
}

impl From<SequenceError> for Error {
    fn from(e: SequenceError) -> Self {
        Self::Sequence(e)
    }
}
