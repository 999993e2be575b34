//! Per-connection state.
//!
//! Created on connect, reset on disconnect, never carried across
//! connections. Only the [`InitializationSequencer`](crate::init::InitializationSequencer)
//! and the dispatcher (when the device announces an MTU) mutate it; handlers
//! see it through [`HandlerContext::state`](crate::registry::HandlerContext::state).

extern crate alloc;
use alloc::collections::BTreeSet;

use log::{info, warn};

use crate::app::ports::SessionKey;

/// Connection initialization phases, strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum InitPhase {
    NotStarted,
    Auth,
    Phase2,
    Phase3,
    ServicesInitialized,
}

impl InitPhase {
    /// The only phase this one may move to.
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::NotStarted => Some(Self::Auth),
            Self::Auth => Some(Self::Phase2),
            Self::Phase2 => Some(Self::Phase3),
            Self::Phase3 => Some(Self::ServicesInitialized),
            Self::ServicesInitialized => None,
        }
    }
}

#[derive(Debug)]
pub struct ConnectionState {
    mtu: usize,
    supported: BTreeSet<u16>,
    encrypted: BTreeSet<u16>,
    phase: InitPhase,
    session_key: Option<SessionKey>,
}

impl ConnectionState {
    pub fn new(mtu: usize) -> Self {
        Self {
            mtu,
            supported: BTreeSet::new(),
            encrypted: BTreeSet::new(),
            phase: InitPhase::NotStarted,
            session_key: None,
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn mtu(&self) -> usize {
        self.mtu
    }

    pub fn phase(&self) -> InitPhase {
        self.phase
    }

    pub fn supported_endpoints(&self) -> &BTreeSet<u16> {
        &self.supported
    }

    pub fn encrypted_endpoints(&self) -> &BTreeSet<u16> {
        &self.encrypted
    }

    pub fn is_supported(&self, endpoint: u16) -> bool {
        self.supported.contains(&endpoint)
    }

    /// Whether the device asked for `endpoint` to be encrypted, once known.
    pub fn discovered_encryption(&self, endpoint: u16) -> Option<bool> {
        (self.phase == InitPhase::ServicesInitialized && self.supported.contains(&endpoint))
            .then(|| self.encrypted.contains(&endpoint))
    }

    pub fn session_key(&self) -> Option<&SessionKey> {
        self.session_key.as_ref()
    }

    // ── Mutators (sequencer and dispatcher only) ──────────────

    /// Move to the next phase. Refuses skips and backwards moves.
    pub(crate) fn advance(&mut self, to: InitPhase) -> bool {
        if self.phase.next() != Some(to) {
            warn!("Connection: refusing phase change {:?} -> {:?}", self.phase, to);
            return false;
        }
        info!("Connection: {:?} -> {:?}", self.phase, to);
        self.phase = to;
        true
    }

    pub(crate) fn set_mtu(&mut self, mtu: usize) {
        if mtu != self.mtu {
            info!("Connection: MTU {} -> {}", self.mtu, mtu);
            self.mtu = mtu;
        }
    }

    pub(crate) fn set_session_key(&mut self, key: Option<SessionKey>) {
        self.session_key = key;
    }

    pub(crate) fn clear_services(&mut self) {
        self.supported.clear();
        self.encrypted.clear();
    }

    pub(crate) fn add_service(&mut self, endpoint: u16, encrypted: bool) {
        self.supported.insert(endpoint);
        if encrypted {
            self.encrypted.insert(endpoint);
        }
    }

    /// Forget everything; the next connection starts from scratch.
    pub(crate) fn reset(&mut self, mtu: usize) {
        *self = Self::new(mtu);
    }
}
