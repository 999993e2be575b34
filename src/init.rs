//! Connection initialization sequencer.
//!
//! ```text
//!   NotStarted ──connect──▶ Auth ──authenticated──▶ Phase2 ──▶ Phase3 ──discovery──▶ ServicesInitialized
//!                            │                      MTU +       (only the
//!                            │                      status      discovery
//!                            └── auth payloads                  request)
//! ```
//!
//! Runs once per connection. The phase lives in [`ConnectionState`], so a
//! disconnect (which resets the state) also resets the sequence.

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec::Vec;

use log::{error, info, warn};

use crate::app::events::DeviceEvent;
use crate::app::ports::{AuthProgress, Authenticator};
use crate::connection::{ConnectionState, InitPhase};
use crate::error::SequenceError;
use crate::operation::OperationTracker;
use crate::outbox::{Outbox, ServiceEntry};
use crate::registry::{HandlerContext, ServiceDispatcher};
use crate::services::{battery, connection, discovery};

// ═══════════════════════════════════════════════════════════════
//  Plan
// ═══════════════════════════════════════════════════════════════

/// Requests issued by each phase, per dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitPlan {
    /// Endpoint the auth handshake talks on. `None` means no handshake.
    pub auth_endpoint: Option<u16>,
    pub mtu_request: Option<(u16, Vec<u8>)>,
    pub status_request: Option<(u16, Vec<u8>)>,
    /// `None` completes Phase3 at once with every registered endpoint.
    pub discovery_request: Option<(u16, Vec<u8>)>,
}

pub const ZEPP_AUTH_ENDPOINT: u16 = 0x0082;

impl InitPlan {
    pub fn zepp() -> Self {
        Self {
            auth_endpoint: Some(ZEPP_AUTH_ENDPOINT),
            mtu_request: Some((connection::ENDPOINT, connection::mtu_request())),
            status_request: Some((battery::ENDPOINT, battery::request())),
            discovery_request: Some((discovery::ENDPOINT, discovery::request())),
        }
    }

    pub fn moyoung() -> Self {
        Self {
            auth_endpoint: None,
            mtu_request: None,
            status_request: None,
            discovery_request: None,
        }
    }

    fn discovery_endpoint(&self) -> Option<u16> {
        self.discovery_request.as_ref().map(|(ep, _)| *ep)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Sequencer
// ═══════════════════════════════════════════════════════════════

pub struct InitializationSequencer {
    plan: InitPlan,
    auth: Box<dyn Authenticator>,
    /// Phase2 requests are out; Phase3 starts once they are queued.
    discovery_due: bool,
}

impl InitializationSequencer {
    pub fn new(plan: InitPlan, auth: Box<dyn Authenticator>) -> Self {
        Self {
            plan,
            auth,
            discovery_due: false,
        }
    }

    pub fn plan(&self) -> &InitPlan {
        &self.plan
    }

    pub fn auth_endpoint(&self) -> Option<u16> {
        self.plan.auth_endpoint
    }

    /// Whether a frame to `endpoint` may be sent in the current phase.
    ///
    /// Phase3 admits only the discovery request and auth traffic; any other
    /// request could rekey the session while discovery is in flight.
    pub fn permits(&self, state: &ConnectionState, endpoint: u16) -> bool {
        if state.phase() != InitPhase::Phase3 {
            return true;
        }
        Some(endpoint) == self.plan.discovery_endpoint() || Some(endpoint) == self.plan.auth_endpoint
    }

    fn advance(state: &mut ConnectionState, to: InitPhase, out: &mut Outbox) -> bool {
        let from = state.phase();
        if !state.advance(to) {
            return false;
        }
        info!("Init: {:?} -> {:?}", from, to);
        out.emit(DeviceEvent::PhaseChanged { from, to });
        true
    }

    /// Begin the sequence on a fresh connection.
    pub fn start(&mut self, state: &mut ConnectionState, out: &mut Outbox) -> Result<(), SequenceError> {
        if state.phase() != InitPhase::NotStarted {
            error!("Init: start requested in {:?}", state.phase());
            return Err(SequenceError::AlreadyStarted);
        }
        Self::advance(state, InitPhase::Auth, out);
        let progress = self.auth.begin();
        self.on_auth_progress(progress, state, out);
        Ok(())
    }

    /// A frame arrived on the auth endpoint. Returns `false` if it was not
    /// meant for the handshake.
    pub fn on_auth_payload(&mut self, payload: &[u8], state: &mut ConnectionState, out: &mut Outbox) -> bool {
        if state.phase() != InitPhase::Auth {
            return false;
        }
        let progress = self.auth.on_payload(payload);
        self.on_auth_progress(progress, state, out);
        true
    }

    fn on_auth_progress(&mut self, progress: AuthProgress, state: &mut ConnectionState, out: &mut Outbox) {
        match progress {
            AuthProgress::Pending(payloads) => {
                let Some(endpoint) = self.plan.auth_endpoint else {
                    error!("Init: authenticator wants to talk but the dialect has no auth endpoint");
                    out.report(SequenceError::AuthFailed.into());
                    return;
                };
                for payload in payloads {
                    out.send_with(endpoint, payload, false);
                }
            }
            AuthProgress::Authenticated(key) => {
                info!("Init: authenticated (session key: {})", key.is_some());
                state.set_session_key(key);
                self.enter_phase2(state, out);
            }
            AuthProgress::Failed => {
                error!("Init: authentication failed");
                out.report(SequenceError::AuthFailed.into());
            }
        }
    }

    fn enter_phase2(&mut self, state: &mut ConnectionState, out: &mut Outbox) {
        if !Self::advance(state, InitPhase::Phase2, out) {
            return;
        }
        for (endpoint, payload) in [&self.plan.mtu_request, &self.plan.status_request]
            .into_iter()
            .flatten()
        {
            out.send(*endpoint, payload.clone());
        }
        self.discovery_due = true;
    }

    /// Move from Phase2 to Phase3 once the Phase2 requests have been queued.
    ///
    /// Phase2 replies are informational, so discovery does not wait for
    /// them. Returns `true` if the phase changed.
    pub fn continue_to_discovery(
        &mut self,
        state: &mut ConnectionState,
        dispatcher: &mut ServiceDispatcher,
        ops: &mut OperationTracker,
        out: &mut Outbox,
    ) -> bool {
        if !core::mem::take(&mut self.discovery_due) || !Self::advance(state, InitPhase::Phase3, out) {
            return false;
        }
        match &self.plan.discovery_request {
            Some((endpoint, payload)) => out.send_with(*endpoint, payload.clone(), false),
            None => {
                let services: Vec<ServiceEntry> = dispatcher
                    .registry()
                    .ids()
                    .filter_map(|id| dispatcher.registry().get(id))
                    .map(|h| ServiceEntry {
                        endpoint: h.endpoint_id(),
                        encrypted: h.is_encrypted(),
                    })
                    .collect();
                info!("Init: no discovery, assuming {} registered endpoints", services.len());
                self.on_services_discovered(&services, state, dispatcher, ops, out);
            }
        }
        true
    }

    /// Forget a half-finished sequence (disconnect).
    pub fn reset(&mut self) {
        self.discovery_due = false;
    }

    /// Apply the device's service announcement and initialize supported
    /// handlers in registration order.
    pub fn on_services_discovered(
        &mut self,
        services: &[ServiceEntry],
        state: &mut ConnectionState,
        dispatcher: &mut ServiceDispatcher,
        ops: &mut OperationTracker,
        out: &mut Outbox,
    ) {
        if state.phase() != InitPhase::Phase3 {
            warn!("Init: service list in {:?}, ignoring", state.phase());
            return;
        }

        state.clear_services();
        for s in services {
            state.add_service(s.endpoint, s.encrypted);
        }

        let registry = dispatcher.registry_mut();
        for handler in registry.iter_mut() {
            let id = handler.endpoint_id();
            let Some(discovered) = services.iter().find(|s| s.endpoint == id) else {
                continue;
            };
            if handler.is_encrypted() != discovered.encrypted {
                info!(
                    "Init: 0x{:04x} encryption corrected to {} by the device",
                    id, discovered.encrypted
                );
                handler.set_encrypted(discovered.encrypted);
            }
        }

        if !Self::advance(state, InitPhase::ServicesInitialized, out) {
            return;
        }

        let mut initialized = 0usize;
        for handler in registry.iter_mut() {
            if !state.is_supported(handler.endpoint_id()) {
                continue;
            }
            let mut ctx = HandlerContext::new(state, out, ops);
            handler.initialize(&mut ctx);
            initialized += 1;
        }
        info!(
            "Init: {} of {} handlers initialized, {} services announced",
            initialized,
            registry.len(),
            services.len()
        );
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
