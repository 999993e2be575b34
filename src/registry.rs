//! Endpoint registry and frame dispatch.
//!
//! ```text
//!   Frame ──▶ ServiceDispatcher::route
//!               │
//!               ├─ registered handler?  ──▶ EndpointHandler::handle_payload
//!               ├─ legacy endpoint?     ──▶ legacy::route (fixed switch)
//!               └─ otherwise            ──▶ warn "unhandled", drop
//! ```
//!
//! Handlers are registered once at startup and never removed. Registration
//! order is the iteration order for configuration and initialization.

extern crate alloc;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use log::{debug, info, warn};

use crate::app::events::DeviceEvent;
use crate::app::ports::Characteristic;
use crate::config::Dialect;
use crate::connection::ConnectionState;
use crate::error::{Error, RegistryError};
use crate::legacy;
use crate::operation::OperationTracker;
use crate::outbox::{Effect, Outbox};
use crate::protocol::Frame;

// ═══════════════════════════════════════════════════════════════
//  Handler context
// ═══════════════════════════════════════════════════════════════

/// What a handler may touch while it runs.
///
/// Connection state is read-only here. Requests, events and state changes
/// are recorded in the [`Outbox`] and applied by the engine afterwards.
pub struct HandlerContext<'a> {
    state: &'a ConnectionState,
    out: &'a mut Outbox,
    ops: &'a mut OperationTracker,
}

impl<'a> HandlerContext<'a> {
    pub fn new(state: &'a ConnectionState, out: &'a mut Outbox, ops: &'a mut OperationTracker) -> Self {
        Self { state, out, ops }
    }

    pub fn state(&self) -> &ConnectionState {
        self.state
    }

    pub fn send(&mut self, endpoint: u16, payload: Vec<u8>) {
        self.out.send(endpoint, payload);
    }

    pub fn send_with(&mut self, endpoint: u16, payload: Vec<u8>, encrypted: bool) {
        self.out.send_with(endpoint, payload, encrypted);
    }

    pub fn read(&mut self, characteristic: Characteristic) {
        self.out.read(characteristic);
    }

    pub fn emit(&mut self, event: DeviceEvent) {
        self.out.emit(event);
    }

    pub fn report(&mut self, error: Error) {
        self.out.report(error);
    }

    pub fn effect(&mut self, effect: Effect) {
        self.out.effect(effect);
    }

    pub fn is_busy(&self) -> bool {
        self.ops.is_busy()
    }

    /// Run `f` with the operation tracker and the outbox it reports into.
    pub fn with_operations<R>(&mut self, f: impl FnOnce(&mut OperationTracker, &mut Outbox) -> R) -> R {
        f(self.ops, self.out)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Handler contract
// ═══════════════════════════════════════════════════════════════

pub trait EndpointHandler {
    fn endpoint_id(&self) -> u16;

    fn is_encrypted(&self) -> bool;

    /// Corrected once by the device's service announcement.
    fn set_encrypted(&mut self, encrypted: bool);

    fn handle_payload(&mut self, ctx: &mut HandlerContext<'_>, payload: &[u8]);

    /// Push a changed setting to the device. Returns `true` if handled.
    fn on_configure(&mut self, _ctx: &mut HandlerContext<'_>, _key: &str) -> bool {
        false
    }

    /// Called once per connection, after service discovery, if supported.
    fn initialize(&mut self, _ctx: &mut HandlerContext<'_>) {}
}

pub type PayloadFn = Box<dyn FnMut(&mut HandlerContext<'_>, &[u8])>;
pub type ConfigureFn = Box<dyn FnMut(&mut HandlerContext<'_>, &str) -> bool>;
pub type InitializeFn = Box<dyn FnMut(&mut HandlerContext<'_>)>;

/// Handler assembled from function-valued fields.
pub struct FnHandler {
    endpoint: u16,
    encrypted: bool,
    on_payload: PayloadFn,
    on_configure: Option<ConfigureFn>,
    on_initialize: Option<InitializeFn>,
}

impl FnHandler {
    pub fn new(
        endpoint: u16,
        encrypted: bool,
        on_payload: impl FnMut(&mut HandlerContext<'_>, &[u8]) + 'static,
    ) -> Self {
        Self {
            endpoint,
            encrypted,
            on_payload: Box::new(on_payload),
            on_configure: None,
            on_initialize: None,
        }
    }

    #[must_use]
    pub fn with_configure(mut self, f: impl FnMut(&mut HandlerContext<'_>, &str) -> bool + 'static) -> Self {
        self.on_configure = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_initialize(mut self, f: impl FnMut(&mut HandlerContext<'_>) + 'static) -> Self {
        self.on_initialize = Some(Box::new(f));
        self
    }
}

impl EndpointHandler for FnHandler {
    fn endpoint_id(&self) -> u16 {
        self.endpoint
    }

    fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    fn set_encrypted(&mut self, encrypted: bool) {
        self.encrypted = encrypted;
    }

    fn handle_payload(&mut self, ctx: &mut HandlerContext<'_>, payload: &[u8]) {
        (self.on_payload)(ctx, payload);
    }

    fn on_configure(&mut self, ctx: &mut HandlerContext<'_>, key: &str) -> bool {
        self.on_configure.as_mut().is_some_and(|f| f(ctx, key))
    }

    fn initialize(&mut self, ctx: &mut HandlerContext<'_>) {
        if let Some(f) = self.on_initialize.as_mut() {
            f(ctx);
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Registry
// ═══════════════════════════════════════════════════════════════

/// Ordered `(id, handler)` list with an index for lookups.
#[derive(Default)]
pub struct EndpointRegistry {
    handlers: Vec<(u16, Box<dyn EndpointHandler>)>,
    index: BTreeMap<u16, usize>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler. A second handler for the same endpoint is refused.
    pub fn register(&mut self, handler: Box<dyn EndpointHandler>) -> Result<(), RegistryError> {
        let id = handler.endpoint_id();
        if self.index.contains_key(&id) {
            warn!("Dispatch: endpoint 0x{:04x} already registered", id);
            return Err(RegistryError::Duplicate(id));
        }
        self.index.insert(id, self.handlers.len());
        self.handlers.push((id, handler));
        debug!("Dispatch: registered handler for 0x{:04x}", id);
        Ok(())
    }

    pub fn contains(&self, endpoint: u16) -> bool {
        self.index.contains_key(&endpoint)
    }

    pub fn get(&self, endpoint: u16) -> Option<&dyn EndpointHandler> {
        let i = *self.index.get(&endpoint)?;
        Some(self.handlers[i].1.as_ref())
    }

    pub fn get_mut(&mut self, endpoint: u16) -> Option<&mut dyn EndpointHandler> {
        let i = *self.index.get(&endpoint)?;
        Some(self.handlers[i].1.as_mut())
    }

    /// Endpoint ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.handlers.iter().map(|(id, _)| *id)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn EndpointHandler>> {
        self.handlers.iter_mut().map(|(_, h)| h)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Dispatcher
// ═══════════════════════════════════════════════════════════════

/// Where a frame ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Handler,
    Legacy,
    Unhandled,
    /// Empty payload with no handler to take it.
    Dropped,
}

pub struct ServiceDispatcher {
    registry: EndpointRegistry,
    legacy: bool,
}

impl ServiceDispatcher {
    /// The legacy switch only exists for the ZeppOS endpoint space.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            registry: EndpointRegistry::new(),
            legacy: dialect == Dialect::ZeppOs,
        }
    }

    pub fn register(&mut self, handler: Box<dyn EndpointHandler>) -> Result<(), RegistryError> {
        self.registry.register(handler)
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut EndpointRegistry {
        &mut self.registry
    }

    pub fn route(&mut self, frame: &Frame, ctx: &mut HandlerContext<'_>) -> Route {
        if let Some(handler) = self.registry.get_mut(frame.endpoint) {
            handler.handle_payload(ctx, &frame.payload);
            return Route::Handler;
        }

        let Some(cmd) = frame.command() else {
            warn!("Dispatch: empty payload on 0x{:04x}, dropping", frame.endpoint);
            return Route::Dropped;
        };

        if self.legacy && legacy::route(frame.endpoint, &frame.payload, ctx) {
            return Route::Legacy;
        }

        warn!(
            "Dispatch: unhandled endpoint 0x{:04x} (cmd 0x{:02x}, {} bytes)",
            frame.endpoint,
            cmd,
            frame.payload.len()
        );
        Route::Unhandled
    }

    /// Offer `key` to supported handlers in order, then the legacy default.
    pub fn on_configure(&mut self, key: &str, ctx: &mut HandlerContext<'_>) -> bool {
        for handler in self.registry.iter_mut() {
            if !ctx.state().is_supported(handler.endpoint_id()) {
                continue;
            }
            if handler.on_configure(ctx, key) {
                info!("Dispatch: '{}' handled by 0x{:04x}", key, handler.endpoint_id());
                return true;
            }
        }

        if self.legacy && legacy::on_configure(key, ctx) {
            return true;
        }

        warn!("Dispatch: unhandled configuration key '{}'", key);
        false
    }
}

// ── Tests ────────────────────────────────────────────────────
