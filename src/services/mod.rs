//! First-class endpoint handlers.
//!
//! Each ZeppOS endpoint that has been migrated out of the legacy switch
//! lives in its own module with its command enum, request builders and an
//! [`EndpointHandler`] implementation. The Moyoung packet types share one
//! module.

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use crate::config::{Dialect, EngineConfig};
use crate::registry::EndpointHandler;

pub mod battery;
pub mod connection;
pub mod discovery;
pub mod file_transfer;
pub mod find_device;
pub mod heart_rate;
pub mod moyoung;

/// Standard ZeppOS handler set, in registration order.
pub fn zepp_handlers() -> Vec<Box<dyn EndpointHandler>> {
    vec![
        Box::new(discovery::DiscoveryService::new()),
        Box::new(connection::ConnectionService::new()),
        Box::new(battery::BatteryService::new()),
        Box::new(find_device::FindDeviceService::new()),
        Box::new(heart_rate::HeartRateService::new()),
        Box::new(file_transfer::FileTransferService::new()),
    ]
}

/// Standard Moyoung handler set.
pub fn moyoung_handlers(config: &EngineConfig) -> Vec<Box<dyn EndpointHandler>> {
    moyoung::handlers(config.training_max_pages)
}

/// Handler set for the configured dialect.
pub fn standard_handlers(config: &EngineConfig) -> Vec<Box<dyn EndpointHandler>> {
    match config.dialect {
        Dialect::ZeppOs => zepp_handlers(),
        Dialect::Moyoung => moyoung_handlers(config),
    }
}
