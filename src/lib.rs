//! Bandlink: BLE wearable protocol engine.
//!
//! Frame codecs for the ZeppOS and Moyoung dialects, reassembly, endpoint
//! dispatch, connection initialization, periodic keep-alives and
//! multi-request operations. Everything runs against port traits, so the
//! whole engine is exercised on the host without a radio.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod connection;
pub mod error;
pub mod init;
pub mod legacy;
pub mod operation;
pub mod outbox;
pub mod protocol;
pub mod reassembly;
pub mod registry;
pub mod scheduler;
pub mod services;

pub use app::engine::DeviceEngine;
pub use config::{Dialect, EngineConfig};
pub use error::{Error, Result};
