//! Engine configuration parameters
//!
//! All tunable parameters for one device connection. Values can be loaded
//! from JSON (host tooling) or postcard (persisted device profile).

extern crate alloc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Wire dialect spoken by the device family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Dialect {
    /// Multiplexed, encryption-capable chunked protocol.
    ZeppOs,
    /// Single-characteristic, length-prefixed protocol.
    Moyoung,
}

impl Dialect {
    /// Smallest MTU the dialect can encode a frame into.
    pub const fn min_mtu(self) -> usize {
        match self {
            Self::ZeppOs => crate::protocol::zepp::MIN_MTU,
            Self::Moyoung => crate::protocol::moyoung::MIN_MTU,
        }
    }
}

/// Core engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub dialect: Dialect,

    // --- Framing ---
    /// MTU assumed until the device announces one
    pub default_mtu: usize,
    /// Largest reassembled frame accepted (bytes)
    pub max_frame_size: usize,

    // --- Timers ---
    /// Realtime heart-rate keep-alive period (milliseconds)
    pub realtime_hr_interval_ms: u64,
    /// Raw sensor keep-alive period (milliseconds)
    pub raw_sensor_interval_ms: u64,
    /// Window in which a find-phone mode byte merges into the start event
    pub find_phone_debounce_ms: u64,

    // --- Operations ---
    /// Page cap for paged training history fetches
    pub training_max_pages: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::ZeppOs,

            default_mtu: 23,
            max_frame_size: 64 * 1024,

            realtime_hr_interval_ms: 1_000,
            raw_sensor_interval_ms: 10_000,
            find_phone_debounce_ms: 1_500,

            training_max_pages: 64,
        }
    }
}

impl EngineConfig {
    /// Default configuration for a dialect.
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            default_mtu: match dialect {
                Dialect::ZeppOs => 23,
                Dialect::Moyoung => 20,
            },
            ..Self::default()
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.default_mtu < self.dialect.min_mtu() {
            return Err(Error::Config("default_mtu below dialect minimum"));
        }
        if self.max_frame_size == 0 {
            return Err(Error::Config("max_frame_size must be non-zero"));
        }
        if self.realtime_hr_interval_ms == 0 || self.raw_sensor_interval_ms == 0 {
            return Err(Error::Config("keep-alive intervals must be non-zero"));
        }
        if self.find_phone_debounce_ms == 0 {
            return Err(Error::Config("find_phone_debounce_ms must be non-zero"));
        }
        if self.training_max_pages == 0 {
            return Err(Error::Config("training_max_pages must be non-zero"));
        }
        Ok(())
    }

    /// Decode and validate a persisted postcard profile.
    pub fn from_profile(bytes: &[u8]) -> Result<Self> {
        let config: Self =
            postcard::from_bytes(bytes).map_err(|_| Error::Config("malformed config profile"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_profile(&self) -> Result<alloc::vec::Vec<u8>> {
        postcard::to_allocvec(self).map_err(|_| Error::Config("config profile did not serialize"))
    }
}
