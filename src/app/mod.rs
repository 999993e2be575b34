//! Application core: the device engine and its port boundary.
//!
//! The protocol logic never touches the BLE stack or the application
//! directly. All interaction happens through **port traits** defined in
//! [`ports`], keeping the engine fully testable with mock adapters.

pub mod engine;
pub mod events;
pub mod ports;
