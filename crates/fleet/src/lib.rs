//! Live WebSocket session tracking for the billboard fleet.

pub mod registry;

pub use registry::{DeliveryStatus, FleetConnectionRegistry};
