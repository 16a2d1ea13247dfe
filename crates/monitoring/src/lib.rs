//! Alert lifecycle management and fleet health monitoring.

pub mod alerts;
pub mod health;

pub use alerts::{AlertDraft, AlertManager};
pub use health::HealthMonitor;
