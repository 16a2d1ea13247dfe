//! Background scheduling: time-based booking sweeps, fleet health checks,
//! and operational gauges.

pub mod scheduler;

pub use scheduler::CampaignScheduler;
