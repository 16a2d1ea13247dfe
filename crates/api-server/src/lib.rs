//! HTTP surface of the control plane: REST API for operators and
//! advertisers, plus the device-facing registration and WebSocket
//! endpoints.

pub mod device;
pub mod rest;
pub mod server;

pub use rest::AppState;
pub use server::ApiServer;
