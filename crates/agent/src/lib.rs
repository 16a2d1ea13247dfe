//! Device-resident edge agent: maintains the WebSocket link to the control
//! plane, downloads and verifies campaign content, and keeps a local
//! schedule that survives restarts.

pub mod agent;
pub mod content;
pub mod error;
pub mod schedule;
pub mod telemetry;

pub use agent::EdgeAgent;
pub use content::ContentManager;
pub use error::{AgentError, AgentResult};
pub use schedule::{LocalAsset, LocalSchedule, ScheduleStore};
pub use telemetry::TelemetrySampler;
