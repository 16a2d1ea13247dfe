//! Wire messages exchanged between the control plane and edge agents.
//!
//! Both directions are closed sum types tagged by `type`, so a new message
//! kind is a compile-time-checked addition and dispatch is an exhaustive
//! `match` rather than string comparison.

use crate::types::{CreativeAsset, DisplayCapabilities};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages the control plane pushes to a device.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    NewCampaign {
        campaign_id: Uuid,
        assets: Vec<CreativeAsset>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    },
    StopCampaign {
        campaign_id: Uuid,
    },
}

/// What the device is currently doing with its display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Idle,
    Displaying,
    Degraded,
}

/// Device-local resource telemetry carried on every heartbeat.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SystemStatus {
    pub cpu_usage: f32,
    pub memory_usage: f32,
    pub disk_usage: f32,
    pub uptime_secs: u64,
}

/// Messages a device sends to the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceMessage {
    Heartbeat {
        billboard_id: String,
        timestamp: DateTime<Utc>,
        status: DeviceStatus,
        current_campaign: Option<Uuid>,
        system_status: SystemStatus,
    },
    CampaignDeployed {
        campaign_id: Uuid,
    },
    CampaignDeploymentFailed {
        campaign_id: Uuid,
        message: String,
    },
}

/// Body of `POST /billboard/register`, sent once before the first WebSocket
/// connect and again whenever the agent restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub billboard_id: String,
    pub agent_version: String,
    #[serde(default)]
    pub system_info: serde_json::Value,
    pub capabilities: DisplayCapabilities,
}
