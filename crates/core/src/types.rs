use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display hardware capabilities reported at registration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DisplayCapabilities {
    pub width_px: u32,
    pub height_px: u32,
    pub supports_video: bool,
    #[serde(default)]
    pub brightness_nits: Option<u32>,
}

impl Default for DisplayCapabilities {
    fn default() -> Self {
        Self {
            width_px: 1920,
            height_px: 1080,
            supports_video: true,
            brightness_nits: None,
        }
    }
}

/// A physical display device in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Billboard {
    pub id: String,
    pub name: String,
    pub location: Option<String>,
    /// Per-device credential presented on registration and WebSocket connect.
    pub api_key: String,
    pub agent_version: Option<String>,
    pub capabilities: DisplayCapabilities,
    pub is_online: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub registered_at: DateTime<Utc>,
}

impl Billboard {
    pub fn new(id: String, name: String, location: Option<String>, api_key: String) -> Self {
        Self {
            id,
            name,
            location,
            api_key,
            agent_version: None,
            capabilities: DisplayCapabilities::default(),
            is_online: false,
            last_heartbeat: None,
            registered_at: Utc::now(),
        }
    }
}

/// One creative in a campaign's ordered playlist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreativeAsset {
    pub url: String,
    pub filename: String,
    /// Hex-encoded SHA-256 of the asset bytes.
    pub checksum: String,
    pub duration_secs: u32,
}

/// Deployment pipeline state of a campaign. Independent of the booking
/// lifecycle: a booking goes Active optimistically, while these states are
/// driven by the device's own acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Deployed,
    Failed,
    Active,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub billboard_id: String,
    pub assets: Vec<CreativeAsset>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: CampaignStatus,
    pub status_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(
        billboard_id: String,
        assets: Vec<CreativeAsset>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            billboard_id,
            assets,
            start_time,
            end_time,
            status: CampaignStatus::Pending,
            status_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Booking lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    PendingPayment,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Payment state, orthogonal to the booking lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

/// Commercial record binding a campaign to a billboard and advertiser for a
/// half-open `[start_time, end_time)` window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub billboard_id: String,
    pub campaign_id: Uuid,
    pub advertiser_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub amount: f64,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub payment_ref: Option<String>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Half-open interval intersection test against another window.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && start < self.end_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    BillboardOffline,
    CampaignPerformance,
    DeploymentFailed,
    QueueOverflow,
    SchedulerError,
    PaymentIssue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    High,
    Critical,
}

/// An operator-facing alert. At most one unresolved alert exists per
/// `(alert_type, billboard_id, campaign_id)`; repeated triggers update the
/// existing record in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
    pub billboard_id: Option<String>,
    pub campaign_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
}

impl Alert {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn booking_for(start_offset_days: i64, end_offset_days: i64) -> Booking {
        let now = Utc::now();
        Booking {
            id: Uuid::new_v4(),
            billboard_id: "bb-1".to_string(),
            campaign_id: Uuid::new_v4(),
            advertiser_id: "adv-1".to_string(),
            start_time: now + Duration::days(start_offset_days),
            end_time: now + Duration::days(end_offset_days),
            amount: 100.0,
            status: BookingStatus::Confirmed,
            payment_status: PaymentStatus::Paid,
            payment_ref: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn half_open_overlap() {
        let b = booking_for(0, 7);
        let now = b.start_time;

        assert!(b.overlaps(now + Duration::days(3), now + Duration::days(10)));
        assert!(b.overlaps(now + Duration::days(-2), now + Duration::days(1)));
        // Touching at the boundary is not an overlap: [0,7) vs [7,10).
        assert!(!b.overlaps(now + Duration::days(7), now + Duration::days(10)));
        assert!(!b.overlaps(now + Duration::days(-5), now + Duration::days(0)));
    }

    #[test]
    fn terminal_states() {
        assert!(BookingStatus::Completed.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(!BookingStatus::PendingPayment.is_terminal());
        assert!(!BookingStatus::Active.is_terminal());
    }
}
